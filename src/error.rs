use thiserror::Error;

/// Errors that map to exit code 2 (configuration error) per the CLI contract.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown persona {0:?}, expected one of pilot/commander/analyst")]
    UnknownPersona(String),

    #[error("unknown llm_provider {0:?}, expected local or cloud")]
    UnknownLlmProvider(String),

    #[error("sitrep_interval_s must be >= 5, got {0}")]
    IntervalTooShort(u64),

    #[error("replay speed must be > 0, got {0}")]
    InvalidReplaySpeed(f64),
}
