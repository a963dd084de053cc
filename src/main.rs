use agcs::commands;
use agcs::config::AgcsConfig;
use agcs::error::ConfigError;
use agcs::ingest::BrokerEndpoint;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Autonomous Ground Control Station: fuses operator, Remote-ID, and
/// enterprise UAV telemetry into one fleet picture and narrates it via a
/// persona-guided SITREP loop.
#[derive(Parser, Debug)]
#[command(name = "agcs", version, about)]
struct Cli {
    /// Path to a TOML configuration file. Flags below override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    broker_host: Option<String>,
    #[arg(long, global = true)]
    broker_port: Option<u16>,
    #[arg(long, global = true)]
    persona: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest live telemetry from the configured broker.
    Run,
    /// Replay a forensic log against the local broker.
    Replay {
        path: PathBuf,
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        #[arg(long)]
        jump: bool,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
}

fn load_config(cli: &Cli) -> Result<AgcsConfig, ConfigError> {
    let mut config = AgcsConfig::load(cli.config.as_deref())?;
    if let Some(host) = &cli.broker_host {
        config.broker_host = host.clone();
    }
    if let Some(port) = cli.broker_port {
        config.broker_port = port;
    }
    if let Some(persona) = &cli.persona {
        config.persona = agcs::persona::Persona::parse(persona).ok_or_else(|| ConfigError::UnknownPersona(persona.clone()))?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {}", e);
            return ExitCode::from(2);
        }
    };

    let result = match cli.command {
        Commands::Run => commands::run::run(config).await,
        Commands::Replay { path, speed, jump } => {
            let endpoint = BrokerEndpoint {
                host: config.broker_host.clone(),
                port: config.broker_port,
                tls: config.tls,
                username: config.username.clone(),
                password: config.password.clone(),
            };
            commands::replay::replay(&path, speed, jump, &endpoint).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {}", e);
            ExitCode::from(1)
        }
    }
}
