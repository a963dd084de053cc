//! Configuration surface (spec.md §6), layered: defaults, then an optional
//! TOML file, then environment overrides — grounded on the teacher's
//! `dotenvy` + `toml` init in `config/mod.rs`, generalized to this crate's
//! config keys.

use crate::error::ConfigError;
use crate::persona::Persona;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Local,
    Cloud,
}

impl LlmProvider {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "local" => Some(LlmProvider::Local),
            "cloud" => Some(LlmProvider::Cloud),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HomeBase {
    pub lat: f64,
    pub lon: f64,
}

impl Default for HomeBase {
    fn default() -> Self {
        // Default home base (spec.md §6).
        Self { lat: 60.3195, lon: 24.8310 }
    }
}

#[derive(Debug, Clone)]
pub struct AgcsConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,

    pub llm_provider: LlmProvider,
    pub llm_model: String,
    pub llm_endpoint: Option<String>,
    pub api_key: Option<String>,

    pub persona: Persona,
    pub sitrep_interval_s: u64,

    pub stale_threshold_s: f64,
    pub critical_batt_pct: i32,
    pub warning_batt_pct: i32,

    pub home_base: HomeBase,
    pub traffic_classes: bool,

    pub record_enabled: bool,
    pub metrics_enabled: bool,
    pub bridge_enabled: bool,
    pub bridge_port: u16,

    pub replay_path: Option<PathBuf>,
    pub replay_speed: f64,
    pub jump_to_action: bool,

    pub data_dir: PathBuf,
    pub persona_dir: PathBuf,
}

impl Default for AgcsConfig {
    fn default() -> Self {
        Self {
            broker_host: "192.168.192.100".to_string(),
            broker_port: 1883,
            tls: false,
            username: None,
            password: None,

            llm_provider: LlmProvider::Local,
            llm_model: "llama3".to_string(),
            llm_endpoint: Some("http://127.0.0.1:11434/api/generate".to_string()),
            api_key: None,

            persona: Persona::Analyst,
            sitrep_interval_s: 45,

            stale_threshold_s: 90.0,
            critical_batt_pct: 15,
            warning_batt_pct: 25,

            home_base: HomeBase::default(),
            traffic_classes: false,

            record_enabled: true,
            metrics_enabled: true,
            bridge_enabled: true,
            bridge_port: 8080,

            replay_path: None,
            replay_speed: 1.0,
            jump_to_action: false,

            data_dir: PathBuf::from("."),
            persona_dir: PathBuf::from("."),
        }
    }
}

/// Raw, all-optional TOML shape; every field overlays onto the default.
#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    broker_host: Option<String>,
    broker_port: Option<u16>,
    tls: Option<bool>,
    username: Option<String>,
    password: Option<String>,

    llm_provider: Option<String>,
    llm_model: Option<String>,
    llm_endpoint: Option<String>,
    api_key: Option<String>,

    persona: Option<String>,
    sitrep_interval_s: Option<u64>,

    stale_threshold_s: Option<f64>,
    critical_batt_pct: Option<i32>,
    warning_batt_pct: Option<i32>,

    home_base_lat: Option<f64>,
    home_base_lon: Option<f64>,
    traffic_classes: Option<bool>,

    record_enabled: Option<bool>,
    metrics_enabled: Option<bool>,
    bridge_enabled: Option<bool>,
    bridge_port: Option<u16>,

    replay_path: Option<PathBuf>,
    replay_speed: Option<f64>,
    jump_to_action: Option<bool>,

    data_dir: Option<PathBuf>,
    persona_dir: Option<PathBuf>,
}

impl AgcsConfig {
    /// Loads defaults, overlays `path` (if given and present), then validates
    /// the result. `path` absent is not an error — defaults alone are valid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = AgcsConfig::default();

        if let Some(path) = path {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.display().to_string(),
                source,
            })?;
            let raw: RawConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
            cfg.apply(raw)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    fn apply(&mut self, raw: RawConfig) -> Result<(), ConfigError> {
        if let Some(v) = raw.broker_host {
            self.broker_host = v;
        }
        if let Some(v) = raw.broker_port {
            self.broker_port = v;
        }
        if let Some(v) = raw.tls {
            self.tls = v;
        }
        if raw.username.is_some() {
            self.username = raw.username;
        }
        if raw.password.is_some() {
            self.password = raw.password;
        }
        if let Some(v) = raw.llm_provider {
            self.llm_provider = LlmProvider::parse(&v).ok_or_else(|| ConfigError::UnknownLlmProvider(v.clone()))?;
        }
        if let Some(v) = raw.llm_model {
            self.llm_model = v;
        }
        if raw.llm_endpoint.is_some() {
            self.llm_endpoint = raw.llm_endpoint;
        }
        if raw.api_key.is_some() {
            self.api_key = raw.api_key;
        }
        if let Some(v) = raw.persona {
            self.persona = Persona::parse(&v).ok_or(ConfigError::UnknownPersona(v))?;
        }
        if let Some(v) = raw.sitrep_interval_s {
            self.sitrep_interval_s = v;
        }
        if let Some(v) = raw.stale_threshold_s {
            self.stale_threshold_s = v;
        }
        if let Some(v) = raw.critical_batt_pct {
            self.critical_batt_pct = v;
        }
        if let Some(v) = raw.warning_batt_pct {
            self.warning_batt_pct = v;
        }
        if let Some(v) = raw.home_base_lat {
            self.home_base.lat = v;
        }
        if let Some(v) = raw.home_base_lon {
            self.home_base.lon = v;
        }
        if let Some(v) = raw.traffic_classes {
            self.traffic_classes = v;
        }
        if let Some(v) = raw.record_enabled {
            self.record_enabled = v;
        }
        if let Some(v) = raw.metrics_enabled {
            self.metrics_enabled = v;
        }
        if let Some(v) = raw.bridge_enabled {
            self.bridge_enabled = v;
        }
        if let Some(v) = raw.bridge_port {
            self.bridge_port = v;
        }
        if raw.replay_path.is_some() {
            self.replay_path = raw.replay_path;
        }
        if let Some(v) = raw.replay_speed {
            self.replay_speed = v;
        }
        if let Some(v) = raw.jump_to_action {
            self.jump_to_action = v;
        }
        if let Some(v) = raw.data_dir {
            self.data_dir = v;
        }
        if let Some(v) = raw.persona_dir {
            self.persona_dir = v;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sitrep_interval_s < 5 {
            return Err(ConfigError::IntervalTooShort(self.sitrep_interval_s));
        }
        if self.replay_speed <= 0.0 {
            return Err(ConfigError::InvalidReplaySpeed(self.replay_speed));
        }
        Ok(())
    }
}
