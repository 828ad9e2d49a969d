use crate::classifier::{
    ClassifierConfig, DEFAULT_MOVING_SPEED_MPS, DEFAULT_STATIONARY_MIN_MINUTES,
    DEFAULT_STATIONARY_RADIUS_M,
};
use crate::dispatch::{
    DEFAULT_MAX_CONFLICT_RETRIES, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKER_IDLE_MINUTES,
    DispatchSettings,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub sites: Option<SitesSection>,
    #[serde(default)]
    pub classifier: Option<ClassifierSection>,
    #[serde(default)]
    pub engine: Option<EngineSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SitesSection {
    /// JSON file with job geofences, owners and assignations
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ClassifierSection {
    /// Radius around the anchor point that still counts as standing (default: 30)
    pub stationary_radius_m: Option<f64>,
    /// Minutes standing before a truck is STATIONARY (default: 5)
    pub stationary_min_minutes: Option<u64>,
    /// Speed in m/s above which a truck is moving (default: 2.0)
    pub moving_speed_mps: Option<f64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EngineSection {
    /// Pending commands per truck worker (default: 256)
    pub queue_capacity: Option<usize>,
    /// Attempts after a load number conflict (default: 3)
    pub max_conflict_retries: Option<u32>,
    /// Minutes without work before an off-site truck worker stops, 0 keeps
    /// workers forever (default: 60)
    pub worker_idle_minutes: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    pub fn sites_path(&self) -> Option<&Path> {
        let path = self.sites.as_ref()?.path.as_deref()?;
        if path.as_os_str().is_empty() {
            None
        } else {
            Some(path)
        }
    }

    /// Returns the configured log level, or None when it does not parse.
    pub fn log_level(&self) -> Option<Level> {
        self.logging.level.trim().parse().ok()
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        let section = self.classifier.clone().unwrap_or_default();
        let minutes = section
            .stationary_min_minutes
            .unwrap_or(DEFAULT_STATIONARY_MIN_MINUTES);
        ClassifierConfig {
            stationary_radius_m: section
                .stationary_radius_m
                .unwrap_or(DEFAULT_STATIONARY_RADIUS_M),
            stationary_min_duration: i64::try_from(minutes.saturating_mul(60))
                .map_or(time::Duration::MAX, time::Duration::seconds),
            moving_speed_mps: section.moving_speed_mps.unwrap_or(DEFAULT_MOVING_SPEED_MPS),
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        let section = self.engine.clone().unwrap_or_default();
        DispatchSettings {
            queue_capacity: section.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            max_conflict_retries: section
                .max_conflict_retries
                .unwrap_or(DEFAULT_MAX_CONFLICT_RETRIES),
            idle_timeout: match section
                .worker_idle_minutes
                .unwrap_or(DEFAULT_WORKER_IDLE_MINUTES)
            {
                0 => None,
                minutes => Some(std::time::Duration::from_secs(minutes.saturating_mul(60))),
            },
            classifier: self.classifier_config(),
        }
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }
}
