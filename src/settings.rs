use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "pointdash.toml";
pub const ENV_PREFIX: &str = "POINTDASH";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Startup configuration, built once and handed to the service and server.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub data: DataSources,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Listen address, e.g. `0.0.0.0:5000`.
    pub bind: String,
}

/// Locations of the CSV sources, re-read on every request.
#[derive(Debug, Clone, Deserialize)]
pub struct DataSources {
    pub prices: PathBuf,
    pub changepoints: PathBuf,
    pub events: PathBuf,
}

impl Settings {
    /// Layer built-in defaults, an optional TOML file and `POINTDASH__*` environment
    /// variables, in that order of precedence.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let file = file
            .to_str()
            .ok_or_else(|| SettingsError::Invalid(format!("non UTF-8 path {}", file.display())))?;

        let builder = config::Config::builder()
            .set_default("server.bind", "0.0.0.0:5000")?
            .set_default("data.prices", "data/processed/prices.csv")?
            .set_default("data.changepoints", "models/changepoints.csv")?
            .set_default("data.events", "data/event/events.csv")?
            .add_source(config::File::new(file, config::FileFormat::Toml).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let settings = builder.try_deserialize::<Settings>()?;
        settings.server.addr()?;

        Ok(settings)
    }
}

impl ServerSettings {
    pub fn addr(&self) -> Result<SocketAddr, SettingsError> {
        self.bind
            .parse()
            .map_err(|_| SettingsError::Invalid(format!("bind address `{}`", self.bind)))
    }
}
