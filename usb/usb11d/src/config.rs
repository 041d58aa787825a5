use std::{fs, io, path::Path};

use lazy_static::lazy_static;
use log::LevelFilter;
use serde::Deserialize;
use thiserror::Error;

use crate::task::DEFAULT_CAPACITY;

lazy_static! {
    pub static ref DEFAULT_CONFIG: Config = {
        const TOML: &'static [u8] = include_bytes!("../config.toml");

        Config::from_slice(TOML).expect("Failed to parse internally embedded config file")
    };
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub controller: ControllerConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ControllerConfig {
    /// Address of the SIE register block.
    pub base: usize,
    #[serde(default)]
    pub simulation: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TasksConfig {
    pub capacity: usize,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Config = toml::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::from_slice(&fs::read(path)?)
    }

    pub fn log_level(&self) -> LevelFilter {
        // Checked by validate
        self.log.level.parse().unwrap_or(LevelFilter::Info)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.controller.base == 0 || self.controller.base % 4 != 0 {
            return Err(ConfigError::Invalid(format!(
                "controller base {:#x} is not a word aligned address",
                self.controller.base
            )));
        }
        if self.tasks.capacity == 0 {
            return Err(ConfigError::Invalid("at least one task is needed for the root port".to_string()));
        }
        self.log
            .level
            .parse::<LevelFilter>()
            .map_err(|_| ConfigError::Invalid(format!("unknown log level {:?}", self.log.level)))?;
        Ok(())
    }
}
