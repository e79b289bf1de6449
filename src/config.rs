use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result};

/// tool configuration, optionally loaded from a TOML file
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// how the external btrfs tool is invoked
    #[serde(default)]
    pub btrfs: BtrfsConfig,
    /// logging defaults
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// load config from file if one was given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// invocation of the `btrfs` command line tool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BtrfsConfig {
    /// program name or path
    #[serde(default = "default_program")]
    pub program: String,
    /// prefix every invocation with `sudo`
    #[serde(default = "default_sudo")]
    pub sudo: bool,
}

fn default_program() -> String {
    "btrfs".to_string()
}

fn default_sudo() -> bool {
    true
}

impl Default for BtrfsConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            sudo: default_sudo(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// filter used when RUST_LOG is unset
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}
