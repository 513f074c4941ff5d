//! Configuration management for chatwire.
//!
//! Configuration is loaded from `~/.config/chatwire/config.toml`. Every field
//! has a default, so the file is optional and may be partial.

use crate::client::framer::{DEFAULT_CHUNK_SIZE, DEFAULT_IDLE_TIMEOUT};
use crate::protocol::DEFAULT_MAX_INPUT;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server to connect to.
    #[serde(default)]
    pub server: ServerConfig,
    /// Reply framing parameters.
    #[serde(default)]
    pub framing: FramingConfig,
    /// Interactive session settings.
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname or IP address (default: 127.0.0.1).
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port (default: 3000).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Connect timeout in seconds. Unset means the system default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramingConfig {
    /// Bytes requested per read.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Silence after a partial reply that marks it complete, in milliseconds.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl Default for FramingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Longest message, in bytes, that will be sent.
    #[serde(default = "default_max_input")]
    pub max_input: usize,
    /// When to style output.
    #[serde(default)]
    pub color: ColorMode,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_input: default_max_input(),
            color: ColorMode::default(),
        }
    }
}

/// When to emit terminal styling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Only when stdout is a terminal.
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorMode {
    pub fn enabled(self) -> bool {
        match self {
            ColorMode::Auto => atty::is(atty::Stream::Stdout),
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_idle_timeout_ms() -> u64 {
    DEFAULT_IDLE_TIMEOUT.as_millis() as u64
}

fn default_max_input() -> usize {
    DEFAULT_MAX_INPUT
}

impl Config {
    /// Get the config directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("chatwire"))
            .context("Could not determine config directory")
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from `path`, or the default location when `None`.
    ///
    /// A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };
        let config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the framer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.framing.chunk_size == 0 {
            bail!("framing.chunk_size must be at least 1");
        }
        if self.framing.idle_timeout_ms == 0 {
            bail!("framing.idle_timeout_ms must be at least 1");
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.framing.idle_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.server.connect_timeout_secs.map(Duration::from_secs)
    }
}
