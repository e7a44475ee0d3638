//! Configuration for the echo and relay tools.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Command-line arguments for the echo/stimulus tool
#[derive(Parser, Debug)]
#[command(name = "pipe-echo")]
#[command(version)]
#[command(about = "Answer every batch read from a pipe with synthetic headers and an echo", long_about = None)]
pub struct EchoArgs {
    /// Pipe to open (must already exist)
    pub pipe: String,

    /// Heartbeat period in milliseconds (0 = disabled)
    pub timeout_ms: Option<u64>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Command-line arguments for the relay tool
#[derive(Parser, Debug)]
#[command(name = "pipe-relay")]
#[command(version)]
#[command(about = "Relay and log traffic between an agent pipe and an extension pipe", long_about = None)]
pub struct RelayArgs {
    /// Pipe to create and listen on (the agent connects here)
    pub agent_pipe: String,

    /// Existing pipe to open (the extension is listening there)
    pub extension_pipe: String,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub pipe: PipeSection,
    #[serde(default)]
    pub echo: EchoSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Pipe I/O configuration
#[derive(Debug, Deserialize)]
pub struct PipeSection {
    /// Maximum bytes requested by a single read
    #[serde(default = "default_chunk_size")]
    pub read_chunk_size: usize,
    /// Kernel buffer size for created pipes
    #[serde(default = "default_chunk_size")]
    pub buffer_size: usize,
}

impl Default for PipeSection {
    fn default() -> Self {
        Self {
            read_chunk_size: default_chunk_size(),
            buffer_size: default_chunk_size(),
        }
    }
}

/// Echo tool configuration
#[derive(Debug, Deserialize, Default)]
pub struct EchoSection {
    /// Heartbeat period in milliseconds
    #[serde(default)]
    pub heartbeat_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_chunk_size() -> usize {
    4096
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved pipe I/O settings shared by both tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeSettings {
    pub read_chunk_size: usize,
    pub buffer_size: usize,
}

impl Default for PipeSettings {
    fn default() -> Self {
        Self {
            read_chunk_size: default_chunk_size(),
            buffer_size: default_chunk_size(),
        }
    }
}

impl PipeSettings {
    fn from_section(section: PipeSection) -> Result<Self, ConfigError> {
        if section.read_chunk_size == 0 {
            return Err(ConfigError::Invalid("pipe.read_chunk_size must be positive"));
        }
        if section.buffer_size == 0 {
            return Err(ConfigError::Invalid("pipe.buffer_size must be positive"));
        }
        Ok(Self {
            read_chunk_size: section.read_chunk_size,
            buffer_size: section.buffer_size,
        })
    }
}

/// Final resolved configuration of the echo tool
#[derive(Debug, Clone)]
pub struct EchoConfig {
    pub pipe: String,
    pub heartbeat: Option<Duration>,
    pub settings: PipeSettings,
    pub log_level: String,
}

impl EchoConfig {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(EchoArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point at.
    pub fn from_args(cli: EchoArgs) -> Result<Self, ConfigError> {
        let toml_config = read_toml(cli.config.as_deref())?;

        let heartbeat_ms = cli.timeout_ms.unwrap_or(toml_config.echo.heartbeat_ms);

        Ok(EchoConfig {
            pipe: cli.pipe,
            heartbeat: (heartbeat_ms > 0).then(|| Duration::from_millis(heartbeat_ms)),
            settings: PipeSettings::from_section(toml_config.pipe)?,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

/// Final resolved configuration of the relay tool
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub agent_pipe: String,
    pub extension_pipe: String,
    pub settings: PipeSettings,
    pub log_level: String,
}

impl RelayConfig {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(RelayArgs::parse())
    }

    /// Merge parsed CLI args with the TOML file they point at.
    pub fn from_args(cli: RelayArgs) -> Result<Self, ConfigError> {
        let toml_config = read_toml(cli.config.as_deref())?;

        Ok(RelayConfig {
            agent_pipe: cli.agent_pipe,
            extension_pipe: cli.extension_pipe,
            settings: PipeSettings::from_section(toml_config.pipe)?,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        })
    }
}

fn read_toml(path: Option<&Path>) -> Result<TomlConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(TomlConfig::default());
    };

    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
    toml::from_str(&contents).map_err(|e| ConfigError::TomlParse(path.to_path_buf(), e))
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
