//! Server Configuration
//!
//! Settings are layered, later sources overriding earlier ones:
//!
//! 1. built-in defaults
//! 2. a config file given with `--config <path>`
//! 3. the remaining command-line flags
//!
//! The config file holds one `name value` pair per line. Blank lines and
//! lines starting with `#` are skipped.
//!
//! ```text
//! # wheelkv.conf
//! bind 0.0.0.0
//! port 6380
//! shardcount 32
//! tickms 100
//! ```

use crate::storage::{DbConfig, WheelConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: expected 'name value', got {text:?}")]
    Format { line: usize, text: String },

    #[error("line {line}: unknown parameter '{name}'")]
    UnknownParam { name: String, line: usize },

    #[error("invalid value {value:?} for '{name}'")]
    InvalidValue { name: String, value: String },

    #[error("missing value for {0}")]
    MissingValue(String),

    #[error("unknown argument '{0}'")]
    UnknownFlag(String),
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Startup {
    Run(Config),
    Help,
    Version,
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub shard_count: usize,
    /// Key lock slots; four per shard when unset.
    pub lock_count: Option<usize>,
    pub tick_ms: u64,
    pub slots: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: crate::DEFAULT_HOST.to_string(),
            port: crate::DEFAULT_PORT,
            shard_count: 16,
            lock_count: None,
            tick_ms: 1000,
            slots: 60,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Parses process arguments (without the program name).
    pub fn from_args<I>(args: I) -> Result<Startup, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config_file = None;
        let mut overrides = Vec::new();

        let mut args = args.into_iter();
        while let Some(flag) = args.next() {
            let name = match flag.as_str() {
                "--help" => return Ok(Startup::Help),
                "--version" | "-v" => return Ok(Startup::Version),
                "--config" | "-c" => None,
                "--host" | "-h" => Some("bind"),
                "--port" | "-p" => Some("port"),
                "--shards" => Some("shardcount"),
                "--locks" => Some("lockcount"),
                "--tick-ms" => Some("tickms"),
                "--slots" => Some("slots"),
                "--loglevel" => Some("loglevel"),
                _ => return Err(ConfigError::UnknownFlag(flag)),
            };
            let value = args
                .next()
                .ok_or_else(|| ConfigError::MissingValue(flag.clone()))?;

            match name {
                Some(name) => overrides.push((name, value)),
                None => config_file = Some(PathBuf::from(value)),
            }
        }

        let mut config = match config_file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        for (name, value) in overrides {
            config.apply(name, &value)?;
        }
        Ok(Startup::Run(config))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_text(&text)
    }

    /// Parses config file contents over the defaults.
    pub fn from_text(text: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((name, value)) = line.split_once(char::is_whitespace) else {
                return Err(ConfigError::Format {
                    line: index + 1,
                    text: line.to_string(),
                });
            };
            let name = name.to_ascii_lowercase();
            if !config.apply(&name, value.trim())? {
                return Err(ConfigError::UnknownParam {
                    name,
                    line: index + 1,
                });
            }
        }

        Ok(config)
    }

    /// Sets one parameter, returning `false` for an unknown name.
    fn apply(&mut self, name: &str, value: &str) -> Result<bool, ConfigError> {
        match name {
            "bind" => self.bind = value.to_string(),
            "port" => self.port = parse_number(name, value)?,
            "shardcount" => self.shard_count = parse_positive(name, value)?,
            "lockcount" => self.lock_count = Some(parse_positive(name, value)?),
            "tickms" => self.tick_ms = parse_positive(name, value)?,
            "slots" => self.slots = parse_positive(name, value)?,
            "loglevel" => {
                let level = value.to_ascii_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    return Err(invalid(name, value));
                }
                self.log_level = level;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Engine sizing derived from these settings.
    pub fn db_config(&self) -> DbConfig {
        let lock_count = self
            .lock_count
            .unwrap_or_else(|| self.shard_count.saturating_mul(4))
            .next_power_of_two();

        DbConfig {
            shard_count: self.shard_count,
            lock_count,
            wheel: WheelConfig {
                tick: Duration::from_millis(self.tick_ms),
                slots: self.slots,
            },
        }
    }
}

fn invalid(name: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(name, value))
}

fn parse_positive<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let n: T = parse_number(name, value)?;
    if n <= T::default() {
        return Err(invalid(name, value));
    }
    Ok(n)
}

pub fn help_text() -> String {
    format!(
        "wheelkv {version}

USAGE:
    wheelkv [OPTIONS]

OPTIONS:
    -c, --config <PATH>      Read settings from a config file
    -h, --host <HOST>        Address to bind (default: {host})
    -p, --port <PORT>        Port to listen on (default: {port})
        --shards <N>         Keyspace shards (default: 16)
        --locks <N>          Key lock slots (default: 4 per shard)
        --tick-ms <MS>       Timing wheel tick (default: 1000)
        --slots <N>          Timing wheel slots (default: 60)
        --loglevel <LEVEL>   trace, debug, info, warn or error (default: info)
    -v, --version            Print version information
        --help               Print this help message
",
        version = crate::VERSION,
        host = crate::DEFAULT_HOST,
        port = crate::DEFAULT_PORT,
    )
}
