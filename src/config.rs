// ⚙️ Runtime configuration from the environment
//
//   FUELEU_DB_PATH     sqlite file            (fueleu.db)
//   FUELEU_HOST        server bind address    (0.0.0.0)
//   FUELEU_PORT        server port            (3000)
//   FUELEU_LOG_FORMAT  compact | json         (compact)
//   FUELEU_VERBOSE     debug logging when set (false)

use anyhow::{bail, Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" | "" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => bail!("unknown log format '{}' (expected compact or json)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: PathBuf::from("fueleu.db"),
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_format: LogFormat::Compact,
            verbose: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let port = match lookup("FUELEU_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("FUELEU_PORT is not a valid port: '{}'", raw))?,
            None => defaults.port,
        };

        let log_format = match lookup("FUELEU_LOG_FORMAT") {
            Some(raw) => LogFormat::parse(&raw)?,
            None => defaults.log_format,
        };

        let verbose = lookup("FUELEU_VERBOSE")
            .map(|raw| matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.verbose);

        let config = Config {
            db_path: lookup("FUELEU_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            host: lookup("FUELEU_HOST").unwrap_or(defaults.host),
            port,
            log_format,
            verbose,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            bail!("FUELEU_DB_PATH must not be empty");
        }
        if self.port == 0 {
            bail!("FUELEU_PORT must be between 1 and 65535");
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}
