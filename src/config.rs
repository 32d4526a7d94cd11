use anyhow::Context;
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub mod providers;

pub use providers::{ProductCredentials, ProviderConfig, ProvidersConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => anyhow::bail!("LOG_FORMAT must be 'pretty' or 'json', got '{}'", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: Option<String>,
    pub providers_file: PathBuf,
    pub request_timeout: Duration,
    pub upstream_timeout: Option<Duration>,
    pub log_format: LogFormat,
    pub log_request_body: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .context("SERVER_PORT must be a port number")?,
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            providers_file: env::var("PROVIDERS_FILE")
                .unwrap_or_else(|_| "providers.json".to_string())
                .into(),
            request_timeout: Duration::from_secs(
                env::var("REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse::<u64>()
                    .context("REQUEST_TIMEOUT_SECS must be a whole number of seconds")?,
            ),
            upstream_timeout: env::var("UPSTREAM_TIMEOUT_SECS")
                .ok()
                .map(|raw| raw.parse::<u64>().map(Duration::from_secs))
                .transpose()
                .context("UPSTREAM_TIMEOUT_SECS must be a whole number of seconds")?,
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .parse::<LogFormat>()?,
            log_request_body: env::var("LOG_REQUEST_BODY")
                .unwrap_or_else(|_| "false".to_string())
                .parse::<bool>()
                .unwrap_or(false),
        })
    }

    pub fn load_providers(&self) -> anyhow::Result<ProvidersConfig> {
        ProvidersConfig::from_file(&self.providers_file)
    }
}
