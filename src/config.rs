use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name}: cannot parse {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Server settings, read from `COURTBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    /// `None` when the HTTP availability endpoint is turned off.
    pub http_port: Option<u16>,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5433,
            http_port: Some(8080),
            data_dir: PathBuf::from("./data"),
            password: "courtbook".into(),
            max_connections: 256,
            compact_threshold: 1000,
            tls_cert: None,
            tls_key: None,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any key/value source; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let http_port = match get("COURTBOOK_HTTP_PORT") {
            Some(v) if v.eq_ignore_ascii_case("off") => None,
            Some(v) => Some(parse("COURTBOOK_HTTP_PORT", v)?),
            None => defaults.http_port,
        };

        Ok(Self {
            bind: get("COURTBOOK_BIND").unwrap_or(defaults.bind),
            port: get("COURTBOOK_PORT")
                .map(|v| parse("COURTBOOK_PORT", v))
                .transpose()?
                .unwrap_or(defaults.port),
            http_port,
            data_dir: get("COURTBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            password: get("COURTBOOK_PASSWORD").unwrap_or(defaults.password),
            max_connections: get("COURTBOOK_MAX_CONNECTIONS")
                .map(|v| parse("COURTBOOK_MAX_CONNECTIONS", v))
                .transpose()?
                .unwrap_or(defaults.max_connections),
            compact_threshold: get("COURTBOOK_COMPACT_THRESHOLD")
                .map(|v| parse("COURTBOOK_COMPACT_THRESHOLD", v))
                .transpose()?
                .unwrap_or(defaults.compact_threshold),
            tls_cert: get("COURTBOOK_TLS_CERT").map(PathBuf::from),
            tls_key: get("COURTBOOK_TLS_KEY").map(PathBuf::from),
            metrics_port: get("COURTBOOK_METRICS_PORT")
                .map(|v| parse("COURTBOOK_METRICS_PORT", v))
                .transpose()?,
        })
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}
