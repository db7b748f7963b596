use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::path::PathBuf;
use std::sync::Arc;

use pgwire::tokio::TlsAcceptor;
use pgwire::tokio::tokio_rustls::rustls::ServerConfig;

pub const WAL_FILE_NAME: &str = "slotbook.wal";

/// Server settings, read from `SLOTBOOK_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    /// Login user allowed to run schedule administration.
    pub admin_user: String,
    pub max_connections: usize,
    /// WAL appends after which the compactor rewrites the log.
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5433,
            bind: "0.0.0.0".into(),
            data_dir: PathBuf::from("./data"),
            password: "slotbook".into(),
            admin_user: "admin".into(),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            tls_cert: None,
            tls_key: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &'static str| lookup(key).filter(|v| !v.is_empty());

        let config = Self {
            port: parse_or("SLOTBOOK_PORT", var("SLOTBOOK_PORT"), defaults.port)?,
            bind: var("SLOTBOOK_BIND").unwrap_or(defaults.bind),
            data_dir: var("SLOTBOOK_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            password: var("SLOTBOOK_PASSWORD").unwrap_or(defaults.password),
            admin_user: var("SLOTBOOK_ADMIN_USER").unwrap_or(defaults.admin_user),
            max_connections: parse_or(
                "SLOTBOOK_MAX_CONNECTIONS",
                var("SLOTBOOK_MAX_CONNECTIONS"),
                defaults.max_connections,
            )?,
            compact_threshold: parse_or(
                "SLOTBOOK_COMPACT_THRESHOLD",
                var("SLOTBOOK_COMPACT_THRESHOLD"),
                defaults.compact_threshold,
            )?,
            metrics_port: var("SLOTBOOK_METRICS_PORT")
                .map(|v| parse("SLOTBOOK_METRICS_PORT", v))
                .transpose()?,
            tls_cert: var("SLOTBOOK_TLS_CERT").map(PathBuf::from),
            tls_key: var("SLOTBOOK_TLS_KEY").map(PathBuf::from),
        };

        if config.tls_cert.is_some() != config.tls_key.is_some() {
            return Err(ConfigError::TlsPair);
        }
        if config.max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "SLOTBOOK_MAX_CONNECTIONS",
                value: "0".into(),
            });
        }
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }

    /// Load the TLS acceptor when a certificate pair is configured.
    pub fn tls_acceptor(&self) -> io::Result<Option<TlsAcceptor>> {
        let (Some(cert_path), Some(key_path)) = (&self.tls_cert, &self.tls_key) else {
            return Ok(None);
        };

        let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(File::open(cert_path)?))
            .collect::<Result<_, _>>()?;

        let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key_path)?))?
            .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "no private key found in key file"))?;

        let mut config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;

        config.alpn_protocols = vec![b"postgresql".to_vec()];

        Ok(Some(TlsAcceptor::from(Arc::new(config))))
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    value.map_or(Ok(default), |v| parse(key, v))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { key: &'static str, value: String },
    TlsPair,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { key, value } => write!(f, "invalid value for {key}: {value:?}"),
            ConfigError::TlsPair => write!(
                f,
                "both SLOTBOOK_TLS_CERT and SLOTBOOK_TLS_KEY must be set, or neither"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.listen_addr(), "0.0.0.0:5433");
        assert_eq!(config.wal_path(), PathBuf::from("./data").join("slotbook.wal"));
    }

    #[test]
    fn overrides_apply() {
        let config = from_pairs(&[
            ("SLOTBOOK_PORT", "6000"),
            ("SLOTBOOK_BIND", "127.0.0.1"),
            ("SLOTBOOK_DATA_DIR", "/var/lib/slotbook"),
            ("SLOTBOOK_ADMIN_USER", "front_desk"),
            ("SLOTBOOK_MAX_CONNECTIONS", "8"),
            ("SLOTBOOK_COMPACT_THRESHOLD", "50"),
            ("SLOTBOOK_METRICS_PORT", "9100"),
        ])
        .unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:6000");
        assert_eq!(config.wal_path(), PathBuf::from("/var/lib/slotbook/slotbook.wal"));
        assert_eq!(config.admin_user, "front_desk");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.compact_threshold, 50);
        assert_eq!(config.metrics_port, Some(9100));
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let config = from_pairs(&[("SLOTBOOK_PORT", ""), ("SLOTBOOK_PASSWORD", "")]).unwrap();
        assert_eq!(config.port, 5433);
        assert_eq!(config.password, "slotbook");
    }

    #[test]
    fn malformed_number_rejected() {
        let err = from_pairs(&[("SLOTBOOK_PORT", "fivefour")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "SLOTBOOK_PORT",
                value: "fivefour".into()
            }
        );
    }

    #[test]
    fn zero_connections_rejected() {
        assert!(from_pairs(&[("SLOTBOOK_MAX_CONNECTIONS", "0")]).is_err());
    }

    #[test]
    fn tls_requires_both_files() {
        let err = from_pairs(&[("SLOTBOOK_TLS_CERT", "cert.pem")]).unwrap_err();
        assert_eq!(err, ConfigError::TlsPair);
    }

    #[test]
    fn no_tls_configured_yields_no_acceptor() {
        assert!(Config::default().tls_acceptor().unwrap().is_none());
    }

    #[test]
    fn missing_cert_file_is_io_error() {
        let config = Config {
            tls_cert: Some(PathBuf::from("/nonexistent/cert.pem")),
            tls_key: Some(PathBuf::from("/nonexistent/key.pem")),
            ..Config::default()
        };
        assert!(config.tls_acceptor().is_err());
    }
}
