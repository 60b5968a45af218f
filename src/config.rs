//! Server and client configuration.
//!
//! Both configurations can be read from a TOML file; every field has a
//! default so a partial file is fine.
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Default address the server listens on and the client dials.
pub const DEFAULT_ADDR: &str = "127.0.0.1:8089";

/// Settings for [`crate::server::LoftServer`].
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub listen_addr: String,
    /// Directory holding one file per bucket. Must exist.
    pub bucket_path: PathBuf,
    /// Serve TLS instead of plain TCP.
    pub tls: Option<TlsConfig>,
    /// Per-read timeout on client sockets; none by default.
    pub read_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_ADDR.to_string(),
            bucket_path: PathBuf::from("./buckets"),
            tls: None,
            read_timeout_secs: None,
        }
    }
}

impl ServerConfig {
    /// Read a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Read timeout as a duration, if any.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }
}

/// Server certificate and key, both PEM.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TlsConfig {
    /// Certificate chain.
    pub cert_path: PathBuf,
    /// Private key.
    pub key_path: PathBuf,
}

/// Settings for [`crate::client::LoftClient`].
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Server to dial.
    pub server_addr: String,
    /// Connect over TLS.
    pub tls: Option<ClientTlsConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: DEFAULT_ADDR.to_string(),
            tls: None,
        }
    }
}

impl ClientConfig {
    /// Read a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Name checked against the server certificate: the configured one, or
    /// the host part of `server_addr`.
    pub fn server_name(&self) -> String {
        if let Some(name) = self.tls.as_ref().and_then(|tls| tls.server_name.clone()) {
            return name;
        }
        let addr = self.server_addr.as_str();
        let host = match addr.rsplit_once(':') {
            Some((host, _)) => host,
            None => addr,
        };
        host.trim_start_matches('[').trim_end_matches(']').to_string()
    }
}

/// Trust settings for a TLS client.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ClientTlsConfig {
    /// PEM bundle of trusted certificates.
    pub ca_path: PathBuf,
    /// Override for the name verified against the certificate.
    #[serde(default)]
    pub server_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.listen_addr, DEFAULT_ADDR);
        assert_eq!(c.bucket_path, PathBuf::from("./buckets"));
        assert!(c.tls.is_none());
        assert!(c.read_timeout().is_none());
    }

    #[test]
    fn partial_server_file() {
        let c: ServerConfig = toml::from_str(
            r#"
            bucket_path = "/srv/buckets"
            read_timeout_secs = 30

            [tls]
            cert_path = "server.pem"
            key_path = "server.key"
            "#,
        )
        .unwrap();
        assert_eq!(c.listen_addr, DEFAULT_ADDR);
        assert_eq!(c.bucket_path, PathBuf::from("/srv/buckets"));
        assert_eq!(c.read_timeout(), Some(Duration::from_secs(30)));
        let tls = c.tls.unwrap();
        assert_eq!(tls.cert_path, PathBuf::from("server.pem"));
        assert_eq!(tls.key_path, PathBuf::from("server.key"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("loft.toml");
        fs::write(&path, "server_addr = \"10.0.0.1:9000\"\n").unwrap();
        let c = ClientConfig::load(&path).unwrap();
        assert_eq!(c.server_addr, "10.0.0.1:9000");
        assert!(c.tls.is_none());
    }

    #[test]
    fn bad_file_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("loft.toml");
        fs::write(&path, "listen_addr = 5\n").unwrap();
        assert!(matches!(
            ServerConfig::load(&path),
            Err(crate::LoftError::Config(_))
        ));
    }

    #[test]
    fn server_name_from_addr() {
        let mut c = ClientConfig {
            server_addr: "localhost:8089".to_string(),
            tls: None,
        };
        assert_eq!(c.server_name(), "localhost");
        c.server_addr = "[::1]:8089".to_string();
        assert_eq!(c.server_name(), "::1");
        c.tls = Some(ClientTlsConfig {
            ca_path: "ca.pem".into(),
            server_name: Some("loft.example".to_string()),
        });
        assert_eq!(c.server_name(), "loft.example");
    }
}
