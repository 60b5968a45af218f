//! TLS material loading and stream wrapping.
//!
//! Servers load a certificate chain and private key from PEM files; clients
//! trust the certificates in a PEM bundle (typically the server's own
//! self-signed certificate).

use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;

use log::debug;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, ServerConfig, ServerConnection, StreamOwned};

use crate::error::{LoftError, Result};
use crate::transport::Connection;

fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(path)?.collect::<std::result::Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(LoftError::Tls(rustls::Error::General(format!(
            "no certificates found in {}",
            path.display()
        ))));
    }
    Ok(certs)
}

/// Build a server configuration from a PEM certificate chain and key.
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>> {
    let certs = load_certs(cert_path)?;
    let key = PrivateKeyDer::from_pem_file(key_path)?;
    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    debug!("loaded tls identity from {}", cert_path.display());
    Ok(Arc::new(config))
}

/// Build a client configuration trusting the certificates in `ca_path`.
pub fn load_client_config(ca_path: &Path) -> Result<Arc<ClientConfig>> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(ca_path)? {
        roots.add(cert)?;
    }
    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Wrap an accepted socket in a server-side TLS session.
///
/// The handshake runs on first read.
pub fn accept(config: &Arc<ServerConfig>, stream: TcpStream) -> Result<Connection> {
    let session = ServerConnection::new(Arc::clone(config))?;
    let socket = stream.try_clone()?;
    Ok(Connection::shared(StreamOwned::new(session, stream), socket))
}

/// Wrap a connected socket in a client-side TLS session for `server_name`.
pub fn connect(config: &Arc<ClientConfig>, server_name: &str, stream: TcpStream) -> Result<Connection> {
    let name = ServerName::try_from(server_name.to_string())
        .map_err(|_| LoftError::InvalidServerName(server_name.to_string()))?;
    let session = ClientConnection::new(Arc::clone(config), name)?;
    let socket = stream.try_clone()?;
    Ok(Connection::shared(StreamOwned::new(session, stream), socket))
}
