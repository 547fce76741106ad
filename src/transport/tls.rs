//! TLS transport implementation using tokio-rustls (RFC 7589).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use super::config::TlsConfig;
use super::{BoxRead, BoxWrite, Transport, TransportHandle};
use crate::error::{Error, Result, TransportError};

/// TLS transport wrapping a client-authenticated rustls stream.
pub struct TlsTransport {
    stream: TlsStream<TcpStream>,
}

impl TlsTransport {
    /// Dial the server and complete the TLS handshake.
    ///
    /// The whole sequence runs under `config.timeout`; on expiry the
    /// partially established connection is torn down.
    pub async fn dial(config: TlsConfig) -> Result<Self> {
        let timeout = config.timeout;
        tokio::time::timeout(timeout, Self::dial_inner(config))
            .await
            .map_err(|_| Error::Transport(TransportError::Timeout(timeout)))?
    }

    async fn dial_inner(config: TlsConfig) -> Result<Self> {
        let tls_config = Arc::new(build_client_config(&config)?);

        let tcp = TcpStream::connect((config.host.as_str(), config.port))
            .await
            .map_err(|source| TransportError::ConnectionFailed {
                host: config.host.clone(),
                port: config.port,
                source,
            })?;

        let name = config.server_name.clone().unwrap_or_else(|| config.host.clone());
        let server_name = ServerName::try_from(name)
            .map_err(|e| TransportError::Tls(format!("invalid server name: {e}")))?;

        let stream = TlsConnector::from(tls_config)
            .connect(server_name, tcp)
            .await
            .map_err(|e| TransportError::Tls(e.to_string()))?;

        debug!("tls transport established to {}:{}", config.host, config.port);

        Ok(Self { stream })
    }
}

fn build_client_config(config: &TlsConfig) -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(&config.ca_file)? {
        roots
            .add(cert)
            .map_err(|e| Error::Transport(TransportError::Tls(e.to_string())))?;
    }

    let builder = ClientConfig::builder().with_root_certificates(roots);

    let tls_config = match (&config.cert_file, &config.key_file) {
        (Some(cert_file), Some(key_file)) => {
            let certs = load_certs(cert_file)?;
            let key = load_key(key_file)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| Error::Transport(TransportError::Tls(e.to_string())))?
        }
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(Error::InvalidValue(
                "client cert and key files must both be set".into(),
            ))
        }
    };

    Ok(tls_config)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| {
        Error::Transport(TransportError::Tls(format!(
            "failed to open {}: {e}",
            path.display()
        )))
    })?;
    let certs: std::io::Result<Vec<_>> = rustls_pemfile::certs(&mut BufReader::new(file)).collect();
    certs.map_err(|e| Error::Transport(TransportError::Tls(e.to_string())))
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| {
        Error::Transport(TransportError::Tls(format!(
            "failed to open {}: {e}",
            path.display()
        )))
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| Error::Transport(TransportError::Tls(e.to_string())))?
        .ok_or_else(|| {
            Error::Transport(TransportError::Tls(format!(
                "no private key found in {}",
                path.display()
            )))
        })
}

impl Transport for TlsTransport {
    fn into_parts(self) -> (BoxRead, BoxWrite, Box<dyn TransportHandle>) {
        let (read, write) = tokio::io::split(self.stream);
        (Box::new(read), Box::new(write), Box::new(TlsHandle))
    }
}

/// Closing a TLS connection is just shutting down the write half, which
/// the session already did before calling close.
struct TlsHandle;

#[async_trait]
impl TransportHandle for TlsHandle {
    async fn close(&mut self) -> std::result::Result<(), TransportError> {
        Ok(())
    }
}
