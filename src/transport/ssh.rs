//! SSH transport implementation using russh.
//!
//! Opens a session channel and requests the `netconf` subsystem
//! (RFC 6242); the channel's byte stream is what the session frames
//! messages over.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::{debug, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::{load_secret_key, PrivateKeyWithHashAlg, PublicKey};
use russh::{Channel, ChannelStream, Disconnect};

use super::config::{AuthMethod, HostKeyVerification, SshConfig};
use super::{BoxRead, BoxWrite, Transport, TransportHandle};
use crate::error::{Error, Result, TransportError};

const SUBSYSTEM: &str = "netconf";

/// SSH transport wrapping a russh session channel running the `netconf`
/// subsystem.
pub struct SshTransport {
    stream: ChannelStream<Msg>,

    /// The connection handle, present only when this transport dialed the
    /// connection itself. Borrowed channels leave the caller's connection
    /// alone on close.
    conn: Option<Handle<SshHandler>>,
}

impl SshTransport {
    /// Dial the server, authenticate, and start the `netconf` subsystem.
    ///
    /// The whole sequence runs under `config.timeout`; on expiry the
    /// partially established connection is torn down.
    pub async fn dial(config: SshConfig) -> Result<Self> {
        let timeout = config.timeout;
        tokio::time::timeout(timeout, Self::dial_inner(config))
            .await
            .map_err(|_| Error::Transport(TransportError::Timeout(timeout)))?
    }

    async fn dial_inner(config: SshConfig) -> Result<Self> {
        let ssh_config = Arc::new(client::Config {
            keepalive_interval: config.keepalive_interval,
            keepalive_max: config.keepalive_max,
            ..Default::default()
        });

        let host_key_error: Arc<Mutex<Option<TransportError>>> = Arc::new(Mutex::new(None));

        let handler = SshHandler {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification.clone(),
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: host_key_error.clone(),
        };

        let mut session =
            client::connect(ssh_config, (config.host.as_str(), config.port), handler)
                .await
                .map_err(|e| {
                    // If check_server_key stored a detailed error, surface
                    // that instead of the generic russh::Error::UnknownKey
                    if let Some(hk_err) = host_key_error.lock().unwrap().take() {
                        hk_err
                    } else {
                        TransportError::Ssh(e)
                    }
                })?;

        Self::authenticate(&mut session, &config).await?;

        let channel = session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;
        channel
            .request_subsystem(true, SUBSYSTEM)
            .await
            .map_err(|_| TransportError::SubsystemFailed)?;

        debug!(
            "ssh transport established to {}:{} as {}",
            config.host, config.port, config.username
        );

        Ok(Self {
            stream: channel.into_stream(),
            conn: Some(session),
        })
    }

    /// Build a transport over a channel from an existing, already
    /// authenticated russh connection. Closing the resulting session does
    /// not disconnect the shared connection.
    pub async fn from_channel(channel: Channel<Msg>) -> Result<Self> {
        channel
            .request_subsystem(true, SUBSYSTEM)
            .await
            .map_err(|_| Error::Transport(TransportError::SubsystemFailed))?;

        Ok(Self {
            stream: channel.into_stream(),
            conn: None,
        })
    }

    /// Authenticate with the server.
    async fn authenticate(session: &mut Handle<SshHandler>, config: &SshConfig) -> Result<()> {
        let success = match &config.auth {
            AuthMethod::None => session
                .authenticate_none(&config.username)
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::Password(password) => session
                .authenticate_password(&config.username, password)
                .await
                .map_err(TransportError::Ssh)?
                .success(),
            AuthMethod::PrivateKey { path, passphrase } => {
                let key = load_secret_key(path, passphrase.as_deref())
                    .map_err(|e| TransportError::Key(e.to_string()))?;

                // Pick the best RSA hash algorithm the server supports
                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(TransportError::Ssh)?
                    .flatten();

                session
                    .authenticate_publickey(
                        &config.username,
                        PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                    )
                    .await
                    .map_err(TransportError::Ssh)?
                    .success()
            }
        };

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: config.username.clone(),
            }
            .into());
        }

        Ok(())
    }
}

impl Transport for SshTransport {
    fn into_parts(self) -> (BoxRead, BoxWrite, Box<dyn TransportHandle>) {
        let (read, write) = tokio::io::split(self.stream);
        (
            Box::new(read),
            Box::new(write),
            Box::new(SshHandle { conn: self.conn }),
        )
    }
}

struct SshHandle {
    conn: Option<Handle<SshHandler>>,
}

#[async_trait]
impl TransportHandle for SshHandle {
    async fn close(&mut self) -> std::result::Result<(), TransportError> {
        if let Some(conn) = self.conn.take() {
            conn.disconnect(Disconnect::ByApplication, "", "en")
                .await
                .map_err(TransportError::Ssh)?;
        }
        Ok(())
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Stores a detailed host-key error so dial() can surface it
    /// instead of the generic russh::Error::UnknownKey.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    /// Check the host key against known_hosts.
    ///
    /// Returns `Ok(true)` if matched, `Ok(false)` if host not found,
    /// `Err(TransportError::HostKeyChanged)` if key changed.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    /// Save a new host key to known_hosts.
    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.host_key_verification {
            HostKeyVerification::Disabled => Ok(true),

            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    // Unknown host — learn the key
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("failed to save host key: {}", e);
                    }
                    Ok(true)
                }
                Err(e) => {
                    // Key changed — store detailed error and reject
                    *self.host_key_error.lock().unwrap() = Some(e);
                    Ok(false)
                }
            },

            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    // Unknown host — reject in strict mode
                    *self.host_key_error.lock().unwrap() =
                        Some(TransportError::HostKeyUnknown {
                            host: self.host.clone(),
                            port: self.port,
                        });
                    Ok(false)
                }
                Err(e) => {
                    *self.host_key_error.lock().unwrap() = Some(e);
                    Ok(false)
                }
            },
        }
    }
}
