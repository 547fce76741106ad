//! Transport connection configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default SSH port for the NETCONF subsystem (RFC 6242).
pub const DEFAULT_SSH_PORT: u16 = 830;

/// Default port for NETCONF over TLS (RFC 7589).
pub const DEFAULT_TLS_PORT: u16 = 6513;

/// Host key verification mode, analogous to OpenSSH's
/// `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default)]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys. Connection fails if the host
    /// is not already in known_hosts.
    Strict,

    /// Accept and auto-learn unknown keys, but reject changed keys.
    /// This is the default and matches common SSH client behavior.
    #[default]
    AcceptNew,

    /// Accept all keys without checking. For testing and lab use only.
    Disabled,
}

/// Authentication method for SSH connections.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    /// No authentication (for testing only).
    None,

    /// Password authentication.
    Password(String),

    /// Private key authentication.
    PrivateKey {
        /// Path to the private key file.
        path: PathBuf,
        /// Optional passphrase for encrypted keys.
        passphrase: Option<String>,
    },
}

/// SSH connection configuration for [`SshTransport`](super::SshTransport).
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// SSH port (default: 830, the IANA port for the netconf subsystem).
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Authentication method.
    pub auth: AuthMethod,

    /// Deadline covering TCP connect, SSH handshake, and authentication.
    pub timeout: Duration,

    /// Host key verification mode.
    pub host_key_verification: HostKeyVerification,

    /// Path to known_hosts file. `None` uses the user default.
    pub known_hosts_path: Option<PathBuf>,

    /// SSH keepalive interval. `None` disables keepalive packets.
    pub keepalive_interval: Option<Duration>,

    /// Maximum number of unanswered keepalive packets before the
    /// connection is considered dead.
    pub keepalive_max: usize,
}

impl SshConfig {
    /// Configuration with defaults for the given host and user.
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: username.into(),
            auth: AuthMethod::None,
            timeout: Duration::from_secs(30),
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Password(password.into());
        self
    }

    pub fn private_key(mut self, path: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        self.auth = AuthMethod::PrivateKey {
            path: path.into(),
            passphrase,
        };
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host_key_verification(mut self, mode: HostKeyVerification) -> Self {
        self.host_key_verification = mode;
        self
    }

    pub fn known_hosts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts_path = Some(path.into());
        self
    }

    pub fn keepalive_interval(mut self, interval: Option<Duration>) -> Self {
        self.keepalive_interval = interval;
        self
    }
}

/// TLS connection configuration for [`TlsTransport`](super::TlsTransport).
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Target host (hostname or IP address).
    pub host: String,

    /// TLS port (default: 6513).
    pub port: u16,

    /// Name presented for SNI and certificate validation. Defaults to
    /// `host`.
    pub server_name: Option<String>,

    /// PEM file with the trust roots used to verify the server.
    pub ca_file: PathBuf,

    /// PEM file with the client certificate chain, if the server requires
    /// mutual TLS.
    pub cert_file: Option<PathBuf>,

    /// PEM file with the client private key. Required when `cert_file` is
    /// set.
    pub key_file: Option<PathBuf>,

    /// Deadline covering TCP connect and the TLS handshake.
    pub timeout: Duration,
}

impl TlsConfig {
    /// Configuration with defaults for the given host and trust roots.
    pub fn new(host: impl Into<String>, ca_file: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_TLS_PORT,
            server_name: None,
            ca_file: ca_file.into(),
            cert_file: None,
            key_file: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn client_cert(
        mut self,
        cert_file: impl Into<PathBuf>,
        key_file: impl Into<PathBuf>,
    ) -> Self {
        self.cert_file = Some(cert_file.into());
        self.key_file = Some(key_file.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
