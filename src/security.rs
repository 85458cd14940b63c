//! Transport security modes and the credential files each side loads.

use std::{fmt, path::PathBuf};

use clap::ValueEnum;

/// Default CA bundle shared by client and server.
pub const DEFAULT_AUTHORITY: &str = "cert/sping_example.crt";

/// Transport security negotiated between client and server.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, ValueEnum)]
pub enum SecurityMode {
    /// Both sides present certificates and verify them against a shared CA.
    #[default]
    #[value(name = "mutual")]
    MutualTls,
    /// Only the server presents a certificate; the client verifies it.
    #[value(name = "tls")]
    ServerTls,
    /// Cleartext, no authentication.
    #[value(name = "insecure")]
    Insecure,
}

impl SecurityMode {
    /// Whether this mode wraps the socket in TLS at all.
    pub fn is_tls(&self) -> bool {
        !matches!(self, SecurityMode::Insecure)
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SecurityMode::MutualTls => write!(f, "mutual"),
            SecurityMode::ServerTls => write!(f, "tls"),
            SecurityMode::Insecure => write!(f, "insecure"),
        }
    }
}

/// Locations of the PEM files used by one side of the connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsFiles {
    /// Certificate chain this side presents.
    pub certificate: PathBuf,
    /// Private key matching `certificate`.
    pub private_key: PathBuf,
    /// CA bundle used to verify the peer.
    pub authority: PathBuf,
}

impl TlsFiles {
    pub fn new(
        certificate: impl Into<PathBuf>,
        private_key: impl Into<PathBuf>,
        authority: impl Into<PathBuf>,
    ) -> Self {
        TlsFiles {
            certificate: certificate.into(),
            private_key: private_key.into(),
            authority: authority.into(),
        }
    }

    /// Conventional client-side paths.
    pub fn client_defaults() -> Self {
        TlsFiles::new("cert/client.crt", "cert/client.key", DEFAULT_AUTHORITY)
    }

    /// Conventional server-side paths.
    pub fn server_defaults() -> Self {
        TlsFiles::new("cert/server.crt", "cert/server.key", DEFAULT_AUTHORITY)
    }
}

/// Security configuration for one endpoint, fixed for a connection's lifetime.
///
/// The same value drives both [`connect`](crate::connection::connect) and
/// [`PingServer::bind`](crate::server::PingServer::bind); the mode decides which
/// of the files are read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub mode: SecurityMode,
    pub files: TlsFiles,
    /// Name the server certificate must carry. Clients fall back to the host
    /// part of the target address when unset; servers ignore it.
    pub server_name: Option<String>,
}

impl Credentials {
    pub fn new(mode: SecurityMode, files: TlsFiles) -> Self {
        Credentials {
            mode,
            files,
            server_name: None,
        }
    }

    /// Cleartext credentials; no files are touched.
    pub fn insecure() -> Self {
        Credentials::new(SecurityMode::Insecure, TlsFiles::client_defaults())
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Name to verify the server certificate against when dialing `target`.
    pub fn expected_peer_name(&self, target: &str) -> String {
        match self.server_name {
            Some(ref name) => name.clone(),
            None => host_of(target).to_string(),
        }
    }
}

/// Host part of a `host:port` address, without IPv6 brackets.
fn host_of(target: &str) -> &str {
    let host = match target.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => {
            host
        }
        _ => target,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}
