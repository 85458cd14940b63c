//! Certificate material loading and TLS configuration builders.
//!
//! Everything in here runs before a socket is opened, so a missing or broken
//! file surfaces as a [`CredentialError`] and never as a connection failure.

use std::{
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
    sync::Arc,
};

use rustls::{
    crypto::CryptoProvider,
    pki_types::{CertificateDer, PrivateKeyDer, ServerName},
    server::{VerifierBuilderError, WebPkiClientVerifier},
    ClientConfig, RootCertStore, ServerConfig,
};
use thiserror::Error;

use crate::security::{Credentials, SecurityMode};

/// Errors raised while loading certificates, keys or CA bundles.
#[derive(Error, Debug)]
pub enum CredentialError {
    /// File missing or unreadable.
    #[error("could not read {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificates found in {}", .0.display())]
    NoCertificates(PathBuf),

    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),

    /// The CA bundle did not yield a single usable certificate.
    #[error("failed to append ca certs from {}", .0.display())]
    InvalidAuthority(PathBuf),

    #[error("invalid peer name {0:?}")]
    InvalidPeerName(String),

    #[error("invalid TLS configuration: {0}")]
    Tls(#[from] rustls::Error),

    #[error("could not build client verifier: {0}")]
    Verifier(#[from] VerifierBuilderError),
}

/// Client side TLS material, ready for a handshake.
pub struct ClientTls {
    pub config: Arc<ClientConfig>,
    pub server_name: ServerName<'static>,
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn open(path: &Path) -> Result<BufReader<File>, CredentialError> {
    let file = File::open(path).map_err(|source| CredentialError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Reads every PEM certificate in `path`.
///
/// # Errors
/// Returns `CredentialError::Read` if the file cannot be read.
/// Returns `CredentialError::NoCertificates` if it holds no certificate.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, CredentialError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| CredentialError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(CredentialError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

/// Reads the first PEM private key (PKCS#1, PKCS#8 or SEC1) in `path`.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, CredentialError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| CredentialError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| CredentialError::NoPrivateKey(path.to_path_buf()))
}

/// Builds a trust pool from a CA bundle.
///
/// Unparsable entries are skipped; the bundle is rejected only when nothing
/// usable is left.
pub fn load_trust_pool(path: &Path) -> Result<RootCertStore, CredentialError> {
    let certs = match load_certificates(path) {
        Err(CredentialError::NoCertificates(path)) => {
            return Err(CredentialError::InvalidAuthority(path))
        }
        other => other?,
    };

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if ignored > 0 {
        log::warn!(
            "Ignored {} unparsable certificates in {}",
            ignored,
            path.display()
        );
    }
    if added == 0 {
        return Err(CredentialError::InvalidAuthority(path.to_path_buf()));
    }
    Ok(roots)
}

/// Loads the client TLS configuration for dialing `target`.
///
/// Returns `None` in insecure mode. Mutual mode loads the client key pair
/// first, then the CA bundle; server-TLS mode reads only the CA bundle.
pub fn client_tls(
    credentials: &Credentials,
    target: &str,
) -> Result<Option<ClientTls>, CredentialError> {
    let files = &credentials.files;
    if credentials.mode == SecurityMode::Insecure {
        return Ok(None);
    }

    let builder =
        ClientConfig::builder_with_provider(provider()).with_safe_default_protocol_versions()?;
    let config = match credentials.mode {
        SecurityMode::MutualTls => {
            let certs = load_certificates(&files.certificate)?;
            let key = load_private_key(&files.private_key)?;
            let roots = load_trust_pool(&files.authority)?;
            builder
                .with_root_certificates(roots)
                .with_client_auth_cert(certs, key)?
        }
        _ => {
            let roots = load_trust_pool(&files.authority)?;
            builder.with_root_certificates(roots).with_no_client_auth()
        }
    };

    let name = credentials.expected_peer_name(target);
    let server_name =
        ServerName::try_from(name.clone()).map_err(|_| CredentialError::InvalidPeerName(name))?;

    Ok(Some(ClientTls {
        config: Arc::new(config),
        server_name,
    }))
}

/// Loads the server TLS configuration.
///
/// Returns `None` in insecure mode. Mutual mode requires every client to
/// present a certificate issued by the CA bundle.
pub fn server_tls(credentials: &Credentials) -> Result<Option<Arc<ServerConfig>>, CredentialError> {
    let files = &credentials.files;
    if credentials.mode == SecurityMode::Insecure {
        return Ok(None);
    }

    let certs = load_certificates(&files.certificate)?;
    let key = load_private_key(&files.private_key)?;
    let builder =
        ServerConfig::builder_with_provider(provider()).with_safe_default_protocol_versions()?;

    let config = if credentials.mode == SecurityMode::MutualTls {
        let roots = load_trust_pool(&files.authority)?;
        let verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider()).build()?;
        builder
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)?
    } else {
        builder.with_no_client_auth().with_single_cert(certs, key)?
    };

    Ok(Some(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::security::TlsFiles;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_missing_certificate_file() {
        let err = load_certificates(Path::new("/nonexistent/sping/client.crt")).unwrap_err();
        assert!(matches!(err, CredentialError::Read { .. }));
    }

    #[test]
    fn test_empty_ca_bundle_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "ca.crt", "not a certificate\n");
        let err = load_trust_pool(&path).unwrap_err();
        assert!(matches!(err, CredentialError::InvalidAuthority(_)));
    }

    #[test]
    fn test_garbage_ca_bundle_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "ca.crt",
            "-----BEGIN CERTIFICATE-----\naGVsbG8gd29ybGQ=\n-----END CERTIFICATE-----\n",
        );
        let err = load_trust_pool(&path).unwrap_err();
        assert!(matches!(err, CredentialError::InvalidAuthority(_)));
    }

    #[test]
    fn test_key_file_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "client.key", "nothing here\n");
        let err = load_private_key(&path).unwrap_err();
        assert!(matches!(err, CredentialError::NoPrivateKey(_)));
    }

    #[test]
    fn test_insecure_reads_nothing() {
        let creds = Credentials::new(
            SecurityMode::Insecure,
            TlsFiles::new("/nonexistent/a", "/nonexistent/b", "/nonexistent/c"),
        );
        assert!(client_tls(&creds, "localhost:3264").unwrap().is_none());
        assert!(server_tls(&creds).unwrap().is_none());
    }

    #[test]
    fn test_server_tls_client_needs_only_authority() {
        let creds = Credentials::new(
            SecurityMode::ServerTls,
            TlsFiles::new("/nonexistent/a", "/nonexistent/b", "/nonexistent/ca.crt"),
        );
        match client_tls(&creds, "localhost:3264") {
            Err(CredentialError::Read { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/ca.crt"))
            }
            other => panic!("unexpected result: {:?}", other.map(|t| t.is_some())),
        }
    }
}
