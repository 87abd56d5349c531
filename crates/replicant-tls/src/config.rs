//! Server-side mTLS configuration.
//!
//! Material is read once at startup and never reloaded.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use tracing::info;

use crate::error::{TlsError, TlsResult};

/// Locations of the PEM files backing the API listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    /// Server certificate chain.
    pub cert_file: PathBuf,
    /// Server private key.
    pub key_file: PathBuf,
    /// Bundle of CA certificates trusted to sign client certificates.
    pub client_ca_file: PathBuf,
}

/// Build a server config that requires and verifies client certificates.
///
/// Only TLS 1.3 and 1.2 are offered. A client that presents no certificate,
/// or one that does not chain to the client CA bundle, fails the handshake.
pub fn load_server_config(paths: &TlsPaths) -> TlsResult<Arc<ServerConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let cert_chain = read_certs(&paths.cert_file)?;
    if cert_chain.is_empty() {
        return Err(TlsError::NoCertificates(paths.cert_file.clone()));
    }
    let key = read_private_key(&paths.key_file)?;
    let roots = read_trust_root(&paths.client_ca_file)?;
    let trusted = roots.len();

    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()?;

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .with_client_cert_verifier(verifier)
        .with_single_cert(cert_chain, key)?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    info!(
        cert = %paths.cert_file.display(),
        client_ca = %paths.client_ca_file.display(),
        trusted_cas = trusted,
        "mTLS server config loaded"
    );
    Ok(Arc::new(config))
}

/// Read every certificate from a PEM file.
pub fn read_certs(path: &Path) -> TlsResult<Vec<CertificateDer<'static>>> {
    let mut reader = open(path)?;
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::io(path, e))
}

/// Read the first private key (PKCS#8, PKCS#1, or SEC1) from a PEM file.
pub fn read_private_key(path: &Path) -> TlsResult<PrivateKeyDer<'static>> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::io(path, e))?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}

/// Load the client CA bundle into a root store.
fn read_trust_root(path: &Path) -> TlsResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(read_certs(path)?);
    if added == 0 {
        return Err(TlsError::EmptyTrustRoot(path.to_path_buf()));
    }
    if ignored > 0 {
        tracing::warn!(path = %path.display(), ignored, "skipped unparsable client CA certificates");
    }
    Ok(roots)
}

fn open(path: &Path) -> TlsResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| TlsError::io(path, e))
}
