//! Development PKI.
//!
//! Generates a self-signed CA and leaf certificates it signs: one server
//! certificate for the API listener and client certificates for callers.
//! Production deployments bring their own material.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose, SanType,
};
use tracing::info;

use crate::error::{TlsError, TlsResult};

const ORGANIZATION: &str = "Replicant";

/// A generated certificate and private key pair.
#[derive(Debug, Clone)]
pub struct CertKeyPair {
    /// PEM-encoded certificate.
    pub cert_pem: String,
    /// PEM-encoded PKCS#8 private key.
    pub key_pem: String,
}

/// A self-signed CA able to issue server and client certificates.
pub struct CertificateAuthority {
    cert: rcgen::Certificate,
    key: KeyPair,
}

impl CertificateAuthority {
    /// Generate a fresh CA with the given common name.
    pub fn generate(common_name: &str) -> TlsResult<Self> {
        let mut params = CertificateParams::default();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        params.distinguished_name = distinguished_name(common_name);

        let key = KeyPair::generate()?;
        let cert = params.self_signed(&key)?;
        info!(%common_name, "generated CA certificate");
        Ok(Self { cert, key })
    }

    /// The CA certificate and key as PEM.
    pub fn pem(&self) -> CertKeyPair {
        CertKeyPair {
            cert_pem: self.cert.pem(),
            key_pem: self.key.serialize_pem(),
        }
    }

    /// Issue a server certificate valid for the given hostnames and IPs.
    pub fn issue_server(&self, hosts: &[String]) -> TlsResult<CertKeyPair> {
        let common_name = hosts.first().map(String::as_str).unwrap_or("replicant");
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(common_name);
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

        for host in hosts {
            let san = match host.parse::<IpAddr>() {
                Ok(ip) => SanType::IpAddress(ip),
                Err(_) => SanType::DnsName(host.clone().try_into()?),
            };
            params.subject_alt_names.push(san);
        }

        let pair = self.sign(params)?;
        info!(sans = hosts.len(), "issued server certificate");
        Ok(pair)
    }

    /// Issue a client certificate with the given common name.
    pub fn issue_client(&self, common_name: &str) -> TlsResult<CertKeyPair> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(common_name);
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ClientAuth];

        let pair = self.sign(params)?;
        info!(%common_name, "issued client certificate");
        Ok(pair)
    }

    fn sign(&self, params: CertificateParams) -> TlsResult<CertKeyPair> {
        let key = KeyPair::generate()?;
        let cert = params.signed_by(&key, &self.cert, &self.key)?;
        Ok(CertKeyPair {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        })
    }
}

fn distinguished_name(common_name: &str) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    dn.push(DnType::OrganizationName, ORGANIZATION);
    dn.push(DnType::CommonName, common_name);
    dn
}

/// Files written by [`write_bundle`].
#[derive(Debug, Clone)]
pub struct BundlePaths {
    pub ca_cert: PathBuf,
    pub server_cert: PathBuf,
    pub server_key: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
}

/// Generate a CA, a server certificate for `hosts`, and one client
/// certificate, and write them as PEM files into `dir`.
///
/// The CA private key is not written: the bundle cannot mint more
/// certificates.
pub fn write_bundle(dir: &Path, hosts: &[String], client_name: &str) -> TlsResult<BundlePaths> {
    std::fs::create_dir_all(dir).map_err(|e| TlsError::io(dir, e))?;

    let ca = CertificateAuthority::generate("Replicant Development CA")?;
    let server = ca.issue_server(hosts)?;
    let client = ca.issue_client(client_name)?;

    let paths = BundlePaths {
        ca_cert: dir.join("ca.crt"),
        server_cert: dir.join("server.crt"),
        server_key: dir.join("server.key"),
        client_cert: dir.join("client.crt"),
        client_key: dir.join("client.key"),
    };

    write_file(&paths.ca_cert, &ca.pem().cert_pem, false)?;
    write_file(&paths.server_cert, &server.cert_pem, false)?;
    write_file(&paths.server_key, &server.key_pem, true)?;
    write_file(&paths.client_cert, &client.cert_pem, false)?;
    write_file(&paths.client_key, &client.key_pem, true)?;

    info!(dir = %dir.display(), "wrote development certificate bundle");
    Ok(paths)
}

fn write_file(path: &Path, contents: &str, private: bool) -> TlsResult<()> {
    std::fs::write(path, contents).map_err(|e| TlsError::io(path, e))?;
    if private {
        restrict_permissions(path)?;
    }
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> TlsResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| TlsError::io(path, e))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> TlsResult<()> {
    Ok(())
}
