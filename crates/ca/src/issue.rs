//! CA bootstrap and node certificate issuance.

use std::fs;
use std::net::IpAddr;
use std::path::Path;

use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SanType,
};
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::{Error, Result};

/// CA certificate file name inside the certs directory.
pub const CA_CERT_FILE: &str = "ca.crt";
/// CA private key file name (coordinator only, mode 600).
pub const CA_KEY_FILE: &str = "ca.key";
/// Node certificate file name.
pub const NODE_CERT_FILE: &str = "node.crt";
/// Node private key file name (mode 600).
pub const NODE_KEY_FILE: &str = "node.key";

const CA_VALIDITY_DAYS: i64 = 10 * 365;
const NODE_VALIDITY_DAYS: i64 = 365;
const ORGANIZATION: &str = "PingMesh";

/// Generate the cluster root CA under `certs_dir`.
///
/// Self-signed, `IsCA` with path length 1, ten-year validity. The
/// certificate is world-readable; the key is written with mode 600.
pub fn init_ca(certs_dir: &Path) -> Result<()> {
    fs::create_dir_all(certs_dir)?;
    set_mode(certs_dir, 0o700)?;

    let key_pair = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)?;

    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::OrganizationName, ORGANIZATION);
    params
        .distinguished_name
        .push(DnType::CommonName, "PingMesh Internal CA");
    params.is_ca = IsCa::Ca(BasicConstraints::Constrained(1));
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    params.not_before = OffsetDateTime::now_utc();
    params.not_after = params.not_before + Duration::days(CA_VALIDITY_DAYS);

    let cert = params.self_signed(&key_pair)?;

    write_file(&certs_dir.join(CA_CERT_FILE), cert.pem().as_bytes(), 0o644)?;
    write_file(
        &certs_dir.join(CA_KEY_FILE),
        key_pair.serialize_pem().as_bytes(),
        0o600,
    )?;

    info!(dir = %certs_dir.display(), "generated cluster CA");
    Ok(())
}

/// Issue a node certificate signed by the on-disk CA.
///
/// Subject CN is `pingmesh-<node_id>`; `sans` entries become IP or DNS
/// subject alternative names; extended usages cover both server and client
/// auth so one certificate serves either side of peer RPC. Returns the
/// PEM-encoded certificate and private key.
pub fn issue_node_cert(
    certs_dir: &Path,
    node_id: &str,
    sans: &[String],
) -> Result<(String, String)> {
    let ca_cert_pem = fs::read_to_string(certs_dir.join(CA_CERT_FILE))?;
    let ca_key_pem = fs::read_to_string(certs_dir.join(CA_KEY_FILE))?;

    let ca_key = KeyPair::from_pem(&ca_key_pem)?;
    // Recover signing params from the stored CA certificate; the regenerated
    // certificate carries the same subject and key, which is all issuance
    // needs.
    let ca_params = CertificateParams::from_ca_cert_pem(&ca_cert_pem)?;
    let ca_cert = ca_params.self_signed(&ca_key)?;

    let node_key = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256)?;

    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::OrganizationName, ORGANIZATION);
    params
        .distinguished_name
        .push(DnType::CommonName, format!("pingmesh-{node_id}"));
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    params.not_before = OffsetDateTime::now_utc();
    params.not_after = params.not_before + Duration::days(NODE_VALIDITY_DAYS);

    for san in sans {
        let entry = match san.parse::<IpAddr>() {
            Ok(ip) => SanType::IpAddress(ip),
            Err(_) => SanType::DnsName(
                san.clone()
                    .try_into()
                    .map_err(|_| Error::Pem(format!("invalid dns san: {san}")))?,
            ),
        };
        params.subject_alt_names.push(entry);
    }

    let cert = params.signed_by(&node_key, &ca_cert, &ca_key)?;

    info!(node_id, sans = ?sans, "issued node certificate");
    Ok((cert.pem(), node_key.serialize_pem()))
}

/// Write a node's certificate and key under `certs_dir` (key mode 600).
pub fn write_node_cert(certs_dir: &Path, cert_pem: &str, key_pem: &str) -> Result<()> {
    fs::create_dir_all(certs_dir)?;
    write_file(&certs_dir.join(NODE_CERT_FILE), cert_pem.as_bytes(), 0o644)?;
    write_file(&certs_dir.join(NODE_KEY_FILE), key_pem.as_bytes(), 0o600)?;
    Ok(())
}

fn write_file(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    fs::write(path, contents)?;
    set_mode(path, mode)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
