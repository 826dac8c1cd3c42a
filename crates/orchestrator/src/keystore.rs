//! Pre-provisioned channel-admin key material.
//!
//! Each organization's channel admin lives in the crypto-config tree:
//!
//! ```text
//! <root>/peerOrganizations/<domain>/users/Admin@<domain>/msp/
//!     keystore/<anything>_sk              hex ed25519 private key, exactly one
//!     signcerts/Admin@<domain>-cert.pem   PEM certificate
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use hfc_core::{Certificate, Enrollment, Identity, Keypair};
use thiserror::Error;

use crate::config::OrgConfig;

const KEY_SUFFIX: &str = "_sk";

/// Problems with on-disk key material. Always fatal: nothing here is retried.
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("expected exactly one _sk file in {}, found {found}", .dir.display())]
    KeyCount { dir: PathBuf, found: usize },

    #[error("invalid private key in {}: {reason}", .path.display())]
    InvalidKey { path: PathBuf, reason: String },

    #[error("invalid certificate {}: {reason}", .path.display())]
    InvalidCertificate { path: PathBuf, reason: String },

    #[error("certificate {} does not match the private key", .path.display())]
    KeyMismatch { path: PathBuf },
}

type Result<T> = std::result::Result<T, KeystoreError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> KeystoreError + '_ {
    move |source| KeystoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// `<root>/peerOrganizations/<domain>/users/Admin@<domain>/msp`
pub fn admin_msp_dir(root: &Path, domain: &str) -> PathBuf {
    root.join("peerOrganizations")
        .join(domain)
        .join("users")
        .join(format!("Admin@{}", domain))
        .join("msp")
}

pub fn keystore_dir(root: &Path, domain: &str) -> PathBuf {
    admin_msp_dir(root, domain).join("keystore")
}

pub fn certificate_path(root: &Path, domain: &str) -> PathBuf {
    admin_msp_dir(root, domain)
        .join("signcerts")
        .join(format!("Admin@{}-cert.pem", domain))
}

/// The single file in `dir` whose name ends in `_sk`. Zero or several
/// matches are an error.
pub fn find_private_key(dir: &Path) -> Result<PathBuf> {
    let mut matches = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        let is_key = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(KEY_SUFFIX))
            .unwrap_or(false);
        if is_key && path.is_file() {
            matches.push(path);
        }
    }

    match matches.len() {
        1 => Ok(matches.remove(0)),
        found => Err(KeystoreError::KeyCount {
            dir: dir.to_path_buf(),
            found,
        }),
    }
}

/// Load the channel admin for `org` as an enrolled identity.
pub fn load_channel_admin(root: &Path, org: &OrgConfig) -> Result<Identity> {
    let key_path = find_private_key(&keystore_dir(root, &org.domain))?;
    let key_hex = fs::read_to_string(&key_path).map_err(io_error(&key_path))?;
    let keypair = Keypair::from_hex(key_hex.trim()).map_err(|e| KeystoreError::InvalidKey {
        path: key_path.clone(),
        reason: e.to_string(),
    })?;

    let cert_path = certificate_path(root, &org.domain);
    let pem = fs::read_to_string(&cert_path).map_err(io_error(&cert_path))?;
    let cert = Certificate::from_pem(&pem).map_err(|e| KeystoreError::InvalidCertificate {
        path: cert_path.clone(),
        reason: e.to_string(),
    })?;
    if cert.public_key() != &keypair.public_key {
        return Err(KeystoreError::KeyMismatch { path: cert_path });
    }

    let mut admin = Identity::new(org.channel_admin_name(), &org.name, &org.msp_id);
    admin.mark_enrolled(Enrollment::new(keypair.private_key_hex(), pem));
    Ok(admin)
}

/// Write a fresh channel-admin key and self-signed certificate for `org`.
/// Returns the key file path.
pub fn provision(root: &Path, org: &OrgConfig) -> Result<PathBuf> {
    let keypair = Keypair::generate();
    let subject = format!("Admin@{}", org.domain);
    let pem = Certificate::issue(
        &subject,
        &org.msp_id,
        &subject,
        keypair.public_key.clone(),
        1,
        &keypair,
    )
    .and_then(|c| c.to_pem())
    .map_err(|e| KeystoreError::InvalidCertificate {
        path: certificate_path(root, &org.domain),
        reason: e.to_string(),
    })?;

    let key_dir = keystore_dir(root, &org.domain);
    fs::create_dir_all(&key_dir).map_err(io_error(&key_dir))?;
    let key_path = key_dir.join(format!(
        "{}{}",
        keypair.public_key.fingerprint().to_hex(),
        KEY_SUFFIX
    ));
    fs::write(&key_path, keypair.private_key_hex()).map_err(io_error(&key_path))?;

    let cert_path = certificate_path(root, &org.domain);
    if let Some(parent) = cert_path.parent() {
        fs::create_dir_all(parent).map_err(io_error(parent))?;
    }
    fs::write(&cert_path, pem).map_err(io_error(&cert_path))?;
    Ok(key_path)
}
