//! Enrollment certificates and PEM armor.
//!
//! Certificates issued by an organization's CA bind a subject name and MSP ID
//! to an ed25519 public key. The body is bincode-encoded, signed by the issuer,
//! and carried as PEM text so it can sit next to key files on disk.

use crate::crypto::{CryptoError, Keypair, PublicKey, Signature};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Errors raised while decoding or checking certificates.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("missing PEM armor for {0}")]
    MissingArmor(&'static str),

    #[error("invalid base64 in PEM body: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("malformed certificate body: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("certificate signature: {0}")]
    Crypto(#[from] CryptoError),
}

/// Signed portion of a certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateBody {
    pub subject: String,
    pub msp_id: String,
    pub issuer: String,
    pub public_key: PublicKey,
    pub serial: u64,
    pub not_before: DateTime<Utc>,
}

/// A certificate together with the issuer's signature over its body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub body: CertificateBody,
    pub signature: Signature,
}

impl Certificate {
    /// Issue a certificate for `public_key`, signed by `issuer_key`.
    pub fn issue(
        subject: &str,
        msp_id: &str,
        issuer: &str,
        public_key: PublicKey,
        serial: u64,
        issuer_key: &Keypair,
    ) -> Result<Self, CertificateError> {
        let body = CertificateBody {
            subject: subject.to_string(),
            msp_id: msp_id.to_string(),
            issuer: issuer.to_string(),
            public_key,
            serial,
            not_before: Utc::now(),
        };
        let signature = issuer_key.sign(&bincode::serialize(&body)?);
        Ok(Self { body, signature })
    }

    /// Check the issuer signature.
    pub fn verify(&self, issuer_key: &PublicKey) -> Result<(), CertificateError> {
        let encoded = bincode::serialize(&self.body)?;
        issuer_key.verify(&encoded, &self.signature)?;
        Ok(())
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.body.public_key
    }

    pub fn to_pem(&self) -> Result<String, CertificateError> {
        Ok(pem_encode(CERTIFICATE_LABEL, &bincode::serialize(self)?))
    }

    pub fn from_pem(pem: &str) -> Result<Self, CertificateError> {
        let der = pem_decode(CERTIFICATE_LABEL, pem)?;
        Ok(bincode::deserialize(&der)?)
    }
}

/// Wrap bytes in PEM armor with 64-column base64 lines.
pub fn pem_encode(label: &str, bytes: &[u8]) -> String {
    let encoded = STANDARD.encode(bytes);
    let mut out = format!("-----BEGIN {}-----\n", label);
    for chunk in encoded.as_bytes().chunks(64) {
        // base64 output is ASCII, so every chunk is valid UTF-8
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push_str(&format!("-----END {}-----\n", label));
    out
}

/// Strip PEM armor for `label` and decode the body.
pub fn pem_decode(label: &'static str, pem: &str) -> Result<Vec<u8>, CertificateError> {
    let begin = format!("-----BEGIN {}-----", label);
    let end = format!("-----END {}-----", label);
    let start = pem.find(&begin).ok_or(CertificateError::MissingArmor(label))?;
    let rest = &pem[start + begin.len()..];
    let stop = rest.find(&end).ok_or(CertificateError::MissingArmor(label))?;
    let body: String = rest[..stop].split_whitespace().collect();
    Ok(STANDARD.decode(body)?)
}
