//! Identities and their enrollment state machine.
//!
//! An identity moves `Unregistered -> Registered -> Enrolled`. Channel admins
//! loaded from pre-provisioned key material skip straight to `Enrolled` with no
//! secret. Once enrolled an identity never goes back, and enrolling it again
//! keeps the cached enrollment.

use crate::crypto::{CryptoError, Keypair, Signature};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised by identity state transitions and signing.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity {name} is not enrolled")]
    NotEnrolled { name: String },

    #[error("identity {name} cannot be registered from state {state}")]
    InvalidTransition { name: String, state: &'static str },

    #[error("identity key material: {0}")]
    Crypto(#[from] CryptoError),

    #[error("cannot encode signed payload: {0}")]
    Encoding(#[from] bincode::Error),
}

/// Private key and signed certificate issued to an identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    /// Hex-encoded ed25519 private key.
    private_key: String,
    /// PEM certificate as issued by the CA (or read from disk).
    certificate: String,
}

impl Enrollment {
    pub fn new(private_key: impl Into<String>, certificate: impl Into<String>) -> Self {
        Self {
            private_key: private_key.into(),
            certificate: certificate.into(),
        }
    }

    pub fn certificate(&self) -> &str {
        &self.certificate
    }

    /// Decode the signing key.
    pub fn keypair(&self) -> Result<Keypair, CryptoError> {
        Keypair::from_hex(&self.private_key)
    }
}

impl fmt::Debug for Enrollment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enrollment")
            .field("private_key", &"<redacted>")
            .field("certificate_len", &self.certificate.len())
            .finish()
    }
}

/// Where an identity is in its enrollment lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrollmentState {
    Unregistered,
    Registered {
        secret: String,
    },
    Enrolled {
        secret: Option<String>,
        enrollment: Enrollment,
    },
}

impl EnrollmentState {
    pub fn name(&self) -> &'static str {
        match self {
            EnrollmentState::Unregistered => "UNREGISTERED",
            EnrollmentState::Registered { .. } => "REGISTERED",
            EnrollmentState::Enrolled { .. } => "ENROLLED",
        }
    }
}

/// A named member of an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    /// Owning organization's name.
    pub org: String,
    pub msp_id: String,
    pub affiliation: Option<String>,
    state: EnrollmentState,
}

impl Identity {
    /// A fresh, unregistered identity.
    pub fn new(name: impl Into<String>, org: impl Into<String>, msp_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            org: org.into(),
            msp_id: msp_id.into(),
            affiliation: None,
            state: EnrollmentState::Unregistered,
        }
    }

    /// An identity registered out of band, such as a CA bootstrap admin.
    pub fn preregistered(
        name: impl Into<String>,
        org: impl Into<String>,
        msp_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        let mut identity = Self::new(name, org, msp_id);
        identity.state = EnrollmentState::Registered {
            secret: secret.into(),
        };
        identity
    }

    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliation = Some(affiliation.into());
        self
    }

    pub fn state(&self) -> &EnrollmentState {
        &self.state
    }

    pub fn is_registered(&self) -> bool {
        !matches!(self.state, EnrollmentState::Unregistered)
    }

    pub fn is_enrolled(&self) -> bool {
        matches!(self.state, EnrollmentState::Enrolled { .. })
    }

    pub fn secret(&self) -> Option<&str> {
        match &self.state {
            EnrollmentState::Unregistered => None,
            EnrollmentState::Registered { secret } => Some(secret),
            EnrollmentState::Enrolled { secret, .. } => secret.as_deref(),
        }
    }

    pub fn enrollment(&self) -> Option<&Enrollment> {
        match &self.state {
            EnrollmentState::Enrolled { enrollment, .. } => Some(enrollment),
            _ => None,
        }
    }

    pub fn certificate(&self) -> Option<&str> {
        self.enrollment().map(Enrollment::certificate)
    }

    /// Record the secret returned by a registration.
    pub fn mark_registered(&mut self, secret: impl Into<String>) -> Result<(), IdentityError> {
        match self.state {
            EnrollmentState::Unregistered => {
                self.state = EnrollmentState::Registered {
                    secret: secret.into(),
                };
                Ok(())
            }
            ref other => Err(IdentityError::InvalidTransition {
                name: self.name.clone(),
                state: other.name(),
            }),
        }
    }

    /// Record an enrollment. An already-enrolled identity keeps its existing
    /// enrollment and `false` is returned.
    pub fn mark_enrolled(&mut self, enrollment: Enrollment) -> bool {
        if self.is_enrolled() {
            return false;
        }
        let secret = self.secret().map(str::to_string);
        self.state = EnrollmentState::Enrolled { secret, enrollment };
        true
    }

    /// Sign `message` with the enrolled private key.
    pub fn sign(&self, message: &[u8]) -> Result<Signature, IdentityError> {
        let enrollment = self.enrollment().ok_or_else(|| IdentityError::NotEnrolled {
            name: self.name.clone(),
        })?;
        Ok(enrollment.keypair()?.sign(message))
    }

    /// Require the identity to be enrolled.
    pub fn ensure_enrolled(&self) -> Result<&Enrollment, IdentityError> {
        self.enrollment().ok_or_else(|| IdentityError::NotEnrolled {
            name: self.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enrollment() -> Enrollment {
        Enrollment::new(Keypair::generate().private_key_hex(), "-----BEGIN CERTIFICATE-----")
    }

    #[test]
    fn test_state_machine_happy_path() {
        let mut id = Identity::new("user1", "peerOrg1", "Org1MSP");
        assert!(!id.is_registered());
        assert_eq!(id.secret(), None);

        id.mark_registered("s3cret").unwrap();
        assert!(id.is_registered());
        assert!(!id.is_enrolled());
        assert_eq!(id.secret(), Some("s3cret"));

        id.mark_enrolled(enrollment());
        assert!(id.is_enrolled());
        assert!(id.is_registered());
        assert_eq!(id.secret(), Some("s3cret"));
    }

    #[test]
    fn test_reenroll_keeps_cached_enrollment() {
        let mut id = Identity::preregistered("admin", "peerOrg1", "Org1MSP", "adminpw");
        assert!(id.mark_enrolled(enrollment()));
        let first = id.enrollment().cloned();
        assert!(!id.mark_enrolled(enrollment()));
        assert_eq!(id.enrollment().cloned(), first);
        assert_eq!(id.secret(), Some("adminpw"));
    }

    #[test]
    fn test_register_twice_rejected() {
        let mut id = Identity::new("user1", "peerOrg1", "Org1MSP");
        id.mark_registered("a").unwrap();
        let err = id.mark_registered("b").unwrap_err();
        assert!(matches!(
            err,
            IdentityError::InvalidTransition { state: "REGISTERED", .. }
        ));
        assert_eq!(id.secret(), Some("a"));
    }

    #[test]
    fn test_sign_requires_enrollment() {
        let id = Identity::new("user1", "peerOrg1", "Org1MSP");
        assert!(matches!(
            id.sign(b"msg"),
            Err(IdentityError::NotEnrolled { .. })
        ));
    }

    #[test]
    fn test_sign_with_enrolled_key() {
        let kp = Keypair::generate();
        let mut id = Identity::new("peerOrg1Admin", "peerOrg1", "Org1MSP");
        id.mark_enrolled(Enrollment::new(kp.private_key_hex(), "cert"));

        let sig = id.sign(b"channel config").unwrap();
        assert!(kp.verify(b"channel config", &sig).is_ok());
        assert_eq!(id.secret(), None);
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let kp = Keypair::generate();
        let e = Enrollment::new(kp.private_key_hex(), "cert");
        let dbg = format!("{:?}", e);
        assert!(!dbg.contains(&kp.private_key_hex()));
    }
}
