use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use hfc_core::{Certificate, Enrollment, Identity, Keypair, PublicKey};
use parking_lot::Mutex;
use rand::RngCore;

use crate::error::{NetworkError, Result};
use crate::transport::{CertificateAuthority, RegistrationRequest};

/// Name and secret every CA ships with.
pub const BOOTSTRAP_ADMIN: (&str, &str) = ("admin", "adminpw");

#[derive(Debug, Clone)]
struct Registration {
    secret: String,
    affiliation: Option<String>,
}

/// In-memory certificate authority for one organization.
pub struct MockCertificateAuthority {
    location: String,
    msp_id: String,
    issuer: Keypair,
    registrations: Mutex<HashMap<String, Registration>>,
    serial: AtomicU64,
    reachable: AtomicBool,
    register_calls: AtomicUsize,
    enroll_calls: AtomicUsize,
}

impl MockCertificateAuthority {
    /// A CA with the bootstrap admin preregistered.
    pub fn new(location: impl Into<String>, msp_id: impl Into<String>) -> Self {
        let ca = Self {
            location: location.into(),
            msp_id: msp_id.into(),
            issuer: Keypair::generate(),
            registrations: Mutex::new(HashMap::new()),
            serial: AtomicU64::new(1),
            reachable: AtomicBool::new(true),
            register_calls: AtomicUsize::new(0),
            enroll_calls: AtomicUsize::new(0),
        };
        ca.preregister(BOOTSTRAP_ADMIN.0, BOOTSTRAP_ADMIN.1);
        ca
    }

    pub fn preregister(&self, name: &str, secret: &str) {
        self.registrations.lock().insert(
            name.to_string(),
            Registration {
                secret: secret.to_string(),
                affiliation: None,
            },
        );
    }

    pub fn issuer_key(&self) -> &PublicKey {
        &self.issuer.public_key
    }

    pub fn msp_id(&self) -> &str {
        &self.msp_id
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registrations.lock().contains_key(name)
    }

    pub fn affiliation_of(&self, name: &str) -> Option<String> {
        self.registrations
            .lock()
            .get(name)
            .and_then(|r| r.affiliation.clone())
    }

    pub fn register_calls(&self) -> usize {
        self.register_calls.load(Ordering::SeqCst)
    }

    pub fn enroll_calls(&self) -> usize {
        self.enroll_calls.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(NetworkError::unreachable(&self.location, "connection refused"))
        }
    }

    /// The registrar must hold a certificate this CA issued for its MSP.
    fn authorize(&self, registrar: &Identity) -> Result<()> {
        let pem = registrar
            .certificate()
            .ok_or_else(|| NetworkError::rejected(&self.location, "registrar is not enrolled"))?;
        let cert =
            Certificate::from_pem(pem).map_err(|e| NetworkError::rejected(&self.location, e))?;
        if cert.body.msp_id != self.msp_id || cert.verify(self.issuer_key()).is_err() {
            return Err(NetworkError::rejected(
                &self.location,
                format!("{} is not authorized to register identities", registrar.name),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl CertificateAuthority for MockCertificateAuthority {
    fn location(&self) -> &str {
        &self.location
    }

    async fn register(
        &self,
        request: &RegistrationRequest,
        registrar: &Identity,
    ) -> Result<String> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        self.authorize(registrar)?;

        let mut registrations = self.registrations.lock();
        if registrations.contains_key(&request.name) {
            return Err(NetworkError::rejected(
                &self.location,
                format!("identity {} is already registered", request.name),
            ));
        }
        let mut secret = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut secret);
        let secret = hex::encode(secret);
        registrations.insert(
            request.name.clone(),
            Registration {
                secret: secret.clone(),
                affiliation: Some(request.affiliation.clone()),
            },
        );
        Ok(secret)
    }

    async fn enroll(&self, name: &str, secret: &str) -> Result<Enrollment> {
        self.enroll_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;

        let known = self
            .registrations
            .lock()
            .get(name)
            .map(|r| r.secret == secret)
            .unwrap_or(false);
        if !known {
            return Err(NetworkError::rejected(
                &self.location,
                format!("authentication failure for {}", name),
            ));
        }

        let keypair = Keypair::generate();
        let serial = self.serial.fetch_add(1, Ordering::SeqCst);
        let cert = Certificate::issue(
            name,
            &self.msp_id,
            &self.location,
            keypair.public_key.clone(),
            serial,
            &self.issuer,
        )
        .and_then(|c| c.to_pem())
        .map_err(|e| NetworkError::malformed(&self.location, e))?;
        Ok(Enrollment::new(keypair.private_key_hex(), cert))
    }
}
