use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use hfc_core::{Certificate, Endpoint, TransactionEnvelope};
use parking_lot::Mutex;

use super::Ledger;
use crate::error::{NetworkError, Result};
use crate::transport::{ChannelCreateRequest, ChannelGenesis, OrdererNode};

/// How a mock orderer answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrdererBehavior {
    /// Accept and commit every transaction.
    Accept,
    /// Refuse broadcasts and channel creation.
    Reject(String),
    /// Refuse connections.
    Unreachable,
    /// Accept broadcasts but never produce a block.
    Silent,
    /// Accept broadcasts and commit them as invalid with this code.
    Invalidate(String),
}

/// In-memory ordering service node. Accepted transactions are committed to
/// the shared [`Ledger`] on a spawned task.
pub struct MockOrderer {
    endpoint: Endpoint,
    ledger: Arc<Ledger>,
    behavior: Mutex<OrdererBehavior>,
    broadcasts: Mutex<Vec<TransactionEnvelope>>,
    create_calls: AtomicUsize,
}

impl MockOrderer {
    pub fn new(endpoint: Endpoint, ledger: Arc<Ledger>) -> Self {
        Self {
            endpoint,
            ledger,
            behavior: Mutex::new(OrdererBehavior::Accept),
            broadcasts: Mutex::new(Vec::new()),
            create_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_behavior(&self, behavior: OrdererBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn broadcast_calls(&self) -> usize {
        self.broadcasts.lock().len()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn broadcasts(&self) -> Vec<TransactionEnvelope> {
        self.broadcasts.lock().clone()
    }

    fn behavior(&self) -> OrdererBehavior {
        self.behavior.lock().clone()
    }

    fn refuse(&self, behavior: &OrdererBehavior) -> Result<()> {
        match behavior {
            OrdererBehavior::Unreachable => Err(NetworkError::unreachable(
                &self.endpoint.name,
                "connection refused",
            )),
            OrdererBehavior::Reject(reason) => {
                Err(NetworkError::rejected(&self.endpoint.name, reason))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl OrdererNode for MockOrderer {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn create_channel(&self, request: &ChannelCreateRequest) -> Result<ChannelGenesis> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.refuse(&self.behavior())?;

        if request.signatures.is_empty()
            || !request.signatures.iter().all(|s| s.verify(&request.config))
        {
            return Err(NetworkError::rejected(
                &self.endpoint.name,
                "channel configuration is not properly signed",
            ));
        }
        if !self.ledger.create_channel(&request.channel) {
            return Err(NetworkError::rejected(
                &self.endpoint.name,
                format!("channel {} already exists", request.channel),
            ));
        }
        Ok(ChannelGenesis::new(
            &request.channel,
            &request.config,
            &self.endpoint.name,
        ))
    }

    async fn broadcast(&self, envelope: &TransactionEnvelope) -> Result<()> {
        self.broadcasts.lock().push(envelope.clone());
        let behavior = self.behavior();
        self.refuse(&behavior)?;

        let signed = match (Certificate::from_pem(&envelope.creator_cert), envelope.signing_bytes()) {
            (Ok(cert), Ok(bytes)) => cert.public_key().verify(&bytes, &envelope.signature).is_ok(),
            _ => false,
        };
        if !signed {
            return Err(NetworkError::rejected(
                &self.endpoint.name,
                "envelope creator signature does not verify",
            ));
        }
        if !self.ledger.has_channel(&envelope.channel) {
            return Err(NetworkError::rejected(
                &self.endpoint.name,
                format!("unknown channel {}", envelope.channel),
            ));
        }

        let invalid = match behavior {
            OrdererBehavior::Silent => return Ok(()),
            OrdererBehavior::Invalidate(code) => Some(code),
            _ => None,
        };
        let ledger = self.ledger.clone();
        let envelope = envelope.clone();
        tokio::spawn(async move {
            ledger.commit(&envelope, invalid);
        });
        Ok(())
    }
}

impl std::fmt::Debug for MockOrderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockOrderer")
            .field("endpoint", &self.endpoint.name)
            .field("behavior", &*self.behavior.lock())
            .finish()
    }
}
