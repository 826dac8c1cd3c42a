use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use hfc_core::{Endpoint, TransactionEvent, TxId};
use parking_lot::Mutex;

use crate::commit::CommitResolver;
use crate::error::{NetworkError, Result};
use crate::transport::EventHub;

/// In-memory event hub. Resolvers registered through [`EventHub::watch`]
/// are completed when the ledger publishes the matching event on a channel
/// the hub is connected to.
pub struct MockEventHub {
    endpoint: Endpoint,
    reachable: AtomicBool,
    connected: Mutex<BTreeSet<String>>,
    waiters: Mutex<HashMap<TxId, Vec<CommitResolver>>>,
    seen: Mutex<Vec<TransactionEvent>>,
}

impl MockEventHub {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            reachable: AtomicBool::new(true),
            connected: Mutex::new(BTreeSet::new()),
            waiters: Mutex::new(HashMap::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_connected(&self, channel: &str) -> bool {
        self.connected.lock().contains(channel)
    }

    /// Transactions with a registered, not yet resolved waiter.
    pub fn pending(&self) -> usize {
        self.waiters.lock().len()
    }

    /// Events this hub has seen on its connected channels.
    pub fn events(&self) -> Vec<TransactionEvent> {
        self.seen.lock().clone()
    }

    pub(crate) fn publish(&self, event: &TransactionEvent) {
        if !self.is_connected(&event.channel) {
            return;
        }
        self.seen.lock().push(event.clone());
        let resolvers = self.waiters.lock().remove(&event.tx_id).unwrap_or_default();
        for resolver in resolvers {
            resolver.deliver(event.clone());
        }
    }

    fn check_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(NetworkError::unreachable(&self.endpoint.name, "connection refused"))
        }
    }
}

#[async_trait]
impl EventHub for MockEventHub {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn connect(&self, channel: &str) -> Result<()> {
        self.check_reachable()?;
        self.connected.lock().insert(channel.to_string());
        Ok(())
    }

    fn watch(&self, resolver: CommitResolver) -> Result<()> {
        self.check_reachable()?;
        let mut waiters = self.waiters.lock();
        // Drop resolvers nobody is waiting on any more.
        waiters.retain(|_, list| {
            list.retain(|r| !r.is_done());
            !list.is_empty()
        });
        waiters
            .entry(resolver.tx_id().clone())
            .or_default()
            .push(resolver);
        Ok(())
    }
}

impl std::fmt::Debug for MockEventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEventHub")
            .field("endpoint", &self.endpoint.name)
            .field("connected", &*self.connected.lock())
            .field("pending", &self.pending())
            .finish()
    }
}
