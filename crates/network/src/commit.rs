//! Pending commit handles.
//!
//! Submitting a transaction to the ordering service yields a [`CommitHandle`].
//! The handle resolves exactly once, from whichever source reports first: an
//! event hub delivering the commit event, or the submitter reporting that
//! ordering failed. Dropping the handle cancels the wait; late resolutions are
//! then discarded.

use std::sync::Arc;
use std::time::Duration;

use hfc_core::{CommitFailure, CommitFailureKind, CommitResult, TransactionEvent, TxId};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;

/// Asynchronous failure reported for a pending transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    /// The ledger emitted an event for the transaction but did not accept it.
    #[error("transaction {} failed with {}: {message}", .event.tx_id, .event.validation_code)]
    Rejected {
        event: TransactionEvent,
        message: String,
    },

    /// Ordering or event delivery failed before any commit event was seen.
    #[error("{0}")]
    Transport(String),
}

pub type CommitOutcome = std::result::Result<TransactionEvent, CommitError>;

/// Write side of a pending commit. Cloneable; only the first resolution wins.
#[derive(Clone)]
pub struct CommitResolver {
    tx_id: TxId,
    sender: Arc<Mutex<Option<oneshot::Sender<CommitOutcome>>>>,
}

impl CommitResolver {
    pub fn tx_id(&self) -> &TxId {
        &self.tx_id
    }

    /// Resolve the handle. Returns false if it was already resolved or the
    /// handle has been dropped.
    pub fn resolve(&self, outcome: CommitOutcome) -> bool {
        match self.sender.lock().take() {
            Some(sender) => sender.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Deliver a commit event, turning an invalid event into a rejection.
    pub fn deliver(&self, event: TransactionEvent) -> bool {
        if event.valid {
            self.resolve(Ok(event))
        } else {
            let message = format!("validation code {}", event.validation_code);
            self.resolve(Err(CommitError::Rejected { event, message }))
        }
    }

    /// True once resolved or once nobody is waiting any more.
    pub fn is_done(&self) -> bool {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.is_closed(),
            None => true,
        }
    }
}

/// Read side of a pending commit.
pub struct CommitHandle {
    tx_id: TxId,
    receiver: oneshot::Receiver<CommitOutcome>,
}

impl CommitHandle {
    /// Create a linked resolver/handle pair for `tx_id`.
    pub fn pending(tx_id: TxId) -> (CommitResolver, CommitHandle) {
        let (sender, receiver) = oneshot::channel();
        let resolver = CommitResolver {
            tx_id: tx_id.clone(),
            sender: Arc::new(Mutex::new(Some(sender))),
        };
        (resolver, CommitHandle { tx_id, receiver })
    }

    pub fn tx_id(&self) -> &TxId {
        &self.tx_id
    }

    /// Wait at most `timeout` for the outcome and classify it.
    pub async fn wait(self, timeout: Duration) -> CommitResult {
        let tx_id = self.tx_id;
        match tokio::time::timeout(timeout, self.receiver).await {
            Err(_) => CommitResult::Failed(CommitFailure::new(
                CommitFailureKind::Timeout,
                Some(tx_id),
                format!("no commit event within {:?}", timeout),
            )),
            Ok(received) => classify(tx_id, received.ok()),
        }
    }

    /// Non-blocking check; `None` while the transaction is still pending.
    pub fn poll(&mut self) -> Option<CommitResult> {
        match self.receiver.try_recv() {
            Err(oneshot::error::TryRecvError::Empty) => None,
            Ok(outcome) => Some(classify(self.tx_id.clone(), Some(outcome))),
            Err(oneshot::error::TryRecvError::Closed) => Some(classify(self.tx_id.clone(), None)),
        }
    }
}

/// `None` means the resolver went away without reporting.
fn classify(tx_id: TxId, received: Option<CommitOutcome>) -> CommitResult {
    match received {
        Some(Ok(event)) if event.valid => CommitResult::Committed {
            tx_id: event.tx_id,
            block_number: event.block_number,
        },
        Some(Ok(event)) => CommitResult::Failed(CommitFailure::new(
            CommitFailureKind::CommitRejected,
            Some(event.tx_id),
            format!("validation code {}", event.validation_code),
        )),
        Some(Err(CommitError::Rejected { event, message })) => CommitResult::Failed(
            CommitFailure::new(CommitFailureKind::CommitRejected, Some(event.tx_id), message),
        ),
        Some(Err(CommitError::Transport(message))) => CommitResult::Failed(CommitFailure::new(
            CommitFailureKind::Transport,
            Some(tx_id),
            message,
        )),
        None => CommitResult::Failed(CommitFailure::new(
            CommitFailureKind::Transport,
            Some(tx_id),
            "commit notifier dropped without a result",
        )),
    }
}
