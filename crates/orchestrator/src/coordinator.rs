//! Two-phase transaction submission.
//!
//! Phase 1 collects endorsements from every endorsing peer; a single failed
//! or unverified response aborts the transaction before the ordering service
//! is contacted. Phase 2 broadcasts the endorsed envelope and waits, bounded
//! by the caller's timeout, for the commit event.

use std::sync::Arc;
use std::time::Duration;

use hfc_core::{
    ChaincodeId, CommitFailure, CommitFailureKind, CommitResult, Identity, Proposal, ProposalBatch,
    ProposalKind, TransactionEnvelope, TxId,
};
use hfc_network::OrdererNode;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::channel::Channel;
use crate::topology::PeerHandle;

/// A chaincode call to submit as a transaction.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub chaincode: ChaincodeId,
    pub function: String,
    pub args: Vec<String>,
}

impl TransactionRequest {
    pub fn new(chaincode: ChaincodeId, function: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            chaincode,
            function: function.into(),
            args,
        }
    }
}

fn endorsement_failure(tx_id: Option<TxId>, message: impl Into<String>) -> CommitResult {
    CommitResult::Failed(CommitFailure::new(CommitFailureKind::Endorsement, tx_id, message))
}

/// Summary of a batch's first failure, with the counts.
pub(crate) fn describe_failure(batch: &ProposalBatch) -> String {
    match batch.first_failure() {
        Some(first) => format!(
            "{} of {} endorsers failed; {} failed with {} (verified: {})",
            batch.failed().len(),
            batch.total(),
            first.peer,
            if first.message.is_empty() {
                "no message"
            } else {
                first.message.as_str()
            },
            first.verified
        ),
        None => "no endorsements".to_string(),
    }
}

/// Broadcast `envelope` to `orderers` and wait for its commit on `channel`,
/// all within `timeout`. A timeout too large to form a deadline waits
/// without one.
pub(crate) async fn order_and_wait(
    channel: &Channel,
    orderers: &[Arc<dyn OrdererNode>],
    envelope: &TransactionEnvelope,
    timeout: Duration,
) -> CommitResult {
    let deadline = Instant::now().checked_add(timeout);
    let send = channel.send_transaction_via(envelope, orderers);
    let handle = match tokio::time::timeout(timeout, send).await {
        Ok(handle) => handle,
        Err(_) => {
            return CommitResult::Failed(CommitFailure::new(
                CommitFailureKind::Timeout,
                Some(envelope.tx_id.clone()),
                format!("ordering service did not accept the transaction within {:?}", timeout),
            ))
        }
    };
    let remaining = deadline.map_or(timeout, |d| d.saturating_duration_since(Instant::now()));
    handle.wait(remaining).await
}

/// Submits transactions on one channel.
pub struct TransactionCoordinator<'a> {
    channel: &'a Channel,
}

impl<'a> TransactionCoordinator<'a> {
    pub fn new(channel: &'a Channel) -> Self {
        Self { channel }
    }

    /// Endorse `request` on `endorsers`, order it through the first of
    /// `orderers` that accepts, and wait at most `timeout` for the commit.
    /// Always produces exactly one result.
    pub async fn submit(
        &self,
        creator: &Identity,
        request: &TransactionRequest,
        endorsers: &[PeerHandle],
        orderers: &[Arc<dyn OrdererNode>],
        timeout: Duration,
    ) -> CommitResult {
        if endorsers.is_empty() {
            return endorsement_failure(None, "no endorsing peers");
        }

        let proposal = match Proposal::new(ProposalKind::Invoke, request.chaincode.clone(), creator) {
            Ok(p) => p
                .on_channel(self.channel.name())
                .with_call(&request.function, request.args.clone()),
            Err(err) => return endorsement_failure(None, err.to_string()),
        };
        let tx_id = proposal.tx_id.clone();
        let signed = match proposal.clone().sign(creator) {
            Ok(signed) => signed,
            Err(err) => return endorsement_failure(Some(tx_id), err.to_string()),
        };

        let responses = self.channel.send_proposal(&signed, endorsers).await;
        let batch = ProposalBatch::partition(responses, ProposalKind::Invoke);
        info!(
            tx_id = %tx_id,
            function = %request.function,
            succeeded = batch.successful().len(),
            failed = batch.failed().len(),
            "collected endorsements"
        );
        if !batch.is_unanimous() {
            let message = describe_failure(&batch);
            warn!(tx_id = %tx_id, "{}", message);
            return endorsement_failure(Some(tx_id), message);
        }

        let envelope = match TransactionEnvelope::assemble(&proposal, self.channel.name(), &batch, creator) {
            Ok(envelope) => envelope,
            Err(err) => return endorsement_failure(Some(tx_id), err.to_string()),
        };

        let result = order_and_wait(self.channel, orderers, &envelope, timeout).await;
        match &result {
            CommitResult::Committed { block_number, .. } => {
                info!(tx_id = %tx_id, block = block_number, "transaction committed")
            }
            CommitResult::Failed(failure) => {
                warn!(tx_id = %tx_id, kind = %failure.kind, "{}", failure.message)
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hfc_core::ProposalResponse;

    #[test]
    fn test_describe_failure() {
        let tx_id = TxId::new("tx-1");
        let responses = vec![
            ProposalResponse::failure("peer0", tx_id.clone(), "chaincode panicked"),
            ProposalResponse::failure("peer1", tx_id, "timeout"),
        ];
        let batch = ProposalBatch::partition(responses, ProposalKind::Invoke);
        assert_eq!(
            describe_failure(&batch),
            "2 of 2 endorsers failed; peer0 failed with chaincode panicked (verified: false)"
        );
    }

    #[test]
    fn test_describe_empty_batch() {
        let batch = ProposalBatch::partition(Vec::new(), ProposalKind::Invoke);
        assert_eq!(describe_failure(&batch), "no endorsements");
    }
}
