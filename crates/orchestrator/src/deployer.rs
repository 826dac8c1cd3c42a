//! Chaincode install and instantiate.
//!
//! Both phases are all-or-nothing: one failed peer fails the phase. Peers an
//! install did reach are recorded, so a retry resumes with the rest. A
//! failed instantiate does not roll back the install. A `(name, version)`
//! becomes live only once its instantiate transaction commits, and a live
//! version is never instantiated again.

use std::collections::BTreeMap;
use std::time::Duration;

use hfc_core::{
    ChaincodeDescriptor, CommitResult, EndorsementPolicy, Identity, Proposal, ProposalBatch,
    ProposalKind, TransactionEnvelope, TxId,
};
use hfc_storage::{DeploymentState, DeploymentStore, Storage};
use tracing::{info, warn};

use crate::channel::Channel;
use crate::coordinator::{describe_failure, order_and_wait};
use crate::error::{DeploymentPhase, OrchestratorError, Result};
use crate::topology::PeerHandle;

/// Which peers an install reached.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSummary {
    pub installed: Vec<String>,
    /// Already carrying this version from an earlier run.
    pub skipped: Vec<String>,
}

fn audit_map(method: &str) -> BTreeMap<String, Vec<u8>> {
    let mut map = BTreeMap::new();
    map.insert("client".to_string(), b"hfc-orchestrator".to_vec());
    map.insert("method".to_string(), method.as_bytes().to_vec());
    map
}

fn log_batch(phase: DeploymentPhase, batch: &ProposalBatch) {
    info!(
        %phase,
        responses = batch.total(),
        succeeded = batch.successful().len(),
        failed = batch.failed().len(),
        "received proposal responses"
    );
    for outcome in batch.unverified_successes() {
        // Install responses are judged on status alone.
        warn!(%phase, peer = %outcome.peer, "endorsement signature did not verify");
    }
}

/// Installs and instantiates chaincode on a channel.
pub struct ChaincodeDeployer<'a> {
    deployments: DeploymentStore<'a>,
    deploy_wait: Duration,
}

impl<'a> ChaincodeDeployer<'a> {
    pub fn new(storage: &'a Storage, deploy_wait: Duration) -> Self {
        Self {
            deployments: DeploymentStore::new(storage),
            deploy_wait,
        }
    }

    fn already_live(&self, phase: DeploymentPhase, channel: &Channel, descriptor: &ChaincodeDescriptor) -> Result<()> {
        if self.deployments.is_live(channel.name(), &descriptor.id)? {
            return Err(OrchestratorError::Deployment {
                phase,
                succeeded: 0,
                failed: 0,
                detail: format!(
                    "chaincode {} is already live on channel {}",
                    descriptor.id,
                    channel.name()
                ),
            });
        }
        Ok(())
    }

    /// Install on `targets`, which must all belong to the channel admin's
    /// organization.
    pub async fn install(
        &self,
        channel: &Channel,
        descriptor: &ChaincodeDescriptor,
        channel_admin: &Identity,
        targets: &[PeerHandle],
    ) -> Result<InstallSummary> {
        let phase = DeploymentPhase::Install;
        self.already_live(phase, channel, descriptor)?;
        if let Some(foreign) = targets.iter().find(|p| p.msp_id != channel_admin.msp_id) {
            return Err(OrchestratorError::Configuration(format!(
                "{} cannot install on {}: peer belongs to {}",
                channel_admin.name,
                foreign.name(),
                foreign.msp_id
            )));
        }

        let previous = self
            .deployments
            .get(channel.name(), &descriptor.id)?
            .filter(|r| r.state == DeploymentState::Installed)
            .map(|r| r.installed_on)
            .unwrap_or_default();
        let (skipped, pending): (Vec<_>, Vec<_>) = targets
            .iter()
            .cloned()
            .partition(|p| previous.iter().any(|name| name == p.name()));
        let mut summary = InstallSummary {
            installed: Vec::new(),
            skipped: skipped.iter().map(|p| p.name().to_string()).collect(),
        };
        if pending.is_empty() {
            info!(chaincode = %descriptor.id, "chaincode already installed on every target");
            return Ok(summary);
        }

        info!(chaincode = %descriptor.id, peers = pending.len(), "sending install proposal");
        let proposal = Proposal::new(ProposalKind::Install, descriptor.id.clone(), channel_admin)?
            .with_source(&descriptor.source_location)
            .sign(channel_admin)?;
        let responses = channel.send_proposal(&proposal, &pending).await;
        let batch = ProposalBatch::partition(responses, ProposalKind::Install);
        log_batch(phase, &batch);

        summary.installed = batch.successful().iter().map(|o| o.peer.clone()).collect();
        for duplicate in batch.duplicates() {
            info!(peer = %duplicate.peer, chaincode = %descriptor.id, "chaincode already on peer");
            summary.skipped.push(duplicate.peer.clone());
        }

        // Peers holding the package stay recorded even when the phase fails.
        let reached: Vec<String> = summary
            .installed
            .iter()
            .chain(batch.duplicates().iter().map(|o| &o.peer))
            .cloned()
            .collect();
        if !reached.is_empty() {
            let mut installed_on = previous;
            installed_on.extend(reached);
            self.deployments
                .mark_installed(channel.name(), &descriptor.id, installed_on)?;
        }

        if !batch.is_unanimous() {
            let detail = format!("not enough endorsers for install: {}", describe_failure(&batch));
            return Err(OrchestratorError::deployment(phase, &batch, detail));
        }
        Ok(summary)
    }

    /// Load the endorsement policy, or fall back to any member of the MSPs
    /// whose peers are on the channel.
    fn endorsement_policy(&self, channel: &Channel, descriptor: &ChaincodeDescriptor) -> Result<EndorsementPolicy> {
        match &descriptor.policy_path {
            Some(path) => Ok(EndorsementPolicy::from_yaml_file(path)?),
            None => {
                let mut msp_ids: Vec<&str> = channel.peers().iter().map(|p| p.msp_id.as_str()).collect();
                msp_ids.sort_unstable();
                msp_ids.dedup();
                Ok(EndorsementPolicy::any_member_of(&msp_ids))
            }
        }
    }

    /// Instantiate on every channel peer and commit the result, waiting at
    /// most the deploy wait.
    pub async fn instantiate(
        &self,
        channel: &Channel,
        descriptor: &ChaincodeDescriptor,
        channel_admin: &Identity,
        function: &str,
        args: &[String],
    ) -> Result<TxId> {
        let phase = DeploymentPhase::Instantiate;
        self.already_live(phase, channel, descriptor)?;
        let policy = self.endorsement_policy(channel, descriptor)?;
        info!(chaincode = %descriptor.id, %policy, "sending instantiate proposal to all peers");

        let proposal = Proposal::new(ProposalKind::Instantiate, descriptor.id.clone(), channel_admin)?
            .on_channel(channel.name())
            .with_call(function, args.to_vec())
            .with_transient(audit_map("InstantiateProposalRequest"))
            .with_policy(policy.clone());
        let signed = proposal.clone().sign(channel_admin)?;
        let responses = channel.send_proposal(&signed, channel.peers()).await;
        let batch = ProposalBatch::partition(responses, ProposalKind::Instantiate);
        log_batch(phase, &batch);

        if !batch.is_unanimous() {
            let detail = format!("not enough endorsers for instantiate: {}", describe_failure(&batch));
            return Err(OrchestratorError::deployment(phase, &batch, detail));
        }
        let endorsers = batch.endorser_msp_ids();
        let endorser_refs: Vec<&str> = endorsers.iter().map(String::as_str).collect();
        if !policy.is_satisfied_by(&endorser_refs) {
            return Err(OrchestratorError::deployment(
                phase,
                &batch,
                format!("endorsements from {:?} do not satisfy {}", endorsers, policy),
            ));
        }

        let envelope = TransactionEnvelope::assemble(&proposal, channel.name(), &batch, channel_admin)
            .map_err(|e| OrchestratorError::deployment(phase, &batch, e.to_string()))?;
        info!(tx_id = %envelope.tx_id, "sending instantiate transaction to orderer");

        match order_and_wait(channel, channel.orderers(), &envelope, self.deploy_wait).await {
            CommitResult::Committed { tx_id, block_number } => {
                self.deployments
                    .mark_live(channel.name(), &descriptor.id, tx_id.clone())?;
                info!(tx_id = %tx_id, block = block_number, chaincode = %descriptor.id, "chaincode instantiated");
                Ok(tx_id)
            }
            CommitResult::Failed(failure) => Err(OrchestratorError::deployment(
                phase,
                &batch,
                format!("instantiate transaction failed: {}", failure),
            )),
        }
    }

    /// Install on the channel admin's peers, then instantiate.
    pub async fn deploy(
        &self,
        channel: &Channel,
        descriptor: &ChaincodeDescriptor,
        channel_admin: &Identity,
        function: &str,
        args: &[String],
    ) -> Result<TxId> {
        let targets = channel.peers_of(&channel_admin.org);
        self.install(channel, descriptor, channel_admin, &targets).await?;
        self.instantiate(channel, descriptor, channel_admin, function, args)
            .await
    }
}
