mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{Fixture, BACKUP_ORDERER, ORDERER, PEER1};
use hfc_core::{CommitFailureKind, CommitResult};
use hfc_network::mock::{OrdererBehavior, PeerBehavior};
use hfc_network::OrdererNode;
use hfc_orchestrator::{TransactionCoordinator, TransactionRequest};

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_submit_commits() {
    let fixture = Fixture::three_peers();
    let context = fixture.start().await;
    let height = fixture.network.ledger().height();

    let result = context
        .submit("createCar", args(&["CAR10", "Chevy", "Volt", "Red", "Nick"]))
        .await
        .unwrap();
    match &result {
        CommitResult::Committed { block_number, .. } => assert_eq!(*block_number, height + 1),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(result.tx_id().is_some());

    let hub = fixture.network.mock_event_hub("peer0.org1.example.com").unwrap();
    assert!(hub.events().iter().any(|e| Some(&e.tx_id) == result.tx_id()));
    assert_eq!(hub.pending(), 0);
}

#[tokio::test]
async fn test_unverified_endorsement_is_never_ordered() {
    let fixture = Fixture::three_peers();
    let context = fixture.start().await;
    let broadcasts = fixture.network.broadcast_calls();
    fixture.network.set_peer_behavior(PEER1, PeerBehavior::BadSignature);

    let result = context.submit("createCar", args(&["CAR11"])).await.unwrap();
    let failure = result.failure().unwrap();
    assert_eq!(failure.kind, CommitFailureKind::Endorsement);
    assert!(failure.message.contains(PEER1));
    assert!(failure.message.contains("verified: false"));
    assert_eq!(fixture.network.broadcast_calls(), broadcasts);
}

#[tokio::test]
async fn test_failed_endorsement_is_never_ordered() {
    let fixture = Fixture::three_peers();
    let context = fixture.start().await;
    let broadcasts = fixture.network.broadcast_calls();
    fixture
        .network
        .set_peer_behavior(PEER1, PeerBehavior::Fail("chaincode error".into()));

    let result = context.submit("createCar", args(&["CAR12"])).await.unwrap();
    assert_eq!(result.failure().unwrap().kind, CommitFailureKind::Endorsement);
    assert_eq!(fixture.network.broadcast_calls(), broadcasts);
}

#[tokio::test]
async fn test_silent_orderer_times_out() {
    let fixture = Fixture::new();
    let context = fixture.start().await;
    fixture.network.set_orderer_behavior(ORDERER, OrdererBehavior::Silent);
    let user = context.client_handle().unwrap().identity.clone();

    let timeout = Duration::from_millis(300);
    let started = Instant::now();
    let result = context
        .submit_as(&user, "createCar", args(&["CAR13"]), timeout)
        .await
        .unwrap();
    assert!(started.elapsed() >= timeout);

    let failure = result.failure().unwrap();
    assert_eq!(failure.kind, CommitFailureKind::Timeout);
    assert!(failure.tx_id.is_some());
}

#[tokio::test]
async fn test_unbounded_timeout_commits() {
    let fixture = Fixture::new();
    let context = fixture.start().await;
    let user = context.client_handle().unwrap().identity.clone();

    let result = context
        .submit_as(&user, "createCar", args(&["CAR17"]), Duration::MAX)
        .await
        .unwrap();
    assert!(result.is_committed());
}

#[tokio::test]
async fn test_invalid_commit_is_rejected() {
    let fixture = Fixture::new();
    let context = fixture.start().await;
    fixture
        .network
        .set_orderer_behavior(ORDERER, OrdererBehavior::Invalidate("MVCC_READ_CONFLICT".into()));

    let result = context.submit("changeCarOwner", args(&["CAR1", "Dave"])).await.unwrap();
    let failure = result.failure().unwrap();
    assert_eq!(failure.kind, CommitFailureKind::CommitRejected);
    assert!(failure.tx_id.is_some());
    assert!(failure.message.contains("MVCC_READ_CONFLICT"));
}

#[tokio::test]
async fn test_orderer_failover() {
    let fixture = Fixture::three_peers();
    let context = fixture.start().await;
    fixture
        .network
        .set_orderer_behavior(ORDERER, OrdererBehavior::Unreachable);
    let primary = fixture.network.mock_orderer(ORDERER).unwrap();
    let backup = fixture.network.mock_orderer(BACKUP_ORDERER).unwrap();
    let (primary_calls, backup_calls) = (primary.broadcast_calls(), backup.broadcast_calls());

    let result = context.submit("createCar", args(&["CAR14"])).await.unwrap();
    assert!(result.is_committed());
    assert_eq!(primary.broadcast_calls(), primary_calls + 1);
    assert_eq!(backup.broadcast_calls(), backup_calls + 1);
}

#[tokio::test]
async fn test_submit_through_chosen_orderer() {
    let fixture = Fixture::three_peers();
    let context = fixture.start().await;
    let channel = context.channel_handle().unwrap();
    let backup_only: Vec<Arc<dyn OrdererNode>> = channel
        .orderers()
        .iter()
        .filter(|o| o.endpoint().name == BACKUP_ORDERER)
        .cloned()
        .collect();
    let primary = fixture.network.mock_orderer(ORDERER).unwrap();
    let backup = fixture.network.mock_orderer(BACKUP_ORDERER).unwrap();
    let (primary_calls, backup_calls) = (primary.broadcast_calls(), backup.broadcast_calls());

    let user = context.client_handle().unwrap().identity.clone();
    let request = TransactionRequest::new(context.chaincode_descriptor().id, "createCar", args(&["CAR18"]));
    let result = TransactionCoordinator::new(channel)
        .submit(&user, &request, channel.peers(), &backup_only, Duration::from_secs(5))
        .await;
    assert!(result.is_committed());
    assert_eq!(primary.broadcast_calls(), primary_calls);
    assert_eq!(backup.broadcast_calls(), backup_calls + 1);

    let result = TransactionCoordinator::new(channel)
        .submit(&user, &request, channel.peers(), &[], Duration::from_secs(5))
        .await;
    assert_eq!(result.failure().unwrap().kind, CommitFailureKind::Transport);
}

#[tokio::test]
async fn test_no_orderer_accepts() {
    let fixture = Fixture::three_peers();
    let context = fixture.start().await;
    fixture
        .network
        .set_orderer_behavior(ORDERER, OrdererBehavior::Unreachable);
    fixture
        .network
        .set_orderer_behavior(BACKUP_ORDERER, OrdererBehavior::Reject("service unavailable".into()));

    let result = context.submit("createCar", args(&["CAR15"])).await.unwrap();
    let failure = result.failure().unwrap();
    assert_eq!(failure.kind, CommitFailureKind::Transport);
    assert!(failure.message.contains("service unavailable"));
}

#[tokio::test]
async fn test_submit_requires_channel() {
    let fixture = Fixture::new();
    let context = fixture.bootstrap().await;
    assert!(context.submit("createCar", args(&["CAR16"])).await.is_err());
}
