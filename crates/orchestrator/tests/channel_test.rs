mod common;

use common::{Fixture, BACKUP_ORDERER, ORDERER, PEER0, PEER1, PEER2};
use hfc_network::mock::{OrdererBehavior, PeerBehavior};
use hfc_orchestrator::OrchestratorError;

#[tokio::test]
async fn test_construct_channel() {
    let fixture = Fixture::three_peers();
    let mut context = fixture.bootstrap().await;

    let channel = context.construct_channel().await.unwrap();
    assert_eq!(channel.name(), "foo");
    assert!(channel.is_initialized());
    assert_eq!(channel.topology().peer_count(), 3);
    assert_eq!(channel.topology().orderers.len(), 2);
    assert_eq!(channel.topology().event_hubs.len(), 2);
    assert!(channel.topology().peers.get("peerOrg2").is_none());

    for name in [PEER0, PEER1, PEER2] {
        assert!(fixture.network.mock_peer(name).unwrap().has_joined("foo"));
    }
    let hub = fixture.network.mock_event_hub(PEER0).unwrap();
    assert!(hub.is_connected("foo"));
    assert_eq!(fixture.network.mock_orderer(ORDERER).unwrap().create_calls(), 1);
    assert_eq!(fixture.network.mock_orderer(BACKUP_ORDERER).unwrap().create_calls(), 0);
    assert!(fixture.network.ledger().has_channel("foo"));
}

#[tokio::test]
async fn test_second_peer_join_failure_stops_construction() {
    let fixture = Fixture::three_peers();
    fixture
        .network
        .set_peer_behavior(PEER1, PeerBehavior::RejectJoin("genesis block mismatch".into()));
    let mut context = fixture.bootstrap().await;

    let err = context.construct_channel().await.unwrap_err();
    assert_eq!(err.step(), Some("join peer 2"));
    assert!(err.is_fatal());
    assert!(err.to_string().contains("genesis block mismatch"));

    assert_eq!(fixture.network.mock_peer(PEER0).unwrap().join_calls(), 1);
    assert_eq!(fixture.network.mock_peer(PEER1).unwrap().join_calls(), 1);
    assert_eq!(fixture.network.mock_peer(PEER2).unwrap().join_calls(), 0);
    assert!(context.channel_handle().is_err());
}

#[tokio::test]
async fn test_create_failure_names_step() {
    let fixture = Fixture::new();
    fixture
        .network
        .set_orderer_behavior(ORDERER, OrdererBehavior::Reject("not authorized".into()));
    let mut context = fixture.bootstrap().await;

    let err = context.construct_channel().await.unwrap_err();
    assert_eq!(err.step(), Some("create channel"));
    assert_eq!(fixture.network.mock_peer(PEER0).unwrap().join_calls(), 0);
}

#[tokio::test]
async fn test_missing_channel_transaction() {
    let fixture = Fixture::new();
    std::fs::remove_file(&fixture.config.channel.tx_path).unwrap();
    let mut context = fixture.bootstrap().await;

    let err = context.construct_channel().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Configuration(_)));
    assert_eq!(fixture.network.mock_orderer(ORDERER).unwrap().create_calls(), 0);
}

#[tokio::test]
async fn test_channel_is_constructed_once() {
    let fixture = Fixture::new();
    let mut context = fixture.bootstrap().await;
    context.construct_channel().await.unwrap();

    let err = context.construct_channel().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Configuration(_)));
    assert_eq!(fixture.network.mock_orderer(ORDERER).unwrap().create_calls(), 1);
}
