mod common;

use common::Fixture;
use hfc_core::EnrollmentState;
use hfc_orchestrator::{keystore, NetworkContext, OrchestratorError};
use hfc_storage::{IdentityStore, Storage};

#[tokio::test]
async fn test_bootstrap_twice_is_idempotent() {
    let fixture = Fixture::new();
    let storage = Storage::open_temporary().unwrap();

    let first = NetworkContext::bootstrap(fixture.config.clone(), storage.clone(), &fixture.network)
        .await
        .unwrap();
    let certificates: Vec<_> = IdentityStore::new(&storage)
        .list_all()
        .unwrap()
        .into_iter()
        .map(|id| (id.name.clone(), id.certificate().map(str::to_string)))
        .collect();
    assert_eq!(certificates.len(), 6);

    let org1 = first.topology().org("peerOrg1").unwrap();
    let ca = fixture.network.mock_ca(&org1.org);
    let registers = ca.register_calls();
    let enrolls = ca.enroll_calls();
    assert_eq!(registers, 1);
    assert_eq!(enrolls, 2);
    drop(first);

    let second = NetworkContext::bootstrap(fixture.config.clone(), storage.clone(), &fixture.network)
        .await
        .unwrap();
    let again: Vec<_> = IdentityStore::new(&storage)
        .list_all()
        .unwrap()
        .into_iter()
        .map(|id| (id.name.clone(), id.certificate().map(str::to_string)))
        .collect();
    assert_eq!(certificates, again);
    assert_eq!(ca.register_calls(), registers);
    assert_eq!(ca.enroll_calls(), enrolls);
    assert!(second.enrollments().iter().all(|r| r.registered && r.enrolled));
}

#[tokio::test]
async fn test_identity_survives_reopen() {
    let fixture = Fixture::new();
    let store_path = fixture.dir.path().join("store");

    let certificate = {
        let storage = Storage::open(&store_path).unwrap();
        let context = NetworkContext::bootstrap(fixture.config.clone(), storage, &fixture.network)
            .await
            .unwrap();
        let user = context.client_handle().unwrap().identity.clone();
        assert!(user.is_enrolled());
        user.certificate().unwrap().to_string()
    };

    let storage = Storage::open(&store_path).unwrap();
    let reloaded = IdentityStore::new(&storage)
        .get("peerOrg1", "user1")
        .unwrap()
        .unwrap();
    assert!(matches!(reloaded.state(), EnrollmentState::Enrolled { .. }));
    assert_eq!(reloaded.certificate(), Some(certificate.as_str()));
    assert_eq!(reloaded.affiliation.as_deref(), Some("org1.department1"));
}

#[tokio::test]
async fn test_unreachable_ca_aborts_bootstrap() {
    let fixture = Fixture::new();
    let org2 = fixture.config.organizations[1].to_organization();
    fixture.network.mock_ca(&org2).set_reachable(false);

    let err = NetworkContext::bootstrap(
        fixture.config.clone(),
        Storage::open_temporary().unwrap(),
        &fixture.network,
    )
    .await
    .unwrap_err();
    match err {
        OrchestratorError::Enrollment { org, identity, .. } => {
            assert_eq!(org, "peerOrg2");
            assert_eq!(identity, "admin");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_ambiguous_key_material_is_fatal() {
    let fixture = Fixture::new();
    let org1 = &fixture.config.organizations[0];
    keystore::provision(&fixture.config.crypto_config_root, org1).unwrap();

    let err = NetworkContext::bootstrap(
        fixture.config.clone(),
        Storage::open_temporary().unwrap(),
        &fixture.network,
    )
    .await
    .unwrap_err();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("expected exactly one _sk file"));
}

#[tokio::test]
async fn test_rejected_registration_aborts_bootstrap() {
    let fixture = Fixture::new();
    let org1 = fixture.config.organizations[0].to_organization();
    fixture.network.mock_ca(&org1).preregister("user1", "taken");

    let err = NetworkContext::bootstrap(
        fixture.config.clone(),
        Storage::open_temporary().unwrap(),
        &fixture.network,
    )
    .await
    .unwrap_err();
    assert!(err.is_fatal());
    match err {
        OrchestratorError::Enrollment { org, identity, .. } => {
            assert_eq!(org, "peerOrg1");
            assert_eq!(identity, "user1");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_rotated_channel_admin_replaces_stored_one() {
    let fixture = Fixture::new();
    let storage = Storage::open_temporary().unwrap();
    let org1 = &fixture.config.organizations[0];

    let first = NetworkContext::bootstrap(fixture.config.clone(), storage.clone(), &fixture.network)
        .await
        .unwrap();
    let old_cert = first
        .topology()
        .org("peerOrg1")
        .unwrap()
        .org
        .require_channel_admin()
        .unwrap()
        .certificate()
        .unwrap()
        .to_string();
    drop(first);

    let keystore_dir = keystore::keystore_dir(&fixture.config.crypto_config_root, &org1.domain);
    std::fs::remove_dir_all(&keystore_dir).unwrap();
    keystore::provision(&fixture.config.crypto_config_root, org1).unwrap();
    let on_disk = std::fs::read_to_string(keystore::certificate_path(
        &fixture.config.crypto_config_root,
        &org1.domain,
    ))
    .unwrap();
    assert_ne!(on_disk, old_cert);

    let second = NetworkContext::bootstrap(fixture.config.clone(), storage.clone(), &fixture.network)
        .await
        .unwrap();
    let admin = second
        .topology()
        .org("peerOrg1")
        .unwrap()
        .org
        .require_channel_admin()
        .unwrap();
    assert_eq!(admin.certificate(), Some(on_disk.as_str()));

    let stored = IdentityStore::new(&storage)
        .get("peerOrg1", &admin.name)
        .unwrap()
        .unwrap();
    assert_eq!(stored.certificate(), Some(on_disk.as_str()));
}
