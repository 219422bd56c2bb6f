//! Edge case tests: empty and maximal payloads, absence versus inactivity,
//! check ordering, read-only isolation and snapshot corner cases.

use std::sync::Arc;

use identity_registry::{
    DispatchError, Dispatcher, IdentityRegistry, ManualClock, Principal, RegistryConfig,
    RegistryError, SnapshotStore, StorageError, Value,
};

const CONTRACT: &str = "identity-registry";

// === Payload Edge Cases ===

#[test]
fn edge_empty_payload_is_a_valid_identity() {
    let registry = IdentityRegistry::new();
    let user = Principal::new("user");
    assert_eq!(registry.register_identity(&user, Vec::new()), Ok(true));
    assert_eq!(registry.get_identity_data(&user, &user), Ok(Vec::new()));
    assert_eq!(registry.is_identity_active(&user, &user), Ok(true));
}

#[test]
fn edge_binary_payload_is_stored_verbatim() {
    let registry = IdentityRegistry::new();
    let user = Principal::new("user");
    let payload: Vec<u8> = (0..=255).collect();
    registry.register_identity(&user, payload.clone()).unwrap();
    assert_eq!(registry.get_identity_data(&user, &user).unwrap(), payload);
}

#[test]
fn edge_payload_at_dispatch_limit() {
    let dispatcher = Dispatcher::new(
        Arc::new(IdentityRegistry::new()),
        &RegistryConfig::default(),
    );
    let user = Principal::new("user");

    let at_limit = Value::Buffer(vec![0xAB; 1024]);
    assert!(dispatcher
        .call_public(CONTRACT, "register-identity", &[at_limit], &user)
        .is_ok());

    let over = Value::Buffer(vec![0xAB; 1025]);
    let err = dispatcher
        .call_public(CONTRACT, "update-identity", &[over], &user)
        .unwrap_err();
    assert!(matches!(err, DispatchError::PayloadTooLarge { .. }));

    // The rejected update left the stored payload alone.
    assert_eq!(
        dispatcher.registry().get_identity_data(&user, &user).unwrap(),
        vec![0xAB; 1024]
    );
}

// === Existence Edge Cases ===

#[test]
fn edge_absence_is_not_inactivity() {
    let registry = IdentityRegistry::new();
    let ghost = Principal::new("ghost");
    let err = registry
        .is_identity_active(&Principal::new("reader"), &ghost)
        .unwrap_err();
    assert_eq!(err, RegistryError::NotFound(ghost));
}

#[test]
fn edge_not_found_wins_over_unauthorized_for_any_caller() {
    let registry = IdentityRegistry::new();
    registry
        .register_identity(&Principal::new("owner"), b"d".to_vec())
        .unwrap();

    for caller in ["owner", "stranger", "ghost"] {
        let err = registry
            .deactivate_identity(&Principal::new(caller), &Principal::new("ghost"))
            .unwrap_err();
        assert_eq!(err.code(), 404, "caller {caller} must see NotFound");
    }
}

#[test]
fn edge_failed_calls_leave_no_trace() {
    let registry = IdentityRegistry::new();
    let user = Principal::new("user");

    assert!(registry.update_identity(&user, b"x".to_vec()).is_err());
    assert!(registry.deactivate_identity(&user, &user).is_err());
    assert!(registry.is_empty());

    // The principal can still register afterwards.
    assert_eq!(registry.register_identity(&user, b"d".to_vec()), Ok(true));
}

#[test]
fn edge_owner_cannot_touch_someone_else_via_update() {
    let registry = IdentityRegistry::new();
    let alice = Principal::new("alice");
    let bob = Principal::new("bob");
    registry.register_identity(&alice, b"alice".to_vec()).unwrap();

    // Bob has no record of his own, so his update is NotFound even though
    // alice's record exists.
    assert_eq!(
        registry.update_identity(&bob, b"hijack".to_vec()),
        Err(RegistryError::NotFound(bob.clone()))
    );
    assert_eq!(registry.get_identity_data(&bob, &alice).unwrap(), b"alice".to_vec());
}

// === Deactivation Edge Cases ===

#[test]
fn edge_deactivation_is_idempotent_for_owner() {
    let clock = Arc::new(ManualClock::new(10));
    let registry = IdentityRegistry::with_clock(clock.clone());
    let user = Principal::new("user");
    registry.register_identity(&user, b"d".to_vec()).unwrap();

    assert_eq!(registry.deactivate_identity(&user, &user), Ok(true));
    clock.advance(10);
    assert_eq!(registry.deactivate_identity(&user, &user), Ok(true));

    let record = registry.get_identity(&user).unwrap();
    assert!(!record.active);
    assert_eq!(record.deactivated_at, Some(10));
}

#[test]
fn edge_non_owner_cannot_deactivate_inactive_record_either() {
    let registry = IdentityRegistry::new();
    let user = Principal::new("user");
    registry.register_identity(&user, b"d".to_vec()).unwrap();
    registry.deactivate_identity(&user, &user).unwrap();

    let err = registry
        .deactivate_identity(&Principal::new("other"), &user)
        .unwrap_err();
    assert_eq!(err.code(), 401);
}

// === Dispatch Edge Cases ===

#[test]
fn edge_read_only_rejects_every_mutator() {
    let dispatcher = Dispatcher::new(
        Arc::new(IdentityRegistry::new()),
        &RegistryConfig::default(),
    );
    let user = Principal::new("user");
    let calls = [
        ("register-identity", Value::Buffer(b"d".to_vec())),
        ("update-identity", Value::Buffer(b"d".to_vec())),
        ("deactivate-identity", Value::Principal(user.clone())),
    ];
    for (op, arg) in calls {
        let err = dispatcher
            .call_read_only(CONTRACT, op, &[arg], &user)
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotReadOnly(_)), "{op}");
    }
    assert!(dispatcher.registry().is_empty());
}

#[test]
fn edge_public_call_may_read() {
    let dispatcher = Dispatcher::new(
        Arc::new(IdentityRegistry::new()),
        &RegistryConfig::default(),
    );
    let user = Principal::new("user");
    dispatcher
        .call_public(CONTRACT, "register-identity", &[Value::Buffer(b"d".to_vec())], &user)
        .unwrap();
    let value = dispatcher
        .call_public(CONTRACT, "is-identity-active", &[Value::Principal(user.clone())], &user)
        .unwrap();
    assert_eq!(value, Value::Bool(true));
}

// === Snapshot Edge Cases ===

#[test]
fn edge_snapshot_of_empty_registry() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("registry.json"));
    store.save(&IdentityRegistry::new()).unwrap();
    let loaded = store.load(Arc::new(ManualClock::new(0))).unwrap();
    assert!(loaded.is_empty());
}

#[test]
fn edge_snapshot_with_bad_payload_encoding() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.json");
    std::fs::write(
        &path,
        concat!(
            r#"{"version":1,"records":[{"owner":"u","data":"%%%","#,
            r#""active":true,"registered_at":0,"updated_at":0}]}"#,
        ),
    )
    .unwrap();
    let err = SnapshotStore::new(&path)
        .load(Arc::new(ManualClock::new(0)))
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidFileFormat(_)));
}
