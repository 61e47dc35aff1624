use crate::helpers::{bind_listener, client_connection};

use comm_core::error::registry::RegistryError;
use comm_core::server::ConnectionRegistry;

use std::sync::Arc;

/// **VALUE**: Verifies that concurrent registrations are neither lost nor duplicated.
///
/// **WHY THIS MATTERS**: The accept loop, every handler and the coordinator all
/// touch the registry. A lost insert leaves a client that shutdown never stops;
/// a double insert makes the count drift from the real number of sockets.
///
/// **BUG THIS CATCHES**: Would catch writes bypassing the actor (racing on the map)
/// or the reply being sent before the insert is visible.
#[tokio::test]
async fn given_n_concurrent_registrations_when_complete_then_count_is_n() {
    // GIVEN: N connections with distinct remote addresses
    const N: usize = 24;
    let listener = bind_listener().await;
    let registry = ConnectionRegistry::new();

    let mut connections = Vec::with_capacity(N);
    let mut keep_alive = Vec::with_capacity(N);
    for _ in 0..N {
        let (connection, reader, client) = client_connection(&listener).await;
        connections.push(connection);
        keep_alive.push((reader, client));
    }

    // WHEN: Registering all of them from separate tasks
    let tasks: Vec<_> = connections
        .iter()
        .map(|connection| {
            let registry = registry.clone();
            let connection = Arc::clone(connection);
            tokio::spawn(async move { registry.register(connection).await })
        })
        .collect();

    for task in tasks {
        task.await
            .expect("register task panicked")
            .expect("register failed");
    }

    // THEN: Every connection is present exactly once
    assert_eq!(registry.count().await, N);
    for connection in &connections {
        assert!(registry.contains(connection.id()).await);
    }
    assert_eq!(registry.snapshot().await.len(), N);
}

#[tokio::test]
async fn given_registered_id_when_registered_again_then_duplicate_id() {
    // GIVEN: A registered connection
    let listener = bind_listener().await;
    let (connection, _reader, _client) = client_connection(&listener).await;
    let registry = ConnectionRegistry::new();
    registry.register(Arc::clone(&connection)).await.unwrap();

    // WHEN: Registering it a second time
    let result = registry.register(Arc::clone(&connection)).await;

    // THEN: Rejected without touching the existing entry
    assert!(
        matches!(result, Err(RegistryError::DuplicateId { ref id, .. }) if id == connection.id()),
        "Expected DuplicateId, got {result:?}"
    );
    assert_eq!(registry.count().await, 1);
}

/// **VALUE**: Removing an unknown id is a silent no-op.
///
/// **BUG THIS CATCHES**: Would catch `remove()` erroring or panicking when the
/// handler and the coordinator both try to deregister the same client.
#[tokio::test]
async fn given_unknown_id_when_removed_then_no_op() {
    let registry = ConnectionRegistry::new();

    let removed = registry.remove("does-not-exist").await;

    assert!(matches!(removed, Ok(false)));
    assert_eq!(registry.count().await, 0);
}

#[tokio::test]
async fn given_same_id_removed_concurrently_when_done_then_exactly_one_removal() {
    // GIVEN: One registered connection
    let listener = bind_listener().await;
    let (connection, _reader, _client) = client_connection(&listener).await;
    let registry = ConnectionRegistry::new();
    registry.register(Arc::clone(&connection)).await.unwrap();

    // WHEN: Two tasks remove it at the same time (handler vs coordinator)
    let id = connection.id().to_string();
    let first = tokio::spawn({
        let registry = registry.clone();
        let id = id.clone();
        async move { registry.remove(&id).await }
    });
    let second = tokio::spawn({
        let registry = registry.clone();
        async move { registry.remove(&id).await }
    });

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    // THEN: Exactly one of them removed it and the count never goes negative
    assert!(first ^ second, "Exactly one remove should report removal");
    assert_eq!(registry.count().await, 0);
}

#[tokio::test]
async fn given_snapshot_when_registry_changes_then_snapshot_is_unchanged() {
    // GIVEN: Two registered connections and a snapshot of them
    let listener = bind_listener().await;
    let (first, _r1, _c1) = client_connection(&listener).await;
    let (second, _r2, _c2) = client_connection(&listener).await;
    let registry = ConnectionRegistry::new();
    registry.register(Arc::clone(&first)).await.unwrap();
    registry.register(Arc::clone(&second)).await.unwrap();

    let snapshot = registry.snapshot().await;

    // WHEN: The registry changes afterwards
    registry.remove(first.id()).await.unwrap();

    // THEN: The snapshot still reflects the moment it was taken
    assert_eq!(snapshot.len(), 2);
    assert_eq!(registry.count().await, 1);
    assert!(!registry.contains(first.id()).await);
    assert!(registry.contains(second.id()).await);
}
