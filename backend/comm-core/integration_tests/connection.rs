use crate::helpers::{WAIT, bind_listener, client_connection, read_until_closed};

use comm_core::error::connection::ConnectionError;
use comm_core::server::fingerprint;

use std::sync::Arc;

use tokio::time::timeout;

#[tokio::test]
async fn given_accepted_socket_when_wrapped_then_id_is_fingerprint_of_address() {
    let listener = bind_listener().await;
    let (connection, _reader, client) = client_connection(&listener).await;

    let client_addr = client.local_addr().unwrap().to_string();
    assert_eq!(connection.address(), client_addr);
    assert_eq!(connection.id(), fingerprint(&client_addr));
    assert!(!connection.is_closed());
}

/// **VALUE**: Disconnect notifies the peer with `STOP` and then closes.
///
/// **WHY THIS MATTERS**: `STOP` is the only way a client learns the server is going
/// away on purpose rather than crashing.
///
/// **BUG THIS CATCHES**: Would catch closing before writing, writing after closing,
/// or appending a delimiter to the control message.
#[tokio::test]
async fn given_open_connection_when_disconnected_then_peer_reads_stop_then_eof() {
    // GIVEN: An open connection
    let listener = bind_listener().await;
    let (connection, _reader, mut client) = client_connection(&listener).await;

    // WHEN: Disconnecting
    connection.disconnect().await.expect("First disconnect succeeds");

    // THEN: The peer gets exactly STOP followed by EOF
    assert_eq!(read_until_closed(&mut client).await, b"STOP");
    assert!(connection.is_closed());
}

/// **VALUE**: A second disconnect reports `AlreadyClosed` instead of failing.
///
/// **BUG THIS CATCHES**: Would catch the second call trying to write to a closed
/// socket and surfacing a generic I/O error (or panicking on a taken writer).
#[tokio::test]
async fn given_disconnected_connection_when_disconnected_again_then_already_closed() {
    // GIVEN: A connection that was already disconnected
    let listener = bind_listener().await;
    let (connection, _reader, _client) = client_connection(&listener).await;
    connection.disconnect().await.unwrap();

    // WHEN: Disconnecting again
    let result = connection.disconnect().await;

    // THEN: AlreadyClosed, not an I/O error
    assert!(
        matches!(result, Err(ConnectionError::AlreadyClosed { .. })),
        "Expected AlreadyClosed, got {result:?}"
    );
}

#[tokio::test]
async fn given_concurrent_disconnects_when_raced_then_exactly_one_performs_close() {
    // GIVEN: One open connection shared by two tasks
    let listener = bind_listener().await;
    let (connection, _reader, mut client) = client_connection(&listener).await;

    // WHEN: Both disconnect at once
    let first = tokio::spawn({
        let connection = Arc::clone(&connection);
        async move { connection.disconnect().await }
    });
    let second = tokio::spawn({
        let connection = Arc::clone(&connection);
        async move { connection.disconnect().await }
    });
    let results = [first.await.unwrap(), second.await.unwrap()];

    // THEN: One success, one AlreadyClosed, and STOP was sent only once
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let already_closed = results
        .iter()
        .filter(|r| matches!(r, Err(ConnectionError::AlreadyClosed { .. })))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(already_closed, 1);
    assert_eq!(read_until_closed(&mut client).await, b"STOP");
}

#[tokio::test]
async fn given_peer_already_gone_when_disconnected_then_does_not_report_already_closed() {
    // GIVEN: A connection whose client hung up
    let listener = bind_listener().await;
    let (connection, _reader, client) = client_connection(&listener).await;
    drop(client);

    // WHEN: Disconnecting
    let first = connection.disconnect().await;
    let second = connection.disconnect().await;

    // THEN: The first call does the close (it may or may not see an I/O error)
    assert!(!matches!(first, Err(ConnectionError::AlreadyClosed { .. })));
    assert!(matches!(second, Err(ConnectionError::AlreadyClosed { .. })));
}

#[tokio::test]
async fn given_waiter_on_closed_when_disconnected_then_waiter_wakes() {
    let listener = bind_listener().await;
    let (connection, _reader, _client) = client_connection(&listener).await;

    let waiter = tokio::spawn({
        let connection = Arc::clone(&connection);
        async move { connection.closed().await }
    });

    connection.disconnect().await.unwrap();

    timeout(WAIT, waiter)
        .await
        .expect("closed() should resolve after disconnect")
        .unwrap();
}
