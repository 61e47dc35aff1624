use crate::helpers::{
    WAIT, connect_client, read_until_closed, start_test_server, test_config, wait_for_count,
};

use comm_core::config::ServerConfig;
use comm_core::error::server::ServerError;
use comm_core::server::start_server;

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

// ============================================================================
// Message Log Tests
// ============================================================================

/// **VALUE**: Verifies that payloads from several concurrent clients all land in the log.
///
/// **WHY THIS MATTERS**: Handlers append from their own tasks. If the log were not
/// synchronized, concurrent appends could be lost.
///
/// **BUG THIS CATCHES**: Would catch handlers sharing an unsynchronized buffer, or a
/// handler that stops after registering and never reads.
#[tokio::test]
async fn given_three_clients_when_each_sends_ping_then_log_contains_all_three() {
    // GIVEN: A running server and three connected sockets
    let handle = start_test_server().await;
    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(connect_client(&handle).await);
    }
    assert!(wait_for_count(handle.registry(), 3).await);

    // WHEN: Each socket writes one distinct payload
    for (i, client) in clients.iter_mut().enumerate() {
        client
            .write_all(format!("ping-{}", i + 1).as_bytes())
            .await
            .unwrap();
    }

    // THEN: All three payloads are in the log (cross-connection order is unspecified)
    let mut messages = timeout(WAIT, handle.messages().wait_for_len(3))
        .await
        .expect("Messages should arrive");
    messages.sort();
    assert_eq!(messages, vec!["ping-1", "ping-2", "ping-3"]);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn given_one_client_when_sending_several_messages_then_log_keeps_their_order() {
    // GIVEN: One connected socket
    let handle = start_test_server().await;
    let mut client = connect_client(&handle).await;

    // WHEN: It sends three messages, each after the previous one was logged
    // (waiting keeps the transport from coalescing them into one read)
    for (i, payload) in ["first", "second", "third"].iter().enumerate() {
        client.write_all(payload.as_bytes()).await.unwrap();
        timeout(WAIT, handle.messages().wait_for_len(i + 1))
            .await
            .expect("Message should arrive");
    }

    // THEN: They appear in receive order
    assert_eq!(
        handle.messages().snapshot().await,
        vec!["first", "second", "third"]
    );

    handle.shutdown().await.unwrap();
}

/// **VALUE**: Payloads larger than the read buffer are delivered in pieces.
///
/// **BUG THIS CATCHES**: Would catch bytes being dropped when a read fills the
/// buffer, since there is no framing to reassemble them.
#[tokio::test]
async fn given_payload_larger_than_buffer_when_sent_then_pieces_concatenate_to_payload() {
    // GIVEN: A server reading 8 bytes at a time
    let handle = start_server(&ServerConfig {
        read_buffer_size: 8,
        ..test_config()
    })
    .await
    .unwrap();
    let mut client = connect_client(&handle).await;
    let payload = "abcdefghijklmnopqrstuvwxyz";

    // WHEN: Sending a 26 byte payload
    client.write_all(payload.as_bytes()).await.unwrap();

    // THEN: The log holds several messages that join back into the payload
    let joined = timeout(WAIT, async {
        loop {
            let joined = handle.messages().snapshot().await.concat();
            if joined.len() >= payload.len() {
                return joined;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Payload should arrive");

    assert_eq!(joined, payload);
    let messages = handle.messages().snapshot().await;
    assert!(messages.len() >= 4, "26 bytes need at least 4 reads of 8");
    assert!(messages.iter().all(|m| m.len() <= 8));

    handle.shutdown().await.unwrap();
}

// ============================================================================
// Connection Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn given_connected_client_when_it_hangs_up_then_handler_deregisters_it() {
    // GIVEN: One connected client
    let handle = start_test_server().await;
    let client = connect_client(&handle).await;
    assert!(wait_for_count(handle.registry(), 1).await);

    // WHEN: The client closes its socket
    drop(client);

    // THEN: Its handler sees EOF and removes it
    assert!(
        wait_for_count(handle.registry(), 0).await,
        "Registry should be empty after client EOF"
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn given_client_hung_up_when_checked_then_server_sent_stop_before_closing() {
    // GIVEN: A connected client
    let handle = start_test_server().await;
    let mut client = connect_client(&handle).await;
    assert!(wait_for_count(handle.registry(), 1).await);

    // WHEN: The client half-closes (sends EOF but keeps reading)
    client.shutdown().await.unwrap();

    // THEN: The handler disconnects it with STOP and the registry drains
    assert_eq!(read_until_closed(&mut client).await, b"STOP");
    assert!(wait_for_count(handle.registry(), 0).await);

    handle.shutdown().await.unwrap();
}

// ============================================================================
// Shutdown Tests
// ============================================================================

/// **VALUE**: Verifies the full shutdown broadcast.
///
/// **WHY THIS MATTERS**: This is the contract clients rely on: every connected
/// client hears `STOP`, sees its connection close, and nothing is left registered.
///
/// **BUG THIS CATCHES**: Would catch the coordinator iterating a live map while
/// handlers remove from it, stopping at the first client, or leaving entries behind.
#[tokio::test]
async fn given_two_clients_when_shutdown_triggered_then_both_get_stop_and_registry_empties() {
    // GIVEN: Two connected sockets
    let handle = start_test_server().await;
    let mut first = connect_client(&handle).await;
    let mut second = connect_client(&handle).await;
    assert!(wait_for_count(handle.registry(), 2).await);
    let registry = handle.registry().clone();

    // WHEN: Shutdown is triggered
    let report = timeout(WAIT, handle.shutdown())
        .await
        .expect("Shutdown should complete within the grace period")
        .expect("Shutdown should report");

    // THEN: Both sockets received STOP and were closed
    assert_eq!(read_until_closed(&mut first).await, b"STOP");
    assert_eq!(read_until_closed(&mut second).await, b"STOP");

    // AND: The registry is empty right after completion
    assert_eq!(registry.count().await, 0);
    assert_eq!(report.disconnected, 2);
    assert_eq!(report.failed, 0);
    assert!(report.handlers_drained);
}

#[tokio::test]
async fn given_shutdown_complete_when_connecting_then_connection_refused() {
    // GIVEN: A server that has been shut down
    let handle = start_test_server().await;
    let address = handle.local_addr();
    handle.shutdown().await.unwrap();

    // WHEN: A new client tries to connect
    let result = TcpStream::connect(address).await;

    // THEN: The listener is gone
    assert!(result.is_err(), "Listener should no longer accept");
}

#[tokio::test]
async fn given_no_clients_when_shutdown_then_completes_with_empty_report() {
    let handle = start_test_server().await;

    let report = timeout(WAIT, handle.shutdown()).await.unwrap().unwrap();

    assert_eq!(report.disconnected, 0);
    assert_eq!(report.failed, 0);
    assert!(report.handlers_drained);
}

#[tokio::test]
async fn given_trigger_token_when_cancelled_then_server_completes() {
    // GIVEN: A running server with one client
    let handle = start_test_server().await;
    let mut client = connect_client(&handle).await;
    assert!(wait_for_count(handle.registry(), 1).await);

    // WHEN: The trigger is cancelled from outside (as the signal task does)
    handle.trigger().cancel();

    // THEN: wait() returns the report and the client was stopped
    let report = timeout(WAIT, handle.wait()).await.unwrap().unwrap();
    assert_eq!(report.disconnected, 1);
    assert_eq!(read_until_closed(&mut client).await, b"STOP");
}

// ============================================================================
// Startup Error Tests
// ============================================================================

#[tokio::test]
async fn given_port_in_use_when_starting_then_listen_error() {
    // GIVEN: A port that is already bound
    let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = occupied.local_addr().unwrap().port();

    // WHEN: Starting a server on it
    let result = start_server(&ServerConfig {
        port,
        ..test_config()
    })
    .await;

    // THEN: Startup aborts with a listen error
    assert!(
        matches!(result, Err(ServerError::Listen { .. })),
        "Expected Listen error"
    );
}

#[tokio::test]
async fn given_invalid_config_when_starting_then_config_error() {
    let result = start_server(&ServerConfig {
        read_buffer_size: 0,
        ..test_config()
    })
    .await;

    assert!(matches!(result, Err(ServerError::Config(_))));
}
