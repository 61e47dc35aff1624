use crate::helpers::{
    WAIT, accept_pair, bind_listener, read_until_closed, start_test_server, wait_for_count,
};

use comm_core::client::{ClientExit, connect, run_client};
use comm_core::config::ClientConfig;
use comm_core::error::client::ClientError;

use tokio::io::BufReader;
use tokio::time::timeout;

/// **VALUE**: `SEND:hello` puts exactly `hello` on the wire.
///
/// **BUG THIS CATCHES**: Would catch the client appending a newline or sending the
/// whole input line including the command prefix.
#[tokio::test]
async fn given_send_line_when_client_runs_then_writes_exact_payload() {
    // GIVEN: A bare listener standing in for the server
    let listener = bind_listener().await;
    let (client, mut server_side, _) = accept_pair(&listener).await;

    // WHEN: The client processes one SEND line and then input ends
    let exit = run_client(client, &b"SEND:hello\n"[..]).await.unwrap();

    // THEN: The server side received exactly "hello"
    assert_eq!(exit, ClientExit::InputClosed);
    assert_eq!(read_until_closed(&mut server_side).await, b"hello");
}

/// **VALUE**: Malformed input never reaches the socket.
///
/// **BUG THIS CATCHES**: Would catch unknown commands being forwarded as payloads,
/// or a rejected line ending the session.
#[tokio::test]
async fn given_unknown_command_when_client_runs_then_nothing_is_written() {
    // GIVEN: A bare listener
    let listener = bind_listener().await;
    let (client, mut server_side, _) = accept_pair(&listener).await;

    // WHEN: The client sees a bad command, a line without colon, then a valid send
    let input = &b"FOO:bar\nno colon here\nSEND:ok\n"[..];
    let exit = run_client(client, input).await.unwrap();

    // THEN: Only the valid payload was written
    assert_eq!(exit, ClientExit::InputClosed);
    assert_eq!(read_until_closed(&mut server_side).await, b"ok");
}

#[tokio::test]
async fn given_only_rejected_input_when_client_runs_then_socket_stays_silent() {
    let listener = bind_listener().await;
    let (client, mut server_side, _) = accept_pair(&listener).await;

    let exit = run_client(client, &b"FOO:bar\n"[..]).await.unwrap();

    assert_eq!(exit, ClientExit::InputClosed);
    assert!(read_until_closed(&mut server_side).await.is_empty());
}

#[tokio::test]
async fn given_local_stop_when_client_runs_then_exits_before_later_lines() {
    let listener = bind_listener().await;
    let (client, mut server_side, _) = accept_pair(&listener).await;

    let exit = run_client(client, &b"SEND:x\nSTOP:\nSEND:y\n"[..])
        .await
        .unwrap();

    assert_eq!(exit, ClientExit::LocalStop);
    assert_eq!(read_until_closed(&mut server_side).await, b"x");
}

/// **VALUE**: The client ends its session when the server broadcasts `STOP`.
///
/// **WHY THIS MATTERS**: This is the end-to-end shutdown path: server coordinator,
/// connection disconnect, client session.
///
/// **BUG THIS CATCHES**: Would catch the client ignoring `STOP` or looping on the
/// closed socket after it.
#[tokio::test]
async fn given_running_server_when_shutdown_then_client_exits_with_server_stop() {
    // GIVEN: A server and a client whose input never ends
    let handle = start_test_server().await;
    let config = ClientConfig {
        host: String::from("127.0.0.1"),
        port: handle.local_addr().port(),
    };
    let stream = connect(&config).await.unwrap();
    let (input_writer, input_reader) = tokio::io::duplex(64);
    let session = tokio::spawn(run_client(stream, BufReader::new(input_reader)));
    assert!(wait_for_count(handle.registry(), 1).await);

    // WHEN: The server shuts down
    handle.shutdown().await.unwrap();

    // THEN: The client stops because of STOP
    let exit = timeout(WAIT, session).await.unwrap().unwrap().unwrap();
    assert_eq!(exit, ClientExit::ServerStop);
    drop(input_writer);
}

#[tokio::test]
async fn given_server_drops_socket_when_client_runs_then_exits_with_server_closed() {
    // GIVEN: A peer that hangs up without STOP
    let listener = bind_listener().await;
    let (client, server_side, _) = accept_pair(&listener).await;
    let (_input_writer, input_reader) = tokio::io::duplex(64);

    // WHEN: The server side closes
    drop(server_side);

    // THEN: The session ends without an error
    let exit = timeout(WAIT, run_client(client, BufReader::new(input_reader)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit, ClientExit::ServerClosed);
}

#[tokio::test]
async fn given_nothing_listening_when_connecting_then_connect_error() {
    // GIVEN: A port that was bound and released
    let port = {
        let listener = bind_listener().await;
        listener.local_addr().unwrap().port()
    };

    // WHEN: Connecting
    let result = connect(&ClientConfig {
        host: String::from("127.0.0.1"),
        port,
    })
    .await;

    // THEN: Connect error naming the address
    match result {
        Err(ClientError::Connect { address, .. }) => {
            assert_eq!(address, format!("127.0.0.1:{port}"))
        }
        other => panic!("Expected Connect error, got {other:?}"),
    }
}
