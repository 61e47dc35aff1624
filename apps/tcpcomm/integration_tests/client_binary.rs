use comm_core::config::ServerConfig;
use comm_core::server::{ServerHandle, start_server};

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};

// ============================================================================
// End-to-end tests for the tcpcomm-client binary against an in-process server
// ============================================================================

const WAIT: Duration = Duration::from_secs(10);

async fn start_test_server() -> ServerHandle {
    start_server(&ServerConfig {
        host: String::from("127.0.0.1"),
        port: 0,
        ..Default::default()
    })
    .await
    .expect("Failed to start test server")
}

fn spawn_client(port: u16) -> Child {
    Command::new(env!("CARGO_BIN_EXE_tcpcomm-client"))
        .args(["--server-host", "127.0.0.1", "--server-port"])
        .arg(port.to_string())
        .env_remove("TCPCOMM_LOG_DIR")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn tcpcomm-client")
}

async fn wait_for_clients(handle: &ServerHandle, expected: usize) {
    timeout(WAIT, async {
        while handle.registry().count().await != expected {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("Client did not register in time");
}

/// **VALUE**: Verifies the whole client program: stdin line → socket → server log,
/// then server `STOP` → client process exits 0.
///
/// **WHY THIS MATTERS**: The library tests cover each side separately; this is the
/// only test that exercises the real binary, its flag parsing and its exit path.
///
/// **BUG THIS CATCHES**: Would catch the client hanging after `STOP` (for example
/// the runtime waiting on the blocking stdin reader) or exiting non-zero.
#[tokio::test]
async fn given_client_binary_when_server_stops_then_client_exits_zero() {
    // GIVEN: A server and a client process connected to it
    let handle = start_test_server().await;
    let mut child = spawn_client(handle.local_addr().port());
    wait_for_clients(&handle, 1).await;

    // WHEN: The user sends a message
    let mut stdin = child.stdin.take().expect("piped stdin");
    stdin.write_all(b"SEND:hello\n").await.unwrap();
    stdin.flush().await.unwrap();

    // THEN: The server records exactly that payload
    let messages = timeout(WAIT, handle.messages().wait_for_len(1))
        .await
        .expect("Message should arrive");
    assert_eq!(messages, vec!["hello"]);

    // WHEN: The server shuts down (stdin stays open)
    handle.shutdown().await.unwrap();

    // THEN: The client exits successfully on STOP
    let status = timeout(WAIT, child.wait())
        .await
        .expect("Client should exit after STOP")
        .unwrap();
    assert!(status.success(), "Client exit status: {status}");
    drop(stdin);
}

#[tokio::test]
async fn given_client_binary_when_user_types_stop_then_exits_zero() {
    // GIVEN: A connected client process
    let handle = start_test_server().await;
    let mut child = spawn_client(handle.local_addr().port());
    wait_for_clients(&handle, 1).await;

    // WHEN: The user types a bad line and then STOP
    let mut stdin = child.stdin.take().expect("piped stdin");
    stdin.write_all(b"FOO:bar\nSTOP:\n").await.unwrap();
    stdin.flush().await.unwrap();

    // THEN: The client exits 0 and the server deregisters it without logging FOO
    let status = timeout(WAIT, child.wait()).await.unwrap().unwrap();
    assert!(status.success());
    wait_for_clients(&handle, 0).await;
    assert!(handle.messages().is_empty().await);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn given_no_server_when_client_binary_starts_then_exits_non_zero() {
    // GIVEN: A port nobody listens on
    let port = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    // WHEN: Starting the client against it
    let mut child = spawn_client(port);

    // THEN: It fails to connect and exits with an error status
    let status = timeout(WAIT, child.wait()).await.unwrap().unwrap();
    assert!(!status.success());
}
