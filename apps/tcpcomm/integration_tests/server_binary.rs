use std::net::SocketAddr;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStderr, Command};
use tokio::time::timeout;

// ============================================================================
// End-to-end tests for the tcpcomm-server binary driven by OS signals
// ============================================================================

const WAIT: Duration = Duration::from_secs(10);

const READY_MARKER: &str = "accepting connections on ";
const ADMITTED_MARKER: &str = "Incoming connection:";

fn spawn_server() -> Child {
    Command::new(env!("CARGO_BIN_EXE_tcpcomm-server"))
        .args(["--host", "127.0.0.1", "--port", "0"])
        .env_remove("TCPCOMM_HOST")
        .env_remove("TCPCOMM_PORT")
        .env_remove("TCPCOMM_CONFIG")
        .env_remove("TCPCOMM_LOG_DIR")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn tcpcomm-server")
}

/// Test helper: Read the server log until a line contains `marker`.
async fn wait_for_log(lines: &mut Lines<BufReader<ChildStderr>>, marker: &str) -> String {
    timeout(WAIT, async {
        while let Some(line) = lines.next_line().await.expect("Failed to read server log") {
            if line.contains(marker) {
                return line;
            }
        }
        panic!("Server exited before logging `{marker}`");
    })
    .await
    .unwrap_or_else(|_| panic!("Server did not log `{marker}` in time"))
}

fn listening_address(ready_line: &str) -> SocketAddr {
    ready_line
        .split(READY_MARKER)
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|address| address.parse().ok())
        .unwrap_or_else(|| panic!("No address in `{ready_line}`"))
}

/// **VALUE**: Verifies the server program's OS stop path: SIGTERM → `STOP` to
/// every client → report → exit 0.
///
/// **WHY THIS MATTERS**: Service managers stop the server with SIGTERM; the
/// library tests only ever fire the trigger directly.
///
/// **BUG THIS CATCHES**: Would catch the signal listener not being installed
/// (the process dies from the signal instead), clients being dropped without
/// `STOP`, or a non-zero exit after a clean shutdown.
#[tokio::test]
async fn given_server_binary_when_sigterm_then_client_stopped_and_exit_zero() {
    // GIVEN: A running server with one registered client
    let mut server = spawn_server();
    let stderr = server.stderr.take().expect("piped stderr");
    let mut lines = BufReader::new(stderr).lines();

    let address = listening_address(&wait_for_log(&mut lines, READY_MARKER).await);
    let mut client = TcpStream::connect(address)
        .await
        .expect("Failed to connect to tcpcomm-server");
    wait_for_log(&mut lines, ADMITTED_MARKER).await;

    // Keep draining so the server never blocks on a full stderr pipe
    let drain = tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

    // WHEN: The OS asks the server to stop
    let pid = server.id().expect("running server has a pid");
    let kill = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()
        .await
        .expect("Failed to run kill");
    assert!(kill.success());

    // THEN: The client receives STOP followed by EOF
    let mut received = Vec::new();
    timeout(WAIT, client.read_to_end(&mut received))
        .await
        .expect("Server did not close the client in time")
        .expect("Read failed");
    assert_eq!(received, b"STOP");

    // AND: The server exits successfully
    let status = timeout(WAIT, server.wait())
        .await
        .expect("Server did not exit in time")
        .expect("Failed to wait on server");
    assert!(status.success(), "server exited with {status:?}");

    drain.await.unwrap();
}
