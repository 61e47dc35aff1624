//! Test helpers for comm-core integration tests.
//!
//! - Starting a server on an ephemeral port
//! - Building connected socket pairs without a server
//! - Polling the registry and sockets with a deadline

use comm_core::config::ServerConfig;
use comm_core::server::{ClientConnection, ConnectionRegistry, ServerHandle, start_server};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: String::from("127.0.0.1"),
        port: 0,
        shutdown_grace_ms: 2_000,
        ..Default::default()
    }
}

/// Test helper: Start a server on `127.0.0.1:0`.
pub async fn start_test_server() -> ServerHandle {
    start_server(&test_config())
        .await
        .expect("Failed to start test server")
}

/// Test helper: Connect a raw client socket to a running server.
pub async fn connect_client(handle: &ServerHandle) -> TcpStream {
    TcpStream::connect(handle.local_addr())
        .await
        .expect("Failed to connect to test server")
}

/// Test helper: Bind a bare listener for tests that run without a server.
pub async fn bind_listener() -> TcpListener {
    TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener")
}

/// Test helper: Connect to `listener` and accept, returning both ends.
pub async fn accept_pair(listener: &TcpListener) -> (TcpStream, TcpStream, SocketAddr) {
    let address = listener.local_addr().expect("listener address");
    let client = TcpStream::connect(address).await.expect("connect");
    let (server_side, peer) = listener.accept().await.expect("accept");
    (client, server_side, peer)
}

/// Test helper: Build a [`ClientConnection`] over a real socket.
///
/// Returns the connection, the server-side read half (keep it alive or the
/// socket closes early) and the client end.
pub async fn client_connection(
    listener: &TcpListener,
) -> (Arc<ClientConnection>, OwnedReadHalf, TcpStream) {
    let (client, server_side, peer) = accept_pair(listener).await;
    let (reader, writer) = server_side.into_split();
    (Arc::new(ClientConnection::new(peer, writer)), reader, client)
}

/// Test helper: Poll until the registry holds exactly `expected` entries.
pub async fn wait_for_count(registry: &ConnectionRegistry, expected: usize) -> bool {
    timeout(WAIT, async {
        while registry.count().await != expected {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

/// Test helper: Read until the peer closes, returning everything received.
pub async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
    let mut received = Vec::new();
    timeout(WAIT, stream.read_to_end(&mut received))
        .await
        .expect("Peer did not close the connection in time")
        .expect("Read failed");
    received
}
