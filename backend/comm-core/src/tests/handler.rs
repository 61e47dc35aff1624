// Unit tests for the per-connection read loop

use crate::server::{
    ClientConnection, ConnectionHandler, ConnectionRegistry, HandlerState, MessageLog,
};

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct Fixture {
    handler: ConnectionHandler,
    connection: Arc<ClientConnection>,
    registry: ConnectionRegistry,
    messages: MessageLog,
    client: TcpStream,
}

async fn registered_handler(read_buffer_size: usize) -> Fixture {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap())
        .await
        .unwrap();
    let (server_side, peer) = listener.accept().await.unwrap();
    let (reader, writer) = server_side.into_split();

    let connection = Arc::new(ClientConnection::new(peer, writer));
    let registry = ConnectionRegistry::new();
    let messages = MessageLog::new();
    registry.register(Arc::clone(&connection)).await.unwrap();

    let handler = ConnectionHandler::new(
        Arc::clone(&connection),
        reader,
        registry.clone(),
        messages.clone(),
        read_buffer_size,
    );

    Fixture {
        handler,
        connection,
        registry,
        messages,
        client,
    }
}

/// **VALUE**: EOF takes the handler through Disconnecting to Closed.
///
/// **BUG THIS CATCHES**: Would catch the handler returning on EOF without
/// deregistering, which leaves a dead entry the coordinator later trips over.
#[tokio::test]
async fn given_client_eof_when_handler_runs_then_closes_and_deregisters() {
    // GIVEN: A registered connection whose client sends one message and hangs up
    let mut fixture = registered_handler(1024).await;
    fixture.client.write_all(b"bye").await.unwrap();
    fixture.client.shutdown().await.unwrap();

    // WHEN: The handler runs
    let state = timeout(WAIT, fixture.handler.run()).await.unwrap();

    // THEN: It ends Closed, logged the message, sent STOP and deregistered
    assert_eq!(state, HandlerState::Closed);
    assert_eq!(fixture.messages.snapshot().await, vec!["bye"]);
    assert!(fixture.connection.is_closed());
    assert_eq!(fixture.registry.count().await, 0);

    let mut received = Vec::new();
    fixture.client.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, b"STOP");
}

#[tokio::test]
async fn given_connection_disconnected_elsewhere_when_handler_runs_then_closes() {
    // GIVEN: A connection the coordinator already disconnected
    let fixture = registered_handler(1024).await;
    fixture.connection.disconnect().await.unwrap();

    // WHEN: The handler runs while the client stays silent
    let state = timeout(WAIT, fixture.handler.run())
        .await
        .expect("Handler must not block on read after disconnect");

    // THEN: It still reaches Closed and removes the entry
    assert_eq!(state, HandlerState::Closed);
    assert_eq!(fixture.registry.count().await, 0);
    drop(fixture.client);
}

#[tokio::test]
async fn given_small_buffer_when_payload_exceeds_it_then_payload_is_split() {
    // GIVEN: A 4 byte read buffer
    let mut fixture = registered_handler(4).await;

    // WHEN: Ten bytes arrive before EOF
    fixture.client.write_all(b"0123456789").await.unwrap();
    fixture.client.shutdown().await.unwrap();
    timeout(WAIT, fixture.handler.run()).await.unwrap();

    // THEN: No piece exceeds the buffer and nothing is lost
    let messages = fixture.messages.snapshot().await;
    assert!(messages.iter().all(|m| m.len() <= 4));
    assert_eq!(messages.concat(), "0123456789");
}
