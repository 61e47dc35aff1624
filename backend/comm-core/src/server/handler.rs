//! Per-connection read loop.
//!
//! The handler moves through `Reading → Disconnecting → Closed`:
//!
//! - `Reading`: each successful read of `n > 0` bytes is one message and is
//!   appended to the [`MessageLog`]. The buffer is fixed at
//!   `read_buffer_size` bytes and there is no framing, so a larger payload
//!   shows up as several messages.
//! - `Disconnecting`: entered on EOF, on a read error (never retried) or when
//!   the connection was disconnected by someone else. The connection is
//!   disconnected and removed from the registry, both idempotently.
//! - `Closed`: terminal; the read half is dropped with the handler.

use crate::error::connection::ConnectionError;
use crate::server::connection::ClientConnection;
use crate::server::message_log::MessageLog;
use crate::server::registry::ConnectionRegistry;

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Reading,
    Disconnecting,
    Closed,
}

pub(crate) struct ConnectionHandler {
    connection: Arc<ClientConnection>,
    reader: OwnedReadHalf,
    registry: ConnectionRegistry,
    messages: MessageLog,
    read_buffer_size: usize,
}

impl ConnectionHandler {
    pub(crate) fn new(
        connection: Arc<ClientConnection>,
        reader: OwnedReadHalf,
        registry: ConnectionRegistry,
        messages: MessageLog,
        read_buffer_size: usize,
    ) -> Self {
        Self {
            connection,
            reader,
            registry,
            messages,
            read_buffer_size,
        }
    }

    /// Run the read loop to completion and return the terminal state.
    pub(crate) async fn run(mut self) -> HandlerState {
        let mut buf = vec![0u8; self.read_buffer_size];
        let mut state = HandlerState::Reading;

        while state == HandlerState::Reading {
            state = self.read_once(&mut buf).await;
        }

        self.disconnect().await
    }

    async fn read_once(&mut self, buf: &mut [u8]) -> HandlerState {
        let address = self.connection.address();

        tokio::select! {
            biased;

            _ = self.connection.closed() => {
                debug!("Connection {} closed by server, stopping read loop", address);
                HandlerState::Disconnecting
            }
            result = self.reader.read(buf) => match result {
                Ok(0) => {
                    debug!("EOF, disconnecting client {}..", address);
                    HandlerState::Disconnecting
                }
                Ok(n) => {
                    let message = String::from_utf8_lossy(&buf[..n]).into_owned();
                    debug!("[{}] received client message: `{}`", address, message);
                    let total = self.messages.append(message).await;
                    debug!("[{}] message log size: {}", address, total);
                    HandlerState::Reading
                }
                Err(e) => {
                    error!("Failed to read input message from {}: {}", address, e);
                    HandlerState::Disconnecting
                }
            }
        }
    }

    async fn disconnect(self) -> HandlerState {
        let address = self.connection.address();

        match self.connection.disconnect().await {
            Ok(()) => {}
            Err(ConnectionError::AlreadyClosed { .. }) => {
                debug!("Client {} was already disconnected", address);
            }
            Err(e) => warn!("Failed to disconnect client {}: {}", address, e),
        }

        match self.registry.remove(self.connection.id()).await {
            Ok(_) => info!(
                "..done, client {} gone, clients connected: {}",
                address,
                self.registry.count().await
            ),
            Err(e) => error!("Failed to deregister client {}: {}", address, e),
        }

        HandlerState::Closed
    }
}
