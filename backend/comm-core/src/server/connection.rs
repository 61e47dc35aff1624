//! A single accepted client socket.
//!
//! The socket is split on accept: the [`ConnectionHandler`](super::handler)
//! owns the read half, while the write half lives here so that both the
//! handler and the shutdown coordinator can disconnect the client.

use crate::error::connection::ConnectionError;
use crate::server::fingerprint::fingerprint;

use common::{ErrorLocation, STOP_MESSAGE};

use std::net::SocketAddr;
use std::panic::Location;

use log::{debug, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A connected client.
///
/// `disconnect()` may be called any number of times from any task; exactly
/// one call performs the close and every later call reports
/// [`ConnectionError::AlreadyClosed`].
#[derive(Debug)]
pub struct ClientConnection {
    id: String,
    address: String,
    writer: Mutex<Option<OwnedWriteHalf>>,
    closed: CancellationToken,
}

impl ClientConnection {
    pub fn new(address: SocketAddr, writer: OwnedWriteHalf) -> Self {
        let address = address.to_string();
        Self {
            id: fingerprint(&address),
            address,
            writer: Mutex::new(Some(writer)),
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Send `STOP` and close the write side of the socket.
    ///
    /// The `STOP` write is best effort: a peer that already went away only
    /// produces a warning. After this returns, [`closed`](Self::closed)
    /// resolves and the connection's handler stops reading.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::AlreadyClosed`] if the connection was disconnected before
    /// - [`ConnectionError::Io`] if shutting down the socket fails
    pub async fn disconnect(&self) -> Result<(), ConnectionError> {
        let writer = self.writer.lock().await.take();

        let Some(mut writer) = writer else {
            return Err(ConnectionError::AlreadyClosed {
                address: self.address.clone(),
                location: ErrorLocation::from(Location::caller()),
            });
        };

        if let Err(e) = writer.write_all(STOP_MESSAGE.as_bytes()).await {
            warn!("Failed to send {} to {}: {}", STOP_MESSAGE, self.address, e);
        }

        let result = writer.shutdown().await;
        drop(writer);
        self.closed.cancel();

        debug!("Connection {} closed", self.address);
        result.map_err(ConnectionError::from)
    }

    /// Resolves once the connection has been disconnected.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
