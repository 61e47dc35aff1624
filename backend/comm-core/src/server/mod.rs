//! TCP server connection lifecycle.
//!
//! This module implements the server side of tcpcomm. It provides:
//!
//! - [`ConnectionRegistry`]: live clients keyed by [`fingerprint`]
//! - [`ClientConnection`]: one socket and its `STOP`-then-close behaviour
//! - [`MessageLog`]: every payload received, in per-connection order
//! - the accept loop and one read loop per connection
//! - the shutdown coordinator that disconnects everyone and closes the listener
//!
//! # Lifecycle
//!
//! [`start_server`] binds the listener, then spawns the accept loop and the
//! shutdown coordinator side by side. The returned [`ServerHandle`] fires
//! the shutdown trigger and waits for the coordinator's [`ShutdownReport`].

mod accept;
mod connection;
mod fingerprint;
mod handle;
mod handler;
mod message_log;
mod registry;
mod shutdown;

pub use accept::AcceptOutcome;
pub use connection::ClientConnection;
pub use fingerprint::fingerprint;
pub use handle::ServerHandle;
pub use handler::HandlerState;
pub use message_log::MessageLog;
pub use registry::ConnectionRegistry;
pub use shutdown::{ShutdownReport, trigger_on_signal};

pub(crate) use accept::{AcceptContext, Acceptor, run_accept_loop};

#[cfg(test)]
pub(crate) use accept::{is_listener_closed, retry_backoff};
#[cfg(test)]
pub(crate) use handler::ConnectionHandler;

use crate::config::ServerConfig;
use crate::error::server::ServerError;
use shutdown::ShutdownCoordinator;

use common::ErrorLocation;

use std::net::SocketAddr;
use std::panic::Location;

use log::{error, info};
use tokio::net::TcpListener;
use tokio::spawn as TokioSpawn;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Start the server described by `config`.
///
/// Binds `host:port`, then spawns the accept loop and the shutdown
/// coordinator. Returns as soon as the listener is bound.
///
/// # Errors
///
/// - [`ServerError::Config`] if the config does not validate
/// - [`ServerError::Listen`] if the address cannot be bound (in use, no
///   permission, unresolvable host)
pub async fn start_server(config: &ServerConfig) -> Result<ServerHandle, ServerError> {
    config.validate()?;

    let address = config.address();
    let listener = TcpListener::bind(&address).await.map_err(|source| {
        error!("{}: unable to start listener: `{}`", address, source);
        ServerError::Listen {
            address: address.clone(),
            location: ErrorLocation::from(Location::caller()),
            source,
        }
    })?;

    let local_addr = listener
        .local_addr()
        .map_err(|source| ServerError::Listen {
            address: address.clone(),
            location: ErrorLocation::from(Location::caller()),
            source,
        })?;

    info!("Server listening on {}", local_addr);

    Ok(serve(listener, local_addr, config))
}

/// Spawn the accept loop over `acceptor` and the shutdown coordinator.
pub(crate) fn serve<A: Acceptor>(
    acceptor: A,
    local_addr: SocketAddr,
    config: &ServerConfig,
) -> ServerHandle {
    let registry = ConnectionRegistry::new();
    let messages = MessageLog::new();
    let trigger = CancellationToken::new();
    let tracker = TaskTracker::new();
    let (completion_tx, completion_rx) = oneshot::channel();

    let context = AcceptContext {
        registry: registry.clone(),
        messages: messages.clone(),
        tracker: tracker.clone(),
        read_buffer_size: config.read_buffer_size,
        retry_max_elapsed: config.accept_retry_max_elapsed(),
    };
    let accept_task = TokioSpawn(run_accept_loop(acceptor, context, trigger.clone()));

    let coordinator = ShutdownCoordinator {
        trigger: trigger.clone(),
        accept_task,
        registry: registry.clone(),
        tracker,
        grace: config.shutdown_grace(),
        completion: completion_tx,
    };
    TokioSpawn(coordinator.run());

    ServerHandle {
        local_addr,
        registry,
        messages,
        trigger,
        completion: completion_rx,
    }
}
