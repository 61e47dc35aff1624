//! Accept loop.
//!
//! Each accepted socket is fingerprinted, split, registered and handed to
//! its own [`ConnectionHandler`] task. Accept failures fall in two groups:
//!
//! - terminal: the listener itself is closed or invalid; the loop exits
//! - transient: everything else; logged and retried with exponential
//!   backoff, bounded by `retry_max_elapsed` of consecutive failures
//!
//! Cancelling the trigger token stops the loop and drops (closes) the
//! listener.
//!
//! The loop is generic over [`Acceptor`] so accept failures can be scripted
//! in tests; the server itself runs it over a bound [`TcpListener`].

use crate::error::server::AcceptError;
use crate::server::connection::ClientConnection;
use crate::server::handler::ConnectionHandler;
use crate::server::message_log::MessageLog;
use crate::server::registry::ConnectionRegistry;

use common::ErrorLocation;

use std::future::Future;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::net::SocketAddr;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep as TokioSleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

const RETRY_INITIAL_INTERVAL: Duration = Duration::from_millis(10);
const RETRY_MAX_INTERVAL: Duration = Duration::from_secs(1);

#[cfg(unix)]
const EBADF: i32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// The trigger fired and the listener was closed.
    Cancelled,
    /// The listener reported it can no longer accept.
    ListenerClosed,
}

/// Source of incoming connections for the accept loop.
pub(crate) trait Acceptor: Send + 'static {
    fn accept(&mut self) -> impl Future<Output = IoResult<(TcpStream, SocketAddr)>> + Send;
}

impl Acceptor for TcpListener {
    fn accept(&mut self) -> impl Future<Output = IoResult<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

/// Everything a newly accepted connection needs.
#[derive(Clone)]
pub(crate) struct AcceptContext {
    pub(crate) registry: ConnectionRegistry,
    pub(crate) messages: MessageLog,
    pub(crate) tracker: TaskTracker,
    pub(crate) read_buffer_size: usize,
    pub(crate) retry_max_elapsed: Duration,
}

/// Accept until the trigger fires or the listener dies.
///
/// Exhausting the transient retry budget cancels `trigger` so that the
/// shutdown coordinator still cleans up every registered client.
pub(crate) async fn run_accept_loop<A: Acceptor>(
    listener: A,
    context: AcceptContext,
    trigger: CancellationToken,
) -> Result<AcceptOutcome, AcceptError> {
    let result = accept_loop(listener, &context, &trigger).await;

    match &result {
        Ok(outcome) => info!("Accept loop stopped: {:?}", outcome),
        Err(e) => {
            error!("Accept loop gave up, triggering shutdown: {}", e);
            trigger.cancel();
        }
    }

    result
}

async fn accept_loop<A: Acceptor>(
    mut listener: A,
    context: &AcceptContext,
    trigger: &CancellationToken,
) -> Result<AcceptOutcome, AcceptError> {
    let mut backoff = retry_backoff(context.retry_max_elapsed);
    let mut failures: u32 = 0;

    loop {
        let accepted = tokio::select! {
            biased;

            _ = trigger.cancelled() => return Ok(AcceptOutcome::Cancelled),
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                failures = 0;
                admit(stream, addr, context).await;
            }
            Err(e) if is_listener_closed(&e) => {
                warn!("Listener closed: {}", e);
                return Ok(AcceptOutcome::ListenerClosed);
            }
            Err(e) => {
                if failures == 0 {
                    backoff.reset();
                }
                failures += 1;

                let Some(delay) = backoff.next_backoff() else {
                    return Err(AcceptError::RetriesExhausted {
                        attempts: failures,
                        location: ErrorLocation::from(Location::caller()),
                        source: e,
                    });
                };

                warn!(
                    "Failed to accept incoming connection (attempt {}): {}; retrying after {:?}",
                    failures, e, delay
                );

                tokio::select! {
                    _ = trigger.cancelled() => return Ok(AcceptOutcome::Cancelled),
                    _ = TokioSleep(delay) => {}
                }
            }
        }
    }
}

/// Register the connection and spawn its handler.
///
/// A duplicate id is reported and the new socket is closed; the already
/// registered connection is left untouched.
async fn admit(stream: TcpStream, addr: SocketAddr, context: &AcceptContext) {
    let (reader, writer) = stream.into_split();
    let connection = Arc::new(ClientConnection::new(addr, writer));

    if let Err(e) = context.registry.register(Arc::clone(&connection)).await {
        warn!("Rejecting connection from {}: {}", addr, e);
        if let Err(e) = connection.disconnect().await {
            debug!("Closing rejected connection {} failed: {}", addr, e);
        }
        return;
    }

    info!(
        "Incoming connection: {}, clients connected: {}",
        addr,
        context.registry.count().await
    );

    let handler = ConnectionHandler::new(
        connection,
        reader,
        context.registry.clone(),
        context.messages.clone(),
        context.read_buffer_size,
    );
    context.tracker.spawn(handler.run());
}

pub(crate) fn retry_backoff(max_elapsed: Duration) -> ExponentialBackoff {
    ExponentialBackoff {
        current_interval: RETRY_INITIAL_INTERVAL,
        initial_interval: RETRY_INITIAL_INTERVAL,
        max_interval: RETRY_MAX_INTERVAL,
        max_elapsed_time: Some(max_elapsed),
        ..Default::default()
    }
}

/// Whether an accept error means the listener can never accept again.
pub(crate) fn is_listener_closed(error: &IoError) -> bool {
    if matches!(
        error.kind(),
        ErrorKind::NotConnected | ErrorKind::InvalidInput
    ) {
        return true;
    }

    #[cfg(unix)]
    if error.raw_os_error() == Some(EBADF) {
        return true;
    }

    false
}
