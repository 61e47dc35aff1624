//! Shutdown coordination.
//!
//! The coordinator is spawned next to the accept loop when the server
//! starts and sleeps until the trigger token is cancelled. The trigger can
//! be fired administratively ([`ServerHandle::stop`](super::ServerHandle::stop)),
//! by an OS termination request ([`trigger_on_signal`]) or by the accept
//! loop giving up.
//!
//! On trigger it:
//!
//! 1. closes the listener and waits for the accept loop to exit, so no
//!    connection can register behind the broadcast
//! 2. disconnects and deregisters every client in a registry snapshot,
//!    carrying on past individual failures
//! 3. waits up to the grace period for connection handlers to finish
//! 4. reports completion on a oneshot channel

use crate::error::connection::ConnectionError;
use crate::error::server::AcceptError;
use crate::server::accept::AcceptOutcome;
use crate::server::registry::ConnectionRegistry;

use std::future::Future;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout as TokioTimeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// What the shutdown broadcast achieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Clients this coordinator sent `STOP` to and closed.
    pub disconnected: usize,
    /// Clients whose disconnect failed. They are deregistered regardless.
    pub failed: usize,
    /// Whether every connection handler finished within the grace period.
    pub handlers_drained: bool,
}

pub(crate) struct ShutdownCoordinator {
    pub(crate) trigger: CancellationToken,
    pub(crate) accept_task: JoinHandle<Result<AcceptOutcome, AcceptError>>,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) tracker: TaskTracker,
    pub(crate) grace: Duration,
    pub(crate) completion: oneshot::Sender<ShutdownReport>,
}

impl ShutdownCoordinator {
    pub(crate) async fn run(self) {
        self.trigger.cancelled().await;

        info!(
            "Received shutdown signal. Stopping {} clients & exit..",
            self.registry.count().await
        );

        match self.accept_task.await {
            Ok(Ok(outcome)) => debug!("Listener closed ({:?})", outcome),
            Ok(Err(e)) => warn!("Accept loop ended with error: {}", e),
            Err(e) => error!("Accept loop task failed: {}", e),
        }

        let mut report = broadcast_disconnect(&self.registry).await;

        self.tracker.close();
        report.handlers_drained = TokioTimeout(self.grace, self.tracker.wait())
            .await
            .is_ok();
        if !report.handlers_drained {
            warn!(
                "{} connection handlers still running after {:?}",
                self.tracker.len(),
                self.grace
            );
        }

        info!(
            "..done. Disconnected {} clients ({} failed). Exit",
            report.disconnected, report.failed
        );

        if self.completion.send(report).is_err() {
            debug!("Nobody is waiting for the shutdown report");
        }
    }
}

/// Disconnect and deregister every client currently registered.
///
/// A client that already disconnected (for example its handler saw EOF a
/// moment earlier) is neither a success nor a failure.
async fn broadcast_disconnect(registry: &ConnectionRegistry) -> ShutdownReport {
    let mut report = ShutdownReport::default();

    for connection in registry.snapshot().await {
        match connection.disconnect().await {
            Ok(()) => report.disconnected += 1,
            Err(ConnectionError::AlreadyClosed { .. }) => {
                debug!("Client {} already disconnected", connection.address());
            }
            Err(e) => {
                report.failed += 1;
                error!(
                    "Failed to disconnect client {}: `{}`",
                    connection.address(),
                    e
                );
            }
        }

        if let Err(e) = registry.remove(connection.id()).await {
            error!(
                "Failed to deregister client {}: {}",
                connection.address(),
                e
            );
        }
    }

    report
}

/// Cancel `trigger` on SIGINT (ctrl-c) or, on Unix, SIGTERM.
///
/// The returned task ends on its own once the trigger is cancelled by any
/// other path.
pub fn trigger_on_signal(trigger: CancellationToken) -> JoinHandle<()> {
    let shutdown_signal = termination_signal();

    tokio::spawn(async move {
        tokio::select! {
            _ = trigger.cancelled() => {}
            received = shutdown_signal => {
                info!("Received {}, triggering shutdown", received);
                trigger.cancel();
            }
        }
    })
}

fn termination_signal() -> impl Future<Output = &'static str> + Send {
    // Register SIGTERM now; one arriving before the first poll would
    // otherwise take the default action and kill the process.
    #[cfg(unix)]
    let terminate = {
        use tokio::signal::unix::{SignalKind, signal};

        let registration = signal(SignalKind::terminate());
        async move {
            match registration {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(e) => {
                    error!("Failed to listen for SIGTERM: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = ctrl_c => "SIGINT",
            _ = terminate => "SIGTERM",
        }
    }
}
