//! Handle to a running server.

use crate::error::server::ServerError;
use crate::server::message_log::MessageLog;
use crate::server::registry::ConnectionRegistry;
use crate::server::shutdown::ShutdownReport;

use common::ErrorLocation;

use std::net::SocketAddr;
use std::panic::Location;

use log::info;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Handle returned by [`start_server`](crate::server::start_server).
///
/// Dropping the handle does **not** stop the server; call [`stop`](Self::stop)
/// or cancel the [`trigger`](Self::trigger) token.
///
/// # Examples
///
/// ```no_run
/// use comm_core::config::ServerConfig;
/// use comm_core::server::start_server;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let handle = start_server(&ServerConfig::default()).await?;
///     handle.stop();
///     let report = handle.wait().await?;
///     println!("disconnected {} clients", report.disconnected);
///     Ok(())
/// }
/// ```
pub struct ServerHandle {
    pub(crate) local_addr: SocketAddr,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) messages: MessageLog,
    pub(crate) trigger: CancellationToken,
    pub(crate) completion: oneshot::Receiver<ShutdownReport>,
}

impl ServerHandle {
    /// Address the listener is bound to (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn messages(&self) -> &MessageLog {
        &self.messages
    }

    /// The shutdown trigger. Cancelling it is equivalent to [`stop`](Self::stop).
    pub fn trigger(&self) -> CancellationToken {
        self.trigger.clone()
    }

    /// Administrative stop: fire the shutdown trigger.
    pub fn stop(&self) {
        info!("Stop requested for server on {}", self.local_addr);
        self.trigger.cancel();
    }

    /// Wait until the shutdown coordinator has finished.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Shutdown`] if the coordinator ended without
    /// reporting (it panicked or the runtime is shutting down).
    pub async fn wait(self) -> Result<ShutdownReport, ServerError> {
        self.completion.await.map_err(|e| ServerError::Shutdown {
            message: format!("Shutdown coordinator exited without a report: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
    }

    /// [`stop`](Self::stop) followed by [`wait`](Self::wait).
    pub async fn shutdown(self) -> Result<ShutdownReport, ServerError> {
        self.stop();
        self.wait().await
    }
}
