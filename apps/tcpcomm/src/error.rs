use comm_core::error::CoreError;
use comm_core::error::config::ConfigError;

use common::ErrorLocation;

use thiserror::Error;

/// Errors that end a tcpcomm binary with a non-zero status.
#[derive(Debug, Error)]
pub enum AppError {
    /// Logger could not be installed
    #[error("Logger Error: {message} {location}")]
    Logger {
        message: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Error from comm-core operations (listen, connect, session)
    #[error(transparent)]
    Core(#[from] CoreError),
}
