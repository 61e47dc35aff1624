use crate::error::config::ConfigError;

use common::ErrorLocation;

use std::io::Error as IoError;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ServerError {
    #[error("Listen Error: {address}: {source} {location}")]
    Listen {
        address: String,
        location: ErrorLocation,
        #[source]
        source: IoError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Shutdown Error: {message} {location}")]
    Shutdown {
        message: String,
        location: ErrorLocation,
    },
}

#[derive(Debug, ThisError)]
pub enum AcceptError {
    #[error("Accept Retries Exhausted Error: {attempts} consecutive failures, last: {source} {location}")]
    RetriesExhausted {
        attempts: u32,
        location: ErrorLocation,
        #[source]
        source: IoError,
    },
}
