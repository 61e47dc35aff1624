use common::ErrorLocation;

use std::io::Error as IoError;
use std::panic::Location;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ConnectionError {
    #[error("Already Closed Error: connection {address} was already disconnected {location}")]
    AlreadyClosed {
        address: String,
        location: ErrorLocation,
    },

    #[error("IO Error: {message} {location}")]
    Io {
        message: String,
        location: ErrorLocation,
    },
}

impl From<IoError> for ConnectionError {
    #[track_caller]
    fn from(error: IoError) -> Self {
        ConnectionError::Io {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
