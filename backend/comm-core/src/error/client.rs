use common::ErrorLocation;

use std::io::Error as IoError;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ClientError {
    #[error("Connect Error: {address}: {source} {location}")]
    Connect {
        address: String,
        location: ErrorLocation,
        #[source]
        source: IoError,
    },

    #[error("Read Error: {message} {location}")]
    Read {
        message: String,
        location: ErrorLocation,
    },

    #[error("Write Error: {message} {location}")]
    Write {
        message: String,
        location: ErrorLocation,
    },
}

/// A rejected line of client input. Rejection never touches the socket.
#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum CommandError {
    #[error("Command Syntax Error: expected `COMMAND:payload`, got `{input}` {location}")]
    Syntax {
        input: String,
        location: ErrorLocation,
    },

    #[error("Unknown Command Error: `{command}` (available: `STOP:`, `SEND:payload`) {location}")]
    UnknownCommand {
        command: String,
        location: ErrorLocation,
    },
}
