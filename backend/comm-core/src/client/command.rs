use crate::error::client::CommandError;

use common::ErrorLocation;

use std::panic::Location;
use std::str::FromStr;

const STOP_COMMAND: &str = "STOP";
const SEND_COMMAND: &str = "SEND";

/// One parsed line of client input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// `STOP:` ends the client locally. The payload is ignored.
    Stop,
    /// `SEND:payload` writes the payload to the socket verbatim.
    Send(String),
}

impl ClientCommand {
    /// Parse `COMMAND:PAYLOAD`, splitting at the first colon.
    ///
    /// Commands are case-sensitive. The payload is kept as-is, including any
    /// further colons and surrounding whitespace.
    ///
    /// # Errors
    ///
    /// - [`CommandError::Syntax`] if the line has no colon
    /// - [`CommandError::UnknownCommand`] if the command is not `STOP` or `SEND`
    #[track_caller]
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let Some((command, payload)) = line.split_once(':') else {
            return Err(CommandError::Syntax {
                input: line.to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        };

        match command {
            STOP_COMMAND => Ok(ClientCommand::Stop),
            SEND_COMMAND => Ok(ClientCommand::Send(payload.to_string())),
            other => Err(CommandError::UnknownCommand {
                command: other.to_string(),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }
}

impl FromStr for ClientCommand {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        ClientCommand::parse(line)
    }
}
