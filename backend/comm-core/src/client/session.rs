use crate::client::command::ClientCommand;
use crate::config::ClientConfig;
use crate::error::client::ClientError;

use common::{ErrorLocation, READ_BUFFER_SIZE, STOP_MESSAGE};

use std::panic::Location;

use log::{debug, info, warn};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Why a client session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// The server sent `STOP`.
    ServerStop,
    /// The server closed the connection without `STOP`.
    ServerClosed,
    /// The user entered `STOP:`.
    LocalStop,
    /// The input reached EOF.
    InputClosed,
}

/// Connect to the server described by `config`.
///
/// # Errors
///
/// Returns [`ClientError::Connect`] if the server cannot be reached.
pub async fn connect(config: &ClientConfig) -> Result<TcpStream, ClientError> {
    let address = config.address();
    let stream = TcpStream::connect(&address)
        .await
        .map_err(|source| ClientError::Connect {
            address: address.clone(),
            location: ErrorLocation::from(Location::caller()),
            source,
        })?;

    info!("Client successfully connected to server {}", address);
    Ok(stream)
}

/// Run a client session until the server or the user ends it.
///
/// Input lines are parsed as [`ClientCommand`]s. Malformed lines are logged
/// and skipped without touching the socket. Every server read is one
/// message; a message equal to `STOP` ends the session.
///
/// # Errors
///
/// - [`ClientError::Read`] if reading the socket or the input fails
/// - [`ClientError::Write`] if sending a payload fails
pub async fn run_client<R>(stream: TcpStream, input: R) -> Result<ClientExit, ClientError>
where
    R: AsyncBufRead + Unpin,
{
    let server = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| String::from("server"));
    let (mut reader, mut writer) = stream.into_split();
    let mut lines = input.lines();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    info!("Server {} closed the connection; stopping client..", server);
                    return Ok(ClientExit::ServerClosed);
                }
                Ok(n) => {
                    let message = String::from_utf8_lossy(&buf[..n]);
                    debug!("Received message from server: `{}`", message);

                    if message == STOP_MESSAGE {
                        info!("STOP signal received from server; stopping client..");
                        return Ok(ClientExit::ServerStop);
                    }
                }
                Err(e) => {
                    return Err(ClientError::Read {
                        message: format!("Failed to read server message: {e}"),
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(exit) = handle_input_line(&line, &mut writer, &server).await? {
                        return Ok(exit);
                    }
                }
                Ok(None) => {
                    info!("Input closed; stopping client..");
                    return Ok(ClientExit::InputClosed);
                }
                Err(e) => {
                    return Err(ClientError::Read {
                        message: format!("Failed to read input: {e}"),
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
            },
        }
    }
}

async fn handle_input_line<W>(
    line: &str,
    writer: &mut W,
    server: &str,
) -> Result<Option<ClientExit>, ClientError>
where
    W: AsyncWrite + Unpin,
{
    match ClientCommand::parse(line) {
        Ok(ClientCommand::Stop) => {
            info!("STOP command received; stopping client..");
            Ok(Some(ClientExit::LocalStop))
        }
        Ok(ClientCommand::Send(payload)) => {
            writer
                .write_all(payload.as_bytes())
                .await
                .map_err(|e| ClientError::Write {
                    message: format!("Failed to send `{payload}` to {server}: {e}"),
                    location: ErrorLocation::from(Location::caller()),
                })?;
            debug!("Sent message `{}` to `{}`", payload, server);
            Ok(None)
        }
        Err(e) => {
            warn!("Rejected input line: {}", e);
            Ok(None)
        }
    }
}
