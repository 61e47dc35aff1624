//! Wire-level constants shared by the server and the client.
//!
//! The transport is a raw TCP byte stream with no framing: every successful
//! read is treated as one message. A payload larger than [`READ_BUFFER_SIZE`]
//! may therefore be observed as several messages.

/// Control payload the server writes right before closing a connection.
pub const STOP_MESSAGE: &str = "STOP";

/// Bytes requested per read on either side of the connection.
pub const READ_BUFFER_SIZE: usize = 1024;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 3333;
