//! Client side of tcpcomm.
//!
//! A client session reads `COMMAND:PAYLOAD` lines from its input and watches
//! the socket for the server's `STOP` at the same time.

mod command;
mod session;

pub use command::ClientCommand;
pub use session::{ClientExit, connect, run_client};
