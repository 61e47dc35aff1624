//! Shared building blocks for tcpcomm.
//!
//! This crate holds the pieces both sides of the wire agree on, plus the
//! error location type every error enum in the workspace carries.
//!
//! ## Architecture
//!
//! - **common** (this crate): Wire constants and error plumbing
//! - **comm-core**: Server lifecycle and client session logic
//! - **tcpcomm**: Binaries wiring flags, logging and signals together

pub mod error_location;
pub mod protocol;

pub use error_location::ErrorLocation;
pub use protocol::{DEFAULT_HOST, DEFAULT_PORT, READ_BUFFER_SIZE, STOP_MESSAGE};
