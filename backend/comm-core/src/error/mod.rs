pub mod client;
pub mod config;
pub mod connection;
pub mod registry;
pub mod server;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Server(#[from] server::ServerError),

    #[error(transparent)]
    Client(#[from] client::ClientError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
