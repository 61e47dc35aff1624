//! Connection registry using the actor pattern.
//!
//! The registry is mutated from three places: the accept loop (register),
//! each connection handler (remove on its own termination) and the shutdown
//! coordinator (remove during broadcast).
//!
//! # Architecture
//!
//! - Mutations are sent as [`RegistryCommand`]s over an mpsc channel
//! - A dedicated task applies them one at a time and replies on a oneshot
//! - Reads go straight to the shared `Arc<RwLock<_>>`, which only the actor writes
//!
//! A mutation call returns only after the actor applied it, so `count()` and
//! `snapshot()` observed afterwards already reflect it.

use crate::error::registry::RegistryError;
use crate::server::connection::ClientConnection;

use common::ErrorLocation;

use std::collections::HashMap;
use std::panic::Location;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{RwLock, mpsc, oneshot};

const REGISTRY_CHANNEL_CAPACITY: usize = 100;

type Clients = Arc<RwLock<HashMap<String, Arc<ClientConnection>>>>;

/// Commands that mutate the registry.
#[derive(Debug)]
enum RegistryCommand {
    Register {
        connection: Arc<ClientConnection>,
        reply: oneshot::Sender<Result<(), RegistryError>>,
    },
    Remove {
        id: String,
        reply: oneshot::Sender<bool>,
    },
}

/// Live mapping from client id to open connection.
///
/// This type is `Clone`; all clones share the same underlying map and actor.
#[derive(Clone)]
pub struct ConnectionRegistry {
    command_tx: mpsc::Sender<RegistryCommand>,
    clients: Clients,
}

impl ConnectionRegistry {
    /// Create a registry and spawn its actor.
    ///
    /// Must be called from within a Tokio runtime. The actor stops once
    /// every clone of the registry has been dropped.
    pub fn new() -> Self {
        let (command_tx, command_rx) = mpsc::channel(REGISTRY_CHANNEL_CAPACITY);
        let clients: Clients = Arc::new(RwLock::new(HashMap::new()));

        tokio::spawn(registry_actor(command_rx, Arc::clone(&clients)));

        Self {
            command_tx,
            clients,
        }
    }

    /// Register a connection under its id.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DuplicateId`] if a connection with the same id is live
    /// - [`RegistryError::ActorStopped`] if the registry actor is gone
    pub async fn register(&self, connection: Arc<ClientConnection>) -> Result<(), RegistryError> {
        let (reply, response) = oneshot::channel();
        self.send(RegistryCommand::Register { connection, reply })
            .await?;

        response.await.map_err(|e| RegistryError::ActorStopped {
            message: format!("Registry actor dropped reply: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?
    }

    /// Remove a connection by id.
    ///
    /// Removing an id that is not present is a no-op. Returns whether an
    /// entry was actually removed.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ActorStopped`] if the registry actor is gone.
    pub async fn remove(&self, id: &str) -> Result<bool, RegistryError> {
        let (reply, response) = oneshot::channel();
        self.send(RegistryCommand::Remove {
            id: id.to_string(),
            reply,
        })
        .await?;

        response.await.map_err(|e| RegistryError::ActorStopped {
            message: format!("Registry actor dropped reply: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })
    }

    /// Point-in-time copy of every registered connection.
    pub async fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.clients.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.clients.read().await.contains_key(id)
    }

    async fn send(&self, cmd: RegistryCommand) -> Result<(), RegistryError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|e| RegistryError::ActorStopped {
                message: format!("Registry actor died: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The registry actor task.
///
/// Owns all writes to the map and processes commands sequentially until
/// every sender has been dropped.
async fn registry_actor(mut command_rx: mpsc::Receiver<RegistryCommand>, clients: Clients) {
    debug!("Registry actor started");

    while let Some(cmd) = command_rx.recv().await {
        match cmd {
            RegistryCommand::Register { connection, reply } => {
                let mut clients_write = clients.write().await;
                let id = connection.id().to_string();

                let result = if clients_write.contains_key(&id) {
                    warn!(
                        "Client {} ({}) is already registered",
                        id,
                        connection.address()
                    );
                    Err(RegistryError::DuplicateId {
                        id,
                        location: ErrorLocation::from(Location::caller()),
                    })
                } else {
                    clients_write.insert(id, connection);
                    Ok(())
                };
                drop(clients_write);

                let _ = reply.send(result);
            }
            RegistryCommand::Remove { id, reply } => {
                let removed = clients.write().await.remove(&id).is_some();
                if removed {
                    debug!("Removed client {}", id);
                }

                let _ = reply.send(removed);
            }
        }
    }

    info!("Registry actor stopped");
}
