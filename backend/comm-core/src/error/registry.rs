use common::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum RegistryError {
    #[error("Duplicate Id Error: client {id} is already registered {location}")]
    DuplicateId { id: String, location: ErrorLocation },

    #[error("Registry Actor Error: {message} {location}")]
    ActorStopped {
        message: String,
        location: ErrorLocation,
    },
}
