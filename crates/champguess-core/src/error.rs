// Error type shared by the ledger, round engine and trade broker.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every failure a game operation can report back to the command layer.
///
/// None of these are fatal: the event loop turns each one into a reply for
/// the user who triggered it.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not enough {resource}: need {needed}, have {available}")]
    InsufficientResource {
        resource: Resource,
        needed: u64,
        available: u64,
    },

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("already in progress: {0}")]
    AlreadyInProgress(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// A countable thing a player can run short of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    BlueEssence,
    OrangeEssence,
    Chests,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Resource::BlueEssence => "blue essence",
            Resource::OrangeEssence => "orange essence",
            Resource::Chests => "chests",
        };
        f.write_str(label)
    }
}

/// Flat discriminant of [`GameError`], serialized into outbound replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    InsufficientResource,
    PreconditionFailed,
    AlreadyInProgress,
    Unavailable,
    Unauthorized,
    Storage,
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::NotFound(_) => ErrorKind::NotFound,
            GameError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            GameError::InsufficientResource { .. } => ErrorKind::InsufficientResource,
            GameError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            GameError::AlreadyInProgress(_) => ErrorKind::AlreadyInProgress,
            GameError::Unavailable(_) => ErrorKind::Unavailable,
            GameError::Unauthorized(_) => ErrorKind::Unauthorized,
            GameError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Wrap a persistence-layer failure, keeping the full cause chain in the
    /// message.
    pub fn storage(err: impl fmt::Display) -> Self {
        GameError::Storage(format!("{err:#}"))
    }

    pub(crate) fn insufficient(resource: Resource, needed: u64, available: u64) -> Self {
        GameError::InsufficientResource {
            resource,
            needed,
            available,
        }
    }
}

impl From<anyhow::Error> for GameError {
    fn from(err: anyhow::Error) -> Self {
        GameError::storage(err)
    }
}
