use thiserror::Error;

use crate::session::ConversationId;

/// Failure of the generation backend.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// Backend unreachable, timed out, or returned a body we could not decode.
    #[error("generation request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("generation backend returned {status}: {body}")]
    Http {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Failure of the key-value persistence store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not read '{key}': {reason}")]
    Read { key: String, reason: String },

    #[error("could not write '{key}': {reason}")]
    Write { key: String, reason: String },
}

impl StorageError {
    pub fn read(key: &str, reason: impl ToString) -> Self {
        StorageError::Read {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn write(key: &str, reason: impl ToString) -> Self {
        StorageError::Write {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Outcome of a session or send operation that did not go through.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("conversation {0} is still waiting for a response")]
    Busy(ConversationId),

    #[error("conversation {0} not found")]
    NotFound(ConversationId),

    #[error(transparent)]
    Generation(#[from] GenerateError),
}
