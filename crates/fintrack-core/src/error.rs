use thiserror::Error;

use crate::models::Dataset;

/// Errors surfaced by the store and the sync coordinator.
///
/// Remote failures never show up here: they are absorbed by the
/// coordinator as `RemoteError`s and logged.
#[derive(Error, Debug)]
pub enum FinanceError {
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    #[error("Failed to write {dataset} to local storage")]
    LocalWriteFailure {
        dataset: Dataset,
        #[source]
        source: anyhow::Error,
    },

    #[error("Malformed import: {0}")]
    MalformedImport(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FinanceError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        FinanceError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        FinanceError::InvalidInput(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        FinanceError::MalformedImport(message.into())
    }
}

pub type Result<T> = std::result::Result<T, FinanceError>;
