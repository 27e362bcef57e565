//! Error kinds surfaced by the secret lifecycle operations.

use thiserror::Error;

/// Errors returned by [`Vault`](crate::store::Vault) operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Input rejected before storage was touched.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Absent, already viewed, or expired. The three causes are not
    /// distinguished so a caller learns nothing about an id's history.
    #[error("secret not found")]
    NotFound,

    /// The record store could not complete the operation.
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl VaultError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Convenience result alias for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
