use thiserror::Error;

use atrium_store::StoreError;
use atrium_types::NameError;
use atrium_vault::VaultError;

/// Errors from context operations: a union of the validation, storage, and
/// vault error domains, plus chain-construction misuse.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A name or path failed validation (before any I/O).
    #[error(transparent)]
    Name(#[from] NameError),

    /// The storage layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Sealing or opening an encrypted payload failed.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// A child context was requested from the wrong parent kind.
    #[error("invalid context chain: {0}")]
    InvalidChain(String),
}

impl ContextError {
    /// `true` iff this error means "the file does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound { .. }))
    }

    /// `true` iff this error means "creation required a free path".
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Store(StoreError::AlreadyExists { .. }))
    }
}

/// Result alias for context operations.
pub type Result<T> = std::result::Result<T, ContextError>;
