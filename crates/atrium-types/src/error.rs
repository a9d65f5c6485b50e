use thiserror::Error;

/// Errors raised when a name, identifier, or path fails its grammar.
///
/// These are always caller errors, detected before any storage I/O.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    /// The site name is invalid.
    #[error("invalid site name {name:?}: {reason}")]
    InvalidSiteName { name: String, reason: String },

    /// The realm name is invalid.
    #[error("invalid realm name {name:?}: {reason}")]
    InvalidRealmName { name: String, reason: String },

    /// The account index name is invalid.
    #[error("invalid account index name {name:?}: {reason}")]
    InvalidIndexName { name: String, reason: String },

    /// The account identifier is invalid.
    #[error("invalid account id {value:?}: {reason}")]
    InvalidAccountId { value: String, reason: String },

    /// The account reference string is invalid.
    #[error("invalid account reference {value:?}: {reason}")]
    InvalidReference { value: String, reason: String },

    /// The relative path is invalid.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
}

/// Convenience alias for name validation results.
pub type Result<T> = std::result::Result<T, NameError>;
