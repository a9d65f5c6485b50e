use thiserror::Error;

/// Errors from sealing and opening vault containers.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Authentication failed: wrong key or tampered container.
    ///
    /// Kept distinct from [`VaultError::Malformed`] so callers can tell a
    /// bad credential apart from a corrupt file.
    #[error("decryption failed: wrong key or tampered container")]
    WrongKey,

    /// The container is not a well-formed sealed file.
    #[error("malformed sealed container: {0}")]
    Malformed(String),

    /// The key material is unusable.
    #[error("invalid vault key: {0}")]
    InvalidKey(String),

    /// The cipher itself failed while sealing.
    #[error("encryption failed: {0}")]
    Crypto(String),
}

impl From<atrium_types::xml::XmlError> for VaultError {
    fn from(e: atrium_types::xml::XmlError) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Result alias for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
