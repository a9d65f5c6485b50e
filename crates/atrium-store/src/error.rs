use thiserror::Error;

/// Errors from database operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The file is absent from both roots.
    #[error("file not found: {path}")]
    NotFound { path: String },

    /// Creation required the path to be free, but it is occupied.
    #[error("file already exists: {path}")]
    AlreadyExists { path: String },

    /// The file (or its directory) exists but cannot be accessed.
    #[error("access denied: {path}")]
    AccessDenied {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A write was attempted on a database with no write root.
    #[error("database {label:?} is read-only")]
    ReadOnly { label: String },

    /// The path is unusable at the storage layer (absolute, empty, or
    /// traversing parent directories).
    #[error("unusable storage path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// No free name was found within the retry budget.
    #[error("no unique name found for {path:?} after {attempts} attempts")]
    UniqueNamesExhausted { path: String, attempts: u32 },

    /// Any other I/O failure.
    #[error("I/O error on {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Classify an I/O error for a path, mapping the well-known kinds to
    /// their typed variants.
    pub(crate) fn from_io(path: &str, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound {
                path: path.to_string(),
            },
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists {
                path: path.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => Self::AccessDenied {
                path: path.to_string(),
                source,
            },
            _ => Self::Io {
                path: path.to_string(),
                source,
            },
        }
    }
}

/// Result alias for database operations.
pub type Result<T> = std::result::Result<T, StoreError>;
