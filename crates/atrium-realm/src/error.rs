use thiserror::Error;

use atrium_context::ContextError;
use atrium_types::{AccountId, NameError, StorageClass};

/// Errors from realm configuration, schema validation, and the account
/// lifecycle.
#[derive(Debug, Error)]
pub enum RealmError {
    /// A name, id, or reference failed its grammar.
    #[error(transparent)]
    Name(#[from] NameError),

    /// A context-level failure: storage, sealing, or path translation.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The realm configuration is unusable.
    #[error("invalid realm configuration: {0}")]
    Config(String),

    /// The same property is declared in two storage classes.
    #[error("property {name:?} is defined in both the {first} and the {second} storage class")]
    DuplicateProperty {
        name: String,
        first: StorageClass,
        second: StorageClass,
    },

    /// A mandatory account property is missing.
    #[error("missing mandatory account property {name:?}")]
    MissingProperty { name: String },

    /// An account property value failed its type.
    #[error("invalid value for account property {name:?}: {reason}")]
    InvalidPropertyValue { name: String, reason: String },

    /// The named account index does not exist in this realm.
    #[error("no account index {name:?} in realm {realm:?}")]
    NoSuchIndex { realm: String, name: String },

    /// A reference is already bound to a different account.
    #[error("index {index:?}: reference {reference} is already bound to a different account")]
    ReferenceConflict { index: String, reference: String },

    /// A stored index entry does not hold a valid account id.
    #[error("index {index:?}: corrupt entry for reference {reference}: {reason}")]
    CorruptIndexEntry {
        index: String,
        reference: String,
        reason: String,
    },

    /// No account exists under the given id.
    #[error("no account {id}")]
    NoSuchAccount { id: AccountId },

    /// The realm is secure and the operation needs a key.
    #[error("realm {realm:?} is secure: an encryption key is required")]
    KeyRequired { realm: String },

    /// The realm is insecure and the operation must not get a key.
    #[error("realm {realm:?} is not secure: no encryption key may be supplied")]
    KeyNotAllowed { realm: String },

    /// Account creation failed; compensating cleanup has been attempted.
    #[error("failed to create account {id} in realm {realm:?}")]
    CreationFailed {
        realm: String,
        id: AccountId,
        #[source]
        cause: Box<RealmError>,
    },
}

/// Result alias for realm operations.
pub type Result<T> = std::result::Result<T, RealmError>;
