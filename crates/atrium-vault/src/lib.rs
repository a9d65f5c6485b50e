//! Encryption at rest for the Atrium content platform.
//!
//! A [`SealedFile`] wraps a single payload under a symmetric [`VaultKey`]
//! using AES-256-GCM, together with the minimum metadata (name, content
//! type, creation time) needed to reconstruct a data source after
//! decryption. The serialized container is self-describing XML, so a sealed
//! file on disk can always be recognized and inspected without the key.
//!
//! The encryption is authenticated: opening a container with the wrong key,
//! or opening a tampered container, fails with [`VaultError::WrongKey`] and
//! never yields garbage plaintext. The container metadata is bound into the
//! authentication, so it cannot be swapped either.
//!
//! By convention, callers store the sealed container for a logical path `P`
//! at `P` + [`SEALED_SUFFIX`]; the storage layer itself stays
//! encryption-agnostic.

pub mod container;
pub mod error;
pub mod key;

pub use container::{FileSource, SealedFile, SEALED_SUFFIX};
pub use error::{Result, VaultError};
pub use key::VaultKey;
