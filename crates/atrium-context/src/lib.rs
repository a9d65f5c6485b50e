//! Naming contexts for the Atrium content platform.
//!
//! A [`DataContext`] is a node in the naming hierarchy — hub, site, realm,
//! or account — able to translate paths relative to itself into paths
//! relative to a storage root, and to read, store, and delete files through
//! that translation. The [`Hub`] terminates the chain and binds each
//! [`StorageClass`](atrium_types::StorageClass) to its
//! [`Database`](atrium_store::Database).
//!
//! The hierarchy is flattened: a context is the hub plus a segment chain,
//! and translation is one iterative walk that prepends each segment's
//! namespace prefix. Contexts are immutable values; child contexts share
//! the parent's chain.
//!
//! When a [`VaultKey`](atrium_vault::VaultKey) is supplied, file access is
//! transparently sealed: payloads are stored as vault containers at the
//! logical path plus [`SEALED_SUFFIX`](atrium_vault::SEALED_SUFFIX), and
//! decrypted on the way out. The storage layer never learns about
//! encryption.

pub mod context;
pub mod error;
pub mod hub;

pub use context::{DataContext, Segment};
pub use error::{ContextError, Result};
pub use hub::Hub;
