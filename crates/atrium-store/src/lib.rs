//! Overlay file storage for the Atrium content platform.
//!
//! A [`Database`] combines a read-only base root with a writable overlay
//! root. Reads prefer the overlay and fall back to the base, writes always
//! target the overlay, and the two roots may coincide, in which case the
//! database degenerates to plain read-write storage. This lets a deployment
//! ship an immutable factory-default tree while created and modified content
//! accumulates in a separate writable tree.
//!
//! # Key Types
//!
//! - [`Database`] — One storage area: get/put/delete/list over the two roots
//! - [`StoreMode`] — Create/overwrite policy for [`Database::put`]
//! - [`StoredFile`] — A retrieved payload with its name, MIME type, and mtime
//! - [`ContentTypeMap`] — File extension to MIME type table
//!
//! All operations are synchronous and block on local filesystem I/O; writes
//! use a temp-file-then-rename discipline so a concurrent reader never
//! observes a partially written file.

pub mod content_type;
pub mod database;
pub mod error;
pub mod mode;

pub use content_type::{ContentTypeMap, FALLBACK_CONTENT_TYPE};
pub use database::{Database, StoredFile};
pub use error::{Result, StoreError};
pub use mode::StoreMode;
