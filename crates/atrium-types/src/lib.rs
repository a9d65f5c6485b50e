//! Foundation types for the Atrium content platform.
//!
//! This crate provides the storage-class tags, validated name and identifier
//! types, property maps, and the minimal XML support used throughout the
//! Atrium storage core. Every other Atrium crate depends on `atrium-types`.
//!
//! # Key Types
//!
//! - [`StorageClass`] — Closed tag identifying a storage area (content vs static)
//! - [`AccountId`] — 16-hex-digit account identifier
//! - [`AccountRef`] — 40-hex-digit external reference string
//! - [`SiteName`], [`RealmName`], [`IndexName`] — Grammar-validated names
//! - [`Properties`] — Ordered string-to-string property map
//! - [`xml::Element`] — Minimal XML tree for the fixed document shapes the
//!   platform persists

pub mod account;
pub mod error;
pub mod names;
pub mod properties;
pub mod reference;
pub mod storage;
pub mod xml;

pub use account::AccountId;
pub use error::NameError;
pub use names::{
    validate_dir_path, validate_file_path, validate_index_name, validate_path,
    validate_realm_name, validate_site_name, IndexName, RealmName, SiteName,
};
pub use properties::Properties;
pub use reference::AccountRef;
pub use storage::StorageClass;
