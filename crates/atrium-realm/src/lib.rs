//! Realms for the Atrium content platform.
//!
//! A [`Realm`] groups the accounts of one login domain within a site. It
//! aggregates, per storage class, the schema of account properties
//! ([`AccountDataDef`]), owns the realm's secondary indexes
//! ([`AccountIndex`]), and orchestrates account creation and deletion
//! across storage classes with compensating cleanup on failure: a partially
//! created account is never left observable.
//!
//! # Key Types
//!
//! - [`Realm`] — Aggregation root and account lifecycle
//! - [`RealmKind`] — Secure (encrypted account payloads) vs insecure
//! - [`AccountIndex`] — Maps external reference strings to account ids
//! - [`AccountDataDef`] / [`AccountPropertyDef`] — Per-class property schema
//! - [`AccountData`] — One validated per-class account payload
//! - [`Account`] — Handle to a created or loaded account
//! - [`ValueType`] / [`TypeRegistry`] — Seams to the external
//!   type-validation service

pub mod account;
pub mod data;
pub mod error;
pub mod index;
pub mod realm;
pub mod schema;

pub use account::Account;
pub use data::AccountData;
pub use error::{RealmError, Result};
pub use index::AccountIndex;
pub use realm::{Realm, RealmConfig, RealmKind};
pub use schema::{AccountDataDef, AccountPropertyDef, TypeRegistry, ValueType};
