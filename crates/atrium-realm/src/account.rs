//! The account handle returned by realm lookups and creation.

use atrium_context::DataContext;
use atrium_store::{StoreMode, StoredFile};
use atrium_types::{AccountId, Properties, StorageClass};
use atrium_vault::VaultKey;

use crate::error::Result;

/// A created or loaded account.
///
/// The handle carries the account's naming context and, for secure realms,
/// its encryption key: file access through the handle is transparently
/// sealed with that key.
#[derive(Debug)]
pub struct Account {
    context: DataContext,
    id: AccountId,
    enabled: bool,
    key: Option<VaultKey>,
    properties: Properties,
}

impl Account {
    pub(crate) fn new(
        context: DataContext,
        id: AccountId,
        enabled: bool,
        key: Option<VaultKey>,
        properties: Properties,
    ) -> Self {
        Self {
            context,
            id,
            enabled,
            key,
            properties,
        }
    }

    /// The account id.
    pub fn id(&self) -> AccountId {
        self.id
    }

    /// `false` iff the id is in the realm's disabled overlay.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The account's properties, merged across storage classes.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// The account's encryption key, when the realm is secure.
    pub fn key(&self) -> Option<&VaultKey> {
        self.key.as_ref()
    }

    /// The naming context rooted at this account
    /// (`<site>/realms/<realm>/accounts/<id>/`).
    pub fn context(&self) -> &DataContext {
        &self.context
    }

    /// Retrieve a file relative to this account, using the account key.
    pub fn get_file(&self, class: StorageClass, path: &str) -> Result<StoredFile> {
        Ok(self.context.get_file(class, path, self.key.as_ref())?)
    }

    /// Store a file relative to this account, using the account key.
    pub fn store_file(
        &self,
        class: StorageClass,
        path: &str,
        data: &[u8],
        mode: StoreMode,
    ) -> Result<()> {
        Ok(self.context.store_file(class, path, data, mode, self.key.as_ref())?)
    }

    /// Delete a file relative to this account. The account key decides
    /// whether the sealed container path is targeted.
    pub fn delete_file(&self, class: StorageClass, path: &str) -> Result<()> {
        Ok(self.context.delete_file(class, path, self.key.is_some())?)
    }
}
