//! Secondary account indexes.
//!
//! An [`AccountIndex`] maps external reference strings to account ids, one
//! file per reference at `indexes/<indexName>/<reference>` in the index's
//! storage class. The file content is the 16-hex account id. Index entries
//! are created with a must-not-exist store, so a reference can never be
//! silently rebound to a different account.

use tracing::{debug, warn};

use atrium_context::DataContext;
use atrium_store::{StoreError, StoreMode};
use atrium_types::{AccountId, AccountRef, IndexName, StorageClass};

use crate::error::{RealmError, Result};

/// A named secondary index inside a realm.
pub struct AccountIndex {
    context: DataContext,
    class: StorageClass,
    name: IndexName,
}

impl AccountIndex {
    /// Bind an index to its realm context and storage class.
    pub(crate) fn new(context: DataContext, class: StorageClass, name: IndexName) -> Self {
        Self {
            context,
            class,
            name,
        }
    }

    /// The index name.
    pub fn name(&self) -> &IndexName {
        &self.name
    }

    /// The storage class holding this index's entries.
    pub fn storage_class(&self) -> StorageClass {
        self.class
    }

    fn entry_path(&self, reference: &AccountRef) -> String {
        format!("indexes/{}/{}", self.name, reference)
    }

    fn directory_path(&self) -> String {
        format!("indexes/{}", self.name)
    }

    /// Persist `reference → id`.
    ///
    /// Fails with [`RealmError::ReferenceConflict`] when the reference is
    /// already bound to a *different* account; re-storing the binding an
    /// account already owns is a no-op.
    pub fn store_ref(&self, reference: &AccountRef, id: AccountId) -> Result<()> {
        let path = self.context.translate(&self.entry_path(reference))?;
        let db = self.context.hub().database(self.class);

        match db.put(&path, id.to_hex().as_bytes(), StoreMode::MustNotExist) {
            Ok(()) => {
                debug!(index = %self.name, %reference, %id, "reference stored");
                Ok(())
            }
            Err(StoreError::AlreadyExists { .. }) => match self.lookup_account_id(reference)? {
                Some(existing) if existing == id => Ok(()),
                _ => Err(RealmError::ReferenceConflict {
                    index: self.name.to_string(),
                    reference: reference.to_string(),
                }),
            },
            Err(e) => Err(RealmError::from(atrium_context::ContextError::from(e))),
        }
    }

    /// Resolve a reference to its account id, or `None` when the reference
    /// is not stored.
    pub fn lookup_account_id(&self, reference: &AccountRef) -> Result<Option<AccountId>> {
        let path = self.context.translate(&self.entry_path(reference))?;
        let db = self.context.hub().database(self.class);

        let file = match db.get(&path) {
            Ok(file) => file,
            Err(StoreError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(RealmError::from(atrium_context::ContextError::from(e))),
        };

        let corrupt = |reason: String| RealmError::CorruptIndexEntry {
            index: self.name.to_string(),
            reference: reference.to_string(),
            reason,
        };
        let text = std::str::from_utf8(&file.data).map_err(|e| corrupt(e.to_string()))?;
        let id = AccountId::parse(text.trim()).map_err(|e| corrupt(e.to_string()))?;
        Ok(Some(id))
    }

    /// Remove a stored reference. A reference that is already gone is a
    /// no-op, so best-effort cleanup can retry safely.
    pub fn remove_ref(&self, reference: &AccountRef) -> Result<()> {
        let path = self.context.translate(&self.entry_path(reference))?;
        let db = self.context.hub().database(self.class);

        match db.delete(&path) {
            Ok(()) => {
                debug!(index = %self.name, %reference, "reference removed");
                Ok(())
            }
            Err(StoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(RealmError::from(atrium_context::ContextError::from(e))),
        }
    }

    /// Enumerate all stored references.
    ///
    /// Index sizes are bounded by the realm's account count, so a full scan
    /// is acceptable; entries whose names fail the reference grammar are
    /// skipped with a warning.
    pub fn refs(&self) -> Result<Vec<AccountRef>> {
        let names = self.context.list(self.class, &self.directory_path())?;
        let mut refs = Vec::with_capacity(names.len());
        for name in names {
            match AccountRef::parse(name.clone()) {
                Ok(reference) => refs.push(reference),
                Err(_) => {
                    warn!(index = %self.name, entry = %name, "skipping non-reference index entry");
                }
            }
        }
        Ok(refs)
    }

    /// Reverse lookup: all references currently resolving to `id`.
    pub fn refs_for_account(&self, id: AccountId) -> Result<Vec<AccountRef>> {
        let mut found = Vec::new();
        for reference in self.refs()? {
            if self.lookup_account_id(&reference)? == Some(id) {
                found.push(reference);
            }
        }
        Ok(found)
    }
}

impl std::fmt::Debug for AccountIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountIndex")
            .field("context", &self.context.to_string())
            .field("class", &self.class)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use atrium_context::Hub;
    use atrium_store::{ContentTypeMap, Database};
    use atrium_types::{RealmName, SiteName};
    use tempfile::TempDir;

    struct Fixture {
        index: AccountIndex,
        _dirs: Vec<TempDir>,
    }

    fn fixture() -> Fixture {
        let dirs: Vec<TempDir> = (0..4).map(|_| tempfile::tempdir().unwrap()).collect();
        let types = Arc::new(ContentTypeMap::standard());
        let content = Database::open(
            "content",
            dirs[0].path(),
            Some(dirs[1].path().to_path_buf()),
            Arc::clone(&types),
        )
        .unwrap();
        let statics = Database::open(
            "static",
            dirs[2].path(),
            Some(dirs[3].path().to_path_buf()),
            types,
        )
        .unwrap();
        let realm = DataContext::root(Arc::new(Hub::new(content, statics)))
            .site(SiteName::parse("demo").unwrap())
            .unwrap()
            .realm(RealmName::parse("MEMBERS").unwrap())
            .unwrap();
        Fixture {
            index: AccountIndex::new(
                realm,
                StorageClass::Content,
                IndexName::parse("combo").unwrap(),
            ),
            _dirs: dirs,
        }
    }

    fn reference(fill: u8) -> AccountRef {
        AccountRef::from_digest([fill; 20])
    }

    fn id(s: &str) -> AccountId {
        AccountId::parse(s).unwrap()
    }

    #[test]
    fn store_lookup_round_trip() {
        let fx = fixture();
        let r = reference(0x11);
        let a = id("0123456789abcdef");

        assert_eq!(fx.index.lookup_account_id(&r).unwrap(), None);
        fx.index.store_ref(&r, a).unwrap();
        assert_eq!(fx.index.lookup_account_id(&r).unwrap(), Some(a));

        // The wire-contract location of the entry.
        let stored = fx
            .index
            .context
            .hub()
            .database(StorageClass::Content)
            .get(&format!("demo/realms/MEMBERS/indexes/combo/{r}"))
            .unwrap();
        assert_eq!(stored.data, a.to_hex().as_bytes());
    }

    #[test]
    fn occupied_reference_rejects_other_account() {
        let fx = fixture();
        let r = reference(0x22);
        let first = id("0123456789abcdef");
        let second = id("fedcba9876543210");

        fx.index.store_ref(&r, first).unwrap();
        let err = fx.index.store_ref(&r, second).unwrap_err();
        assert!(matches!(err, RealmError::ReferenceConflict { .. }));
        // The first binding is intact.
        assert_eq!(fx.index.lookup_account_id(&r).unwrap(), Some(first));

        // Re-claiming by the owner is a no-op.
        fx.index.store_ref(&r, first).unwrap();
    }

    #[test]
    fn remove_ref_tolerates_absence() {
        let fx = fixture();
        let r = reference(0x33);

        fx.index.remove_ref(&r).unwrap();
        fx.index.store_ref(&r, id("0123456789abcdef")).unwrap();
        fx.index.remove_ref(&r).unwrap();
        fx.index.remove_ref(&r).unwrap();
        assert_eq!(fx.index.lookup_account_id(&r).unwrap(), None);
    }

    #[test]
    fn refs_and_reverse_lookup() {
        let fx = fixture();
        let a = id("0123456789abcdef");
        let b = id("fedcba9876543210");

        fx.index.store_ref(&reference(0x01), a).unwrap();
        fx.index.store_ref(&reference(0x02), b).unwrap();
        fx.index.store_ref(&reference(0x03), a).unwrap();

        assert_eq!(fx.index.refs().unwrap().len(), 3);
        let for_a = fx.index.refs_for_account(a).unwrap();
        assert_eq!(for_a.len(), 2);
        assert!(for_a.contains(&reference(0x01)));
        assert!(for_a.contains(&reference(0x03)));
    }

    #[test]
    fn empty_index_lists_nothing() {
        let fx = fixture();
        assert!(fx.index.refs().unwrap().is_empty());
        assert!(fx.index.refs_for_account(id("0123456789abcdef")).unwrap().is_empty());
    }
}
