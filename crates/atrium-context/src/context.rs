use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use atrium_store::{StoreMode, StoredFile};
use atrium_types::names::{validate_file_path, validate_path};
use atrium_types::xml::Element;
use atrium_types::{AccountId, RealmName, SiteName, StorageClass};
use atrium_vault::{FileSource, SealedFile, VaultError, VaultKey, SEALED_SUFFIX};

use crate::error::{ContextError, Result};
use crate::hub::Hub;

/// One level of the naming hierarchy below the hub.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// A site, directly under the hub.
    Site(SiteName),
    /// A realm within a site.
    Realm(RealmName),
    /// An account within a realm.
    Account(AccountId),
}

impl Segment {
    /// The namespace prefix this segment contributes to translated paths.
    fn push_prefix(&self, out: &mut String) {
        match self {
            Self::Site(name) => {
                out.push_str(name.as_str());
                out.push('/');
            }
            Self::Realm(name) => {
                out.push_str("realms/");
                out.push_str(name.as_str());
                out.push('/');
            }
            Self::Account(id) => {
                out.push_str("accounts/");
                out.push_str(&id.to_hex());
                out.push('/');
            }
        }
    }
}

/// A node in the naming hierarchy, able to resolve paths relative to
/// itself and to access files through that resolution.
///
/// A context is an immutable value: the hub plus the segment chain from the
/// hub down to this node. Child contexts extend the chain; the chain order
/// is root-to-leaf.
#[derive(Clone, Debug)]
pub struct DataContext {
    hub: Arc<Hub>,
    segments: Vec<Segment>,
}

impl DataContext {
    /// The root context: translation is the identity.
    pub fn root(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            segments: Vec::new(),
        }
    }

    /// Derive the context for a site. Only valid on the root context.
    pub fn site(&self, name: SiteName) -> Result<Self> {
        match self.segments.last() {
            None => Ok(self.child(Segment::Site(name))),
            Some(_) => Err(ContextError::InvalidChain(format!(
                "a site belongs directly under the hub, not under {self}"
            ))),
        }
    }

    /// Derive the context for a realm. Only valid on a site context.
    pub fn realm(&self, name: RealmName) -> Result<Self> {
        match self.segments.last() {
            Some(Segment::Site(_)) => Ok(self.child(Segment::Realm(name))),
            _ => Err(ContextError::InvalidChain(format!(
                "a realm belongs under a site, not under {self}"
            ))),
        }
    }

    /// Derive the context for an account. Only valid on a realm context.
    pub fn account(&self, id: AccountId) -> Result<Self> {
        match self.segments.last() {
            Some(Segment::Realm(_)) => Ok(self.child(Segment::Account(id))),
            _ => Err(ContextError::InvalidChain(format!(
                "an account belongs under a realm, not under {self}"
            ))),
        }
    }

    fn child(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self {
            hub: Arc::clone(&self.hub),
            segments,
        }
    }

    /// The hub this context resolves against.
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// The segment chain, root-to-leaf.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Translate a path relative to this context into a path relative to
    /// the storage roots. Pure composition; no I/O.
    ///
    /// The path must match the generic path grammar; a violation is a
    /// caller error raised here, before any storage access.
    pub fn translate(&self, path: &str) -> Result<String> {
        validate_path(path)?;
        let mut full = String::new();
        for segment in &self.segments {
            segment.push_prefix(&mut full);
        }
        full.push_str(path);
        Ok(full)
    }

    /// Retrieve a file relative to this context.
    ///
    /// With a key, the sealed container at `path + ".Ciphered.xml"` is
    /// fetched and opened; the returned file carries the name, content
    /// type, and timestamp recorded in the container.
    pub fn get_file(
        &self,
        class: StorageClass,
        path: &str,
        key: Option<&VaultKey>,
    ) -> Result<StoredFile> {
        validate_file_path(path)?;
        let translated = self.translate(path)?;
        let db = self.hub.database(class);

        match key {
            None => Ok(db.get(&translated)?),
            Some(key) => {
                let container = db.get(&sealed_path(&translated))?;
                let text = std::str::from_utf8(&container.data)
                    .map_err(|e| VaultError::Malformed(format!("container is not UTF-8: {e}")))?;
                let source = SealedFile::parse(text)?.open(key)?;
                debug!(%class, path, "opened sealed file");
                Ok(stored_from_source(source))
            }
        }
    }

    /// Retrieve a file and parse it as XML.
    pub fn get_xml_file(
        &self,
        class: StorageClass,
        path: &str,
        key: Option<&VaultKey>,
    ) -> Result<Element> {
        let file = self.get_file(class, path, key)?;
        let text = std::str::from_utf8(&file.data)
            .map_err(|e| VaultError::Malformed(format!("file is not UTF-8: {e}")))?;
        Ok(Element::parse(text).map_err(VaultError::from)?)
    }

    /// Store a file relative to this context, subject to `mode`.
    ///
    /// With a key, the payload is sealed and written to the suffixed path
    /// instead; the container records the file's name, MIME type (from the
    /// database's content-type table), and the current time.
    pub fn store_file(
        &self,
        class: StorageClass,
        path: &str,
        data: &[u8],
        mode: StoreMode,
        key: Option<&VaultKey>,
    ) -> Result<()> {
        validate_file_path(path)?;
        let translated = self.translate(path)?;
        let db = self.hub.database(class);

        match key {
            None => db.put(&translated, data, mode)?,
            Some(key) => {
                let sealed = self.seal(class, &translated, data, key)?;
                db.put(&sealed_path(&translated), sealed.to_document().as_bytes(), mode)?;
            }
        }
        debug!(%class, path, sealed = key.is_some(), %mode, "stored file");
        Ok(())
    }

    /// Create a file under a unique name, replacing `token` in the final
    /// segment of `path`. Returns the translated path actually used (with
    /// the sealed suffix when a key was given).
    pub fn create_unique_file(
        &self,
        class: StorageClass,
        path: &str,
        token: &str,
        data: &[u8],
        key: Option<&VaultKey>,
    ) -> Result<String> {
        validate_file_path(path)?;
        let translated = self.translate(path)?;
        let db = self.hub.database(class);

        let actual = match key {
            None => db.create_unique(&translated, token, data)?,
            Some(key) => {
                let sealed = self.seal(class, &translated, data, key)?;
                db.create_unique(
                    &sealed_path(&translated),
                    token,
                    sealed.to_document().as_bytes(),
                )?
            }
        };
        Ok(actual)
    }

    /// Delete a file relative to this context. `expect_sealed` selects the
    /// suffixed container path.
    pub fn delete_file(&self, class: StorageClass, path: &str, expect_sealed: bool) -> Result<()> {
        validate_file_path(path)?;
        let translated = self.translate(path)?;
        let target = if expect_sealed {
            sealed_path(&translated)
        } else {
            translated
        };
        self.hub.database(class).delete(&target)?;
        Ok(())
    }

    /// Recursively remove a directory relative to this context, in both
    /// storage roots. Missing directories are a no-op.
    pub fn empty_directory(&self, class: StorageClass, path: &str) -> Result<()> {
        let translated = self.translate(path)?;
        self.hub.database(class).empty_directory(&translated)?;
        Ok(())
    }

    /// List entry names under a directory relative to this context (union
    /// across both storage roots).
    pub fn list(&self, class: StorageClass, path: &str) -> Result<Vec<String>> {
        let translated = self.translate(path)?;
        Ok(self.hub.database(class).list(&translated)?)
    }

    fn seal(
        &self,
        class: StorageClass,
        translated: &str,
        data: &[u8],
        key: &VaultKey,
    ) -> Result<SealedFile> {
        let name = translated.rsplit('/').next().unwrap_or(translated).to_string();
        let content_type = self
            .hub
            .database(class)
            .content_types()
            .content_type_for(&name)
            .to_string();
        let created = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(SealedFile::seal(
            key,
            &FileSource {
                name,
                content_type,
                created,
                data: data.to_vec(),
            },
        )?)
    }
}

impl std::fmt::Display for DataContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("hub");
        }
        let mut first = true;
        for segment in &self.segments {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            match segment {
                Segment::Site(name) => write!(f, "site \"{name}\"")?,
                Segment::Realm(name) => write!(f, "realm \"{name}\"")?,
                Segment::Account(id) => write!(f, "account \"{id}\"")?,
            }
        }
        Ok(())
    }
}

fn sealed_path(translated: &str) -> String {
    format!("{translated}{SEALED_SUFFIX}")
}

fn stored_from_source(source: FileSource) -> StoredFile {
    StoredFile {
        name: source.name,
        content_type: source.content_type,
        modified: UNIX_EPOCH + Duration::from_secs(source.created),
        data: source.data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;

    use atrium_store::{ContentTypeMap, Database, StoreError};
    use tempfile::TempDir;

    struct Fixture {
        root: DataContext,
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
        Fixture {
            root: DataContext::root(Arc::new(Hub::new(content, statics))),
            _dirs: dirs,
        }
    }

    fn account_context(root: &DataContext) -> DataContext {
        root.site(SiteName::parse("demo").unwrap())
            .unwrap()
            .realm(RealmName::parse("MEMBERS").unwrap())
            .unwrap()
            .account(AccountId::parse("0123456789abcdef").unwrap())
            .unwrap()
    }

    #[test]
    fn translation_concatenates_root_to_leaf() {
        let fx = fixture();
        let account = account_context(&fx.root);
        assert_eq!(
            account.translate("AccountData.xml").unwrap(),
            "demo/realms/MEMBERS/accounts/0123456789abcdef/AccountData.xml"
        );
        assert_eq!(fx.root.translate("a/b.xml").unwrap(), "a/b.xml");
    }

    #[test]
    fn invalid_paths_are_rejected_before_storage() {
        let fx = fixture();
        // Nothing exists on disk, but a valid missing path reports NotFound
        // while an invalid path reports a name error: proof the grammar
        // check runs first.
        let missing = fx.root.get_file(StorageClass::Content, "nope.xml", None);
        assert!(missing.unwrap_err().is_not_found());

        let invalid = fx.root.get_file(StorageClass::Content, "../nope.xml", None);
        assert!(matches!(invalid, Err(ContextError::Name(_))));

        // And directories are not file paths.
        let not_a_file = fx.root.get_file(StorageClass::Content, "accounts", None);
        assert!(matches!(not_a_file, Err(ContextError::Name(_))));
    }

    #[test]
    fn chain_misuse_is_rejected() {
        let fx = fixture();
        let site = fx.root.site(SiteName::parse("demo").unwrap()).unwrap();
        assert!(matches!(
            site.site(SiteName::parse("other").unwrap()),
            Err(ContextError::InvalidChain(_))
        ));
        assert!(matches!(
            fx.root.realm(RealmName::parse("MEMBERS").unwrap()),
            Err(ContextError::InvalidChain(_))
        ));
        assert!(matches!(
            fx.root.account(AccountId::parse("0123456789abcdef").unwrap()),
            Err(ContextError::InvalidChain(_))
        ));
    }

    #[test]
    fn plain_store_and_get_round_trip() {
        let fx = fixture();
        let account = account_context(&fx.root);
        account
            .store_file(
                StorageClass::Content,
                "AccountData.xml",
                b"<AccountData/>",
                StoreMode::MustNotExist,
                None,
            )
            .unwrap();

        let file = account.get_file(StorageClass::Content, "AccountData.xml", None).unwrap();
        assert_eq!(file.data, b"<AccountData/>");
        assert_eq!(file.content_type, "text/xml");

        // The wire-contract location, visible to direct database readers.
        let direct = fx
            .root
            .hub()
            .database(StorageClass::Content)
            .get("demo/realms/MEMBERS/accounts/0123456789abcdef/AccountData.xml")
            .unwrap();
        assert_eq!(direct.data, b"<AccountData/>");
    }

    #[test]
    fn sealed_store_uses_suffixed_path_and_round_trips() {
        let fx = fixture();
        let account = account_context(&fx.root);
        let key = VaultKey::generate();

        account
            .store_file(
                StorageClass::Content,
                "AccountData.xml",
                b"<AccountData/>",
                StoreMode::MustNotExist,
                Some(&key),
            )
            .unwrap();

        // The plain path stays empty; the container sits at the suffixed
        // path and is a parseable vault document.
        let db = fx.root.hub().database(StorageClass::Content);
        let plain = "demo/realms/MEMBERS/accounts/0123456789abcdef/AccountData.xml";
        assert!(matches!(db.get(plain), Err(StoreError::NotFound { .. })));
        let container = db.get(&format!("{plain}{SEALED_SUFFIX}")).unwrap();
        assert!(SealedFile::parse(std::str::from_utf8(&container.data).unwrap()).is_ok());

        let file = account
            .get_file(StorageClass::Content, "AccountData.xml", Some(&key))
            .unwrap();
        assert_eq!(file.data, b"<AccountData/>");
        assert_eq!(file.name, "AccountData.xml");
        assert_eq!(file.content_type, "text/xml");

        let wrong = account.get_file(StorageClass::Content, "AccountData.xml", Some(&VaultKey::generate()));
        assert!(matches!(wrong, Err(ContextError::Vault(VaultError::WrongKey))));
    }

    #[test]
    fn get_xml_file_parses_payload() {
        let fx = fixture();
        let site = fx.root.site(SiteName::parse("demo").unwrap()).unwrap();
        site.store_file(
            StorageClass::Static,
            "pages/home.xml",
            b"<Page title=\"Home\"/>",
            StoreMode::Either,
            None,
        )
        .unwrap();
        let xml = site.get_xml_file(StorageClass::Static, "pages/home.xml", None).unwrap();
        assert_eq!(xml.attr("title"), Some("Home"));
    }

    #[test]
    fn delete_and_empty_directory_respect_sealing() {
        let fx = fixture();
        let account = account_context(&fx.root);
        let key = VaultKey::generate();

        account
            .store_file(StorageClass::Content, "AccountData.xml", b"x", StoreMode::Either, Some(&key))
            .unwrap();
        account.delete_file(StorageClass::Content, "AccountData.xml", true).unwrap();
        assert!(account
            .get_file(StorageClass::Content, "AccountData.xml", Some(&key))
            .unwrap_err()
            .is_not_found());

        account
            .store_file(StorageClass::Content, "notes/a.txt", b"1", StoreMode::Either, None)
            .unwrap();
        account.empty_directory(StorageClass::Content, "notes").unwrap();
        assert!(account.list(StorageClass::Content, "notes").unwrap().is_empty());
    }

    #[test]
    fn create_unique_file_returns_translated_path() {
        let fx = fixture();
        let site = fx.root.site(SiteName::parse("demo").unwrap()).unwrap();
        let actual = site
            .create_unique_file(StorageClass::Content, "drafts/d-NEW.xml", "NEW", b"x", None)
            .unwrap();
        assert!(actual.starts_with("demo/drafts/d-"));
        assert!(fx.root.hub().database(StorageClass::Content).get(&actual).is_ok());

        // Overlay read of factory content still works through the context.
        fs::create_dir_all(
            fx.root
                .hub()
                .database(StorageClass::Content)
                .read_root()
                .join("demo"),
        )
        .unwrap();
        fs::write(
            fx.root
                .hub()
                .database(StorageClass::Content)
                .read_root()
                .join("demo/factory.txt"),
            b"base",
        )
        .unwrap();
        let file = site.get_file(StorageClass::Content, "factory.txt", None).unwrap();
        assert_eq!(file.data, b"base");
    }
}
