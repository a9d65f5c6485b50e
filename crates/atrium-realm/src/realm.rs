//! Realm aggregation and the account lifecycle.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use atrium_context::DataContext;
use atrium_store::StoreMode;
use atrium_types::xml::Element;
use atrium_types::{AccountId, AccountRef, IndexName, Properties, RealmName, StorageClass};
use atrium_vault::VaultKey;

use crate::account::Account;
use crate::data::AccountData;
use crate::error::{RealmError, Result};
use crate::index::AccountIndex;
use crate::schema::{AccountDataDef, TypeRegistry};

/// Payload file name inside each account directory.
const ACCOUNT_DATA_FILE: &str = "AccountData.xml";

/// Index that maps login-combo hashes to account ids.
const COMBO_INDEX: &str = "combo";

/// Index that maps account-id hashes to account ids.
const ID_INDEX: &str = "id";

// Hash domains for derived references and keys.
const COMBO_REF_DOMAIN: &str = "atrium-combo-ref-v1";
const ID_REF_DOMAIN: &str = "atrium-id-ref-v1";
const COMBO_KEY_DOMAIN: &str = "atrium-combo-key-v1";

/// Whether a realm seals its account payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RealmKind {
    /// Account payloads are vault-sealed; keys derive from login combos.
    Secure,
    /// Account payloads are stored in the clear.
    Insecure,
}

/// Parsed realm configuration.
///
/// Configuration *loading* is an external concern; the realm consumes
/// either this struct directly or an already-parsed `<Realm/>` element via
/// [`RealmConfig::from_xml`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RealmConfig {
    /// The realm name.
    pub name: RealmName,
    /// Secure or insecure.
    pub kind: RealmKind,
    /// The storage class accounts are primarily created in (and the one
    /// scanned for account ids).
    pub account_source: StorageClass,
    /// The realm's account indexes: name and backing storage class.
    pub indexes: Vec<(IndexName, StorageClass)>,
    /// The property names whose values feed combo references and keys.
    pub login_fields: Vec<String>,
}

impl RealmConfig {
    /// The login fields assumed when configuration does not say otherwise.
    pub fn default_login_fields() -> Vec<String> {
        vec!["User".to_string(), "Pass".to_string()]
    }

    /// Extract a configuration from a parsed `<Realm/>` element:
    ///
    /// ```xml
    /// <Realm name="MEMBERS" secure="true" accountSource="content">
    ///    <AccountIndexes>
    ///       <AccountIndex name="combo" db="content"/>
    ///    </AccountIndexes>
    ///    <LoginPage>
    ///       <Field name="User" type="text"/>
    ///       <Field name="Pass" type="password"/>
    ///    </LoginPage>
    /// </Realm>
    /// ```
    ///
    /// When a `<LoginPage/>` is present, the login fields must each appear
    /// as a `<Field/>` somewhere beneath it with a type the registry can
    /// resolve.
    pub fn from_xml(xml: &Element, registry: &dyn TypeRegistry) -> Result<Self> {
        if xml.name() != "Realm" {
            return Err(RealmError::Config(format!(
                "expected a <Realm/> element, got <{}/>",
                xml.name()
            )));
        }

        let name = RealmName::parse(xml.attr("name").unwrap_or_default())?;

        let kind = match xml.attr("secure") {
            None | Some("false") => RealmKind::Insecure,
            Some("true") => RealmKind::Secure,
            Some(other) => {
                return Err(RealmError::Config(format!(
                    "bad \"secure\" attribute {other:?} on <Realm/> {name}"
                )))
            }
        };

        let account_source = match xml.attr("accountSource") {
            Some(value) => parse_storage_class(value).ok_or_else(|| {
                RealmError::Config(format!(
                    "bad \"accountSource\" attribute {value:?} on <Realm/> {name}"
                ))
            })?,
            None => {
                return Err(RealmError::Config(format!(
                    "missing \"accountSource\" attribute on <Realm/> {name}"
                )))
            }
        };

        let mut indexes = Vec::new();
        if let Some(indexes_elem) = xml.child("AccountIndexes") {
            for index_elem in indexes_elem.children_named("AccountIndex") {
                let index_name = IndexName::parse(index_elem.attr("name").unwrap_or_default())?;
                let class = index_elem
                    .attr("db")
                    .and_then(parse_storage_class)
                    .ok_or_else(|| {
                        RealmError::Config(format!(
                            "bad or missing \"db\" attribute on <AccountIndex/> {index_name} in realm {name}"
                        ))
                    })?;
                indexes.push((index_name, class));
            }
        }

        let login_fields = Self::default_login_fields();
        if let Some(login_page) = xml.child("LoginPage") {
            for field in &login_fields {
                let field_elem = login_page
                    .find_where("Field", "name", field)
                    .ok_or_else(|| {
                        RealmError::Config(format!(
                            "realm {name}: <LoginPage/> lacks a {field:?} field"
                        ))
                    })?;
                let type_name = field_elem.attr("type").unwrap_or_default();
                if registry.create(type_name).is_none() {
                    return Err(RealmError::Config(format!(
                        "realm {name}: unknown type {type_name:?} for login field {field:?}"
                    )));
                }
            }
        }

        Ok(Self {
            name,
            kind,
            account_source,
            indexes,
            login_fields,
        })
    }
}

fn parse_storage_class(value: &str) -> Option<StorageClass> {
    match value {
        "content" => Some(StorageClass::Content),
        "static" => Some(StorageClass::Static),
        _ => None,
    }
}

/// Everything a single `create_account` call has persisted so far, for
/// compensation. Only what this call wrote is ever deleted: a racing
/// creator of the same id must not have its files touched.
#[derive(Default)]
struct WriteTrail {
    files: Vec<(StorageClass, String, bool)>,
    refs: Vec<(IndexName, AccountRef)>,
}

/// A login realm within a site.
///
/// The realm owns the per-class account schemas, the account indexes, and
/// the account lifecycle. It is immutable after construction and safe to
/// share across request-handling threads.
pub struct Realm {
    context: DataContext,
    name: RealmName,
    kind: RealmKind,
    account_source: StorageClass,
    indexes: BTreeMap<IndexName, AccountIndex>,
    data_defs: BTreeMap<StorageClass, AccountDataDef>,
    property_sources: BTreeMap<String, StorageClass>,
    default_properties: Properties,
    disabled_ids: HashSet<AccountId>,
    login_fields: Vec<String>,
    rng: Mutex<StdRng>,
}

impl Realm {
    /// Build a realm from its configuration and per-class schemas.
    ///
    /// Fails when the same property name is declared in more than one
    /// storage class; that is a configuration error, detected here so a
    /// broken realm never starts serving.
    pub fn new(
        site: &DataContext,
        config: RealmConfig,
        data_defs: BTreeMap<StorageClass, AccountDataDef>,
        default_properties: Properties,
        disabled_ids: HashSet<AccountId>,
    ) -> Result<Self> {
        let context = site.realm(config.name.clone())?;

        let mut defs = data_defs;
        for class in StorageClass::ALL {
            defs.entry(class).or_default();
        }

        let mut property_sources: BTreeMap<String, StorageClass> = BTreeMap::new();
        for class in StorageClass::ALL {
            for name in defs[&class].property_names() {
                if let Some(first) = property_sources.get(name) {
                    return Err(RealmError::DuplicateProperty {
                        name: name.to_string(),
                        first: *first,
                        second: class,
                    });
                }
                property_sources.insert(name.to_string(), class);
            }
        }

        let mut indexes = BTreeMap::new();
        for (index_name, class) in config.indexes {
            indexes.insert(
                index_name.clone(),
                AccountIndex::new(context.clone(), class, index_name),
            );
        }

        debug!(
            realm = %config.name,
            secure = config.kind == RealmKind::Secure,
            indexes = indexes.len(),
            properties = property_sources.len(),
            "realm initialized"
        );

        Ok(Self {
            context,
            name: config.name,
            kind: config.kind,
            account_source: config.account_source,
            indexes,
            data_defs: defs,
            property_sources,
            default_properties,
            disabled_ids,
            login_fields: config.login_fields,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// Build a realm from a parsed `<Realm/>` element, loading the
    /// per-class schema files, default account properties, and the
    /// disabled-account overlay from the content database:
    ///
    /// - `<class>.AccountDataDef.xml` per storage class (absent = no data)
    /// - `DefaultAccountProperties.xml` (absent = empty)
    /// - `DisabledAccounts.xml` (absent = none)
    pub fn load(site: &DataContext, xml: &Element, registry: &dyn TypeRegistry) -> Result<Self> {
        let config = RealmConfig::from_xml(xml, registry)?;
        let context = site.realm(config.name.clone())?;

        let mut data_defs = BTreeMap::new();
        for class in StorageClass::ALL {
            let path = format!("{}.AccountDataDef.xml", class.as_str());
            match context.get_xml_file(StorageClass::Content, &path, None) {
                Ok(doc) => {
                    data_defs.insert(class, AccountDataDef::parse_xml(&doc, registry)?);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        let default_properties =
            match context.get_xml_file(StorageClass::Content, "DefaultAccountProperties.xml", None)
            {
                Ok(doc) => parse_properties(&doc)?,
                Err(e) if e.is_not_found() => Properties::new(),
                Err(e) => return Err(e.into()),
            };

        let disabled_ids =
            match context.get_xml_file(StorageClass::Content, "DisabledAccounts.xml", None) {
                Ok(doc) => parse_disabled(&doc)?,
                Err(e) if e.is_not_found() => HashSet::new(),
                Err(e) => return Err(e.into()),
            };

        Self::new(site, config, data_defs, default_properties, disabled_ids)
    }

    /// The realm name.
    pub fn name(&self) -> &RealmName {
        &self.name
    }

    /// Secure or insecure.
    pub fn kind(&self) -> RealmKind {
        self.kind
    }

    /// `true` iff account payloads are sealed.
    pub fn is_secure(&self) -> bool {
        self.kind == RealmKind::Secure
    }

    /// The realm's naming context (`<site>/realms/<name>/`).
    pub fn context(&self) -> &DataContext {
        &self.context
    }

    /// The storage class accounts are created in primarily.
    pub fn account_source(&self) -> StorageClass {
        self.account_source
    }

    /// An account index by name, or `None`.
    pub fn account_index(&self, name: &str) -> Option<&AccountIndex> {
        self.indexes.get(name)
    }

    /// An account index by name, or an error.
    pub fn require_account_index(&self, name: &str) -> Result<&AccountIndex> {
        self.account_index(name).ok_or_else(|| RealmError::NoSuchIndex {
            realm: self.name.to_string(),
            name: name.to_string(),
        })
    }

    /// All account indexes, in name order.
    pub fn account_indexes(&self) -> impl Iterator<Item = &AccountIndex> {
        self.indexes.values()
    }

    /// The account schema for a storage class.
    pub fn data_def(&self, class: StorageClass) -> &AccountDataDef {
        &self.data_defs[&class]
    }

    /// The storage class a property is declared in, or `None`.
    pub fn property_source(&self, name: &str) -> Option<StorageClass> {
        self.property_sources.get(name).copied()
    }

    /// Default properties applied when account creation is given none.
    pub fn default_properties(&self) -> &Properties {
        &self.default_properties
    }

    /// `true` iff the id is in the disabled overlay.
    pub fn is_disabled(&self, id: AccountId) -> bool {
        self.disabled_ids.contains(&id)
    }

    // -----------------------------------------------------------------
    // Derived references and keys
    // -----------------------------------------------------------------

    /// The combo reference for a set of properties: a hash over the login
    /// field values. Fails when a login field is missing.
    pub fn combo_ref(&self, properties: &Properties) -> Result<AccountRef> {
        let parts = self.login_parts(properties)?;
        let refs: Vec<&[u8]> = parts.iter().map(|p| p.as_bytes()).collect();
        Ok(AccountRef::from_digest(digest20(COMBO_REF_DOMAIN, &refs)))
    }

    /// The id-index reference for an account id: a hash over the id, since
    /// references are fixed at 40 hex digits.
    pub fn id_ref(&self, id: AccountId) -> AccountRef {
        AccountRef::from_digest(digest20(ID_REF_DOMAIN, &[id.to_hex().as_bytes()]))
    }

    /// The account key derived from a login combo. Insecure realms have no
    /// keys, so this is the single branch on the realm kind.
    pub fn key_by_combo(&self, login: &Properties) -> Result<Option<VaultKey>> {
        match self.kind {
            RealmKind::Insecure => Ok(None),
            RealmKind::Secure => {
                let parts = self.login_parts(login)?;
                let refs: Vec<&[u8]> = parts.iter().map(|p| p.as_bytes()).collect();
                Ok(Some(VaultKey::derive(COMBO_KEY_DOMAIN, &refs)))
            }
        }
    }

    fn login_parts<'a>(&self, properties: &'a Properties) -> Result<Vec<&'a str>> {
        self.login_fields
            .iter()
            .map(|field| {
                properties.get(field).ok_or_else(|| RealmError::MissingProperty {
                    name: field.clone(),
                })
            })
            .collect()
    }

    /// The key a new account gets: validation-time branch on the realm
    /// kind.
    ///
    /// Secure realms prefer a combo-derived key (so the key can be derived
    /// again at login) and fall back to a fresh random key when the login
    /// fields are absent; a supplied key always wins. Insecure realms
    /// reject supplied keys.
    fn new_key(
        &self,
        supplied: Option<VaultKey>,
        properties: &Properties,
    ) -> Result<Option<VaultKey>> {
        match (self.kind, supplied) {
            (RealmKind::Insecure, Some(_)) => Err(RealmError::KeyNotAllowed {
                realm: self.name.to_string(),
            }),
            (RealmKind::Insecure, None) => Ok(None),
            (RealmKind::Secure, Some(key)) => Ok(Some(key)),
            (RealmKind::Secure, None) => {
                if self.login_fields.iter().all(|f| properties.contains(f)) {
                    self.key_by_combo(properties)
                } else {
                    Ok(Some(VaultKey::generate()))
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Account lifecycle
    // -----------------------------------------------------------------

    /// Create a new account.
    ///
    /// `id` defaults to a random one; `properties` default to the realm's
    /// default set; `key` is only meaningful for secure realms.
    ///
    /// The call walks Validating → Persisting (per storage class, in fixed
    /// order) → Indexing. A validation failure aborts before any write. A
    /// failure later deletes everything *this call* wrote before returning
    /// [`RealmError::CreationFailed`]: a partially created account is never
    /// left observable, and a racing creator of the same id keeps its own
    /// files.
    pub fn create_account(
        &self,
        id: Option<AccountId>,
        properties: Option<&Properties>,
        key: Option<VaultKey>,
    ) -> Result<Account> {
        // Validating: nothing below may touch storage.
        let id = id.unwrap_or_else(|| {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            AccountId::generate(&mut *rng)
        });
        let effective = match properties {
            Some(props) => props.clone(),
            None => self.default_properties.clone(),
        };
        debug!(realm = %self.name, %id, "about to create account");

        let mut data_map = BTreeMap::new();
        for class in StorageClass::ALL {
            data_map.insert(class, self.data_defs[&class].build(&effective)?);
        }
        let key = self.new_key(key, &effective)?;
        let account_context = self.context.account(id)?;

        // Persisting and Indexing, compensated on failure.
        let mut trail = WriteTrail::default();
        match self.persist_and_index(id, &data_map, &effective, key.as_ref(), &mut trail) {
            Ok(()) => {
                info!(realm = %self.name, %id, "account created");
                let mut merged = Properties::new();
                for data in data_map.values() {
                    for (name, value) in data.values().iter() {
                        merged.set(name, value);
                    }
                }
                Ok(Account::new(
                    account_context,
                    id,
                    !self.is_disabled(id),
                    key,
                    merged,
                ))
            }
            Err(cause) => {
                error!(
                    realm = %self.name,
                    %id,
                    error = %cause,
                    "account creation failed; removing files written by this call"
                );
                self.compensate(id, &trail);
                Err(RealmError::CreationFailed {
                    realm: self.name.to_string(),
                    id,
                    cause: Box::new(cause),
                })
            }
        }
    }

    fn persist_and_index(
        &self,
        id: AccountId,
        data_map: &BTreeMap<StorageClass, AccountData>,
        properties: &Properties,
        key: Option<&VaultKey>,
        trail: &mut WriteTrail,
    ) -> Result<()> {
        let path = format!("accounts/{id}/{ACCOUNT_DATA_FILE}");

        for class in StorageClass::ALL {
            let data = &data_map[&class];
            if !data.has_values() {
                // No payload in this class: remove any stale file instead.
                match self.context.delete_file(class, &path, key.is_some()) {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e.into()),
                }
                continue;
            }
            self.context.store_file(
                class,
                &path,
                data.to_document().as_bytes(),
                StoreMode::MustNotExist,
                key,
            )?;
            trail.files.push((class, path.clone(), key.is_some()));
        }

        if let Some(index) = self.indexes.get(COMBO_INDEX) {
            let reference = self.combo_ref(properties)?;
            index.store_ref(&reference, id)?;
            trail.refs.push((index.name().clone(), reference));
        }
        if let Some(index) = self.indexes.get(ID_INDEX) {
            let reference = self.id_ref(id);
            index.store_ref(&reference, id)?;
            trail.refs.push((index.name().clone(), reference));
        }
        Ok(())
    }

    /// Best-effort removal of everything one failed creation wrote.
    /// Cleanup failures are logged, never escalated: they must not mask
    /// the original cause.
    fn compensate(&self, id: AccountId, trail: &WriteTrail) {
        for (class, path, sealed) in &trail.files {
            match self.context.delete_file(*class, path, *sealed) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    error!(realm = %self.name, %id, %class, path = %path, error = %e,
                        "cleanup: failed to delete account payload; ignoring");
                }
            }
            // Drop the account directory too if nothing else lives there,
            // so an id scan does not see a phantom account.
            let dir = format!("accounts/{id}");
            match self.context.list(*class, &dir) {
                Ok(entries) if entries.is_empty() => {
                    if let Err(e) = self.context.empty_directory(*class, &dir) {
                        error!(realm = %self.name, %id, %class, error = %e,
                            "cleanup: failed to remove empty account directory; ignoring");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(realm = %self.name, %id, %class, error = %e,
                        "cleanup: failed to inspect account directory; ignoring");
                }
            }
        }
        for (index_name, reference) in &trail.refs {
            if let Some(index) = self.indexes.get(index_name.as_str()) {
                if let Err(e) = index.remove_ref(reference) {
                    error!(realm = %self.name, %id, index = %index_name, %reference, error = %e,
                        "cleanup: failed to remove account reference; ignoring");
                }
            }
        }
    }

    /// Load an existing account.
    ///
    /// Secure realms require the account key (see [`Realm::key_by_combo`]);
    /// insecure realms forbid one. The returned handle carries the merged
    /// properties from every storage class that has a payload.
    pub fn account(&self, id: AccountId, key: Option<VaultKey>) -> Result<Account> {
        match (self.kind, &key) {
            (RealmKind::Secure, None) => {
                return Err(RealmError::KeyRequired {
                    realm: self.name.to_string(),
                })
            }
            (RealmKind::Insecure, Some(_)) => {
                return Err(RealmError::KeyNotAllowed {
                    realm: self.name.to_string(),
                })
            }
            _ => {}
        }

        let path = format!("accounts/{id}/{ACCOUNT_DATA_FILE}");
        let mut merged = Properties::new();
        let mut found = false;
        for class in StorageClass::ALL {
            match self.context.get_xml_file(class, &path, key.as_ref()) {
                Ok(doc) => {
                    found = true;
                    for (name, value) in AccountData::parse_xml(&doc)?.values().iter() {
                        merged.set(name, value);
                    }
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        if !found {
            return Err(RealmError::NoSuchAccount { id });
        }

        Ok(Account::new(
            self.context.account(id)?,
            id,
            !self.is_disabled(id),
            key,
            merged,
        ))
    }

    /// Delete an account: its per-class payload directories, then every
    /// index reference resolving to it. Per-reference removal failures are
    /// logged and skipped, so one stubborn entry cannot block the rest of
    /// the deletion.
    pub fn delete_account_files(&self, id: AccountId) {
        let dir = format!("accounts/{id}");
        for class in StorageClass::ALL {
            if let Err(e) = self.context.empty_directory(class, &dir) {
                warn!(realm = %self.name, %id, %class, error = %e,
                    "failed to remove account directory; ignoring");
            }
        }

        for index in self.indexes.values() {
            match index.refs_for_account(id) {
                Ok(refs) => {
                    for reference in refs {
                        if let Err(e) = index.remove_ref(&reference) {
                            error!(realm = %self.name, %id, index = %index.name(), %reference,
                                error = %e,
                                "failed to remove account reference; ignoring");
                        }
                    }
                }
                Err(e) => {
                    warn!(realm = %self.name, %id, index = %index.name(), error = %e,
                        "failed to scan index during account deletion; ignoring");
                }
            }
        }
        info!(realm = %self.name, %id, "account files deleted");
    }

    /// The ids of all accounts in this realm, enabled and disabled: the
    /// entries under `accounts/` in the account-source class (both storage
    /// roots) whose names are valid account ids.
    pub fn account_ids(&self) -> Result<Vec<AccountId>> {
        let entries = self.context.list(self.account_source, "accounts")?;
        Ok(entries
            .iter()
            .filter_map(|name| AccountId::parse(name).ok())
            .collect())
    }

    /// The number of accounts in this realm.
    pub fn account_count(&self) -> Result<usize> {
        Ok(self.account_ids()?.len())
    }
}

impl std::fmt::Debug for Realm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Realm")
            .field("context", &self.context.to_string())
            .field("kind", &self.kind)
            .field("indexes", &self.indexes.len())
            .field("properties", &self.property_sources.len())
            .finish()
    }
}

/// 20-byte domain-separated digest, hex-encodable as a 40-digit reference.
fn digest20(domain: &str, parts: &[&[u8]]) -> [u8; 20] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain.as_bytes());
    hasher.update(b":");
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let mut out = [0u8; 20];
    hasher.finalize_xof().fill(&mut out);
    out
}

/// Parse a `<Properties/>` document into a property map.
fn parse_properties(xml: &Element) -> Result<Properties> {
    if xml.name() != "Properties" {
        return Err(RealmError::Config(format!(
            "expected a <Properties/> document, got <{}/>",
            xml.name()
        )));
    }
    let mut properties = Properties::new();
    for prop in xml.children_named("Property") {
        let name = prop.attr("name").ok_or_else(|| {
            RealmError::Config("<Property/> element without \"name\" attribute".to_string())
        })?;
        properties.set(name, prop.text());
    }
    Ok(properties)
}

/// Parse a `<DisabledAccounts/>` document into the disabled-id overlay.
fn parse_disabled(xml: &Element) -> Result<HashSet<AccountId>> {
    if xml.name() != "DisabledAccounts" {
        return Err(RealmError::Config(format!(
            "expected a <DisabledAccounts/> document, got <{}/>",
            xml.name()
        )));
    }
    let mut ids = HashSet::new();
    for account in xml.children_named("Account") {
        let raw = account.attr("id").unwrap_or_default();
        let id = AccountId::parse(raw).map_err(|e| {
            RealmError::Config(format!("bad <Account/> id in DisabledAccounts.xml: {e}"))
        })?;
        ids.insert(id);
    }
    Ok(ids)
}
