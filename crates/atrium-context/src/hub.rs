use atrium_store::Database;
use atrium_types::StorageClass;

/// The root of the naming hierarchy: owns one [`Database`] per
/// [`StorageClass`].
///
/// The hub is built once at startup from configuration and shared (behind
/// an `Arc`) by every context derived from it.
#[derive(Debug)]
pub struct Hub {
    content: Database,
    statics: Database,
}

impl Hub {
    /// Bind the storage classes to their databases.
    pub fn new(content: Database, statics: Database) -> Self {
        Self { content, statics }
    }

    /// The database backing a storage class.
    pub fn database(&self, class: StorageClass) -> &Database {
        match class {
            StorageClass::Content => &self.content,
            StorageClass::Static => &self.statics,
        }
    }
}
