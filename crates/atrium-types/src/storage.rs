use serde::{Deserialize, Serialize};

/// Tag identifying one of the logically distinct storage areas.
///
/// The set of storage classes is closed and known at startup; every context
/// operation names one. Each class maps 1:1 to a `Database` owned by the hub.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StorageClass {
    /// The primary, mutable content area.
    Content,
    /// The secondary, read-mostly static area.
    Static,
}

impl StorageClass {
    /// All storage classes, in the fixed order used by multi-class
    /// operations such as account persistence and compensation.
    pub const ALL: [StorageClass; 2] = [StorageClass::Content, StorageClass::Static];

    /// Stable short name, used in log output and payload file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Static => "static",
        }
    }
}

impl std::fmt::Display for StorageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_covers_every_class_once() {
        assert_eq!(StorageClass::ALL.len(), 2);
        assert_ne!(StorageClass::ALL[0], StorageClass::ALL[1]);
    }

    #[test]
    fn display_names() {
        assert_eq!(StorageClass::Content.to_string(), "content");
        assert_eq!(StorageClass::Static.to_string(), "static");
    }
}
