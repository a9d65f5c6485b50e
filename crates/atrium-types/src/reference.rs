use serde::{Deserialize, Serialize};

use crate::error::{NameError, Result};

/// An external account reference: exactly 40 hex digits, either case.
///
/// References are the file names under `indexes/<indexName>/`, so the
/// original casing is preserved: two references that differ only in case
/// are distinct.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountRef(String);

impl AccountRef {
    /// Parse a reference from its 40-hex-digit textual form.
    pub fn parse(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        let err = |reason: &str| NameError::InvalidReference {
            value: s.clone(),
            reason: reason.to_string(),
        };

        if s.len() != 40 {
            return Err(err("must be exactly 40 hex digits"));
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err("only hex digits are allowed"));
        }
        Ok(Self(s))
    }

    /// Build a reference from a 20-byte digest, lowercase hex encoded.
    pub fn from_digest(digest: [u8; 20]) -> Self {
        Self(hex::encode(digest))
    }

    /// The reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AccountRef {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for AccountRef {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOWER: &str = "0123456789abcdef0123456789abcdef01234567";
    const MIXED: &str = "0123456789ABCDEF0123456789abcdef01234567";

    #[test]
    fn parse_accepts_both_cases_and_preserves_them() {
        assert_eq!(AccountRef::parse(LOWER).unwrap().as_str(), LOWER);
        assert_eq!(AccountRef::parse(MIXED).unwrap().as_str(), MIXED);
        assert_ne!(AccountRef::parse(LOWER).unwrap(), AccountRef::parse(MIXED).unwrap());
    }

    #[test]
    fn reject_bad_references() {
        for s in [
            "",
            &LOWER[1..],                // 39 digits
            &format!("{LOWER}0"),       // 41 digits
            "0123456789abcdef0123456789abcdef0123456g", // non-hex
        ] {
            assert!(AccountRef::parse(s.to_string()).is_err(), "{s}");
        }
    }

    #[test]
    fn digest_references_are_valid() {
        let r = AccountRef::from_digest([0xab; 20]);
        assert_eq!(r.as_str().len(), 40);
        assert!(AccountRef::parse(r.as_str()).is_ok());
    }
}
