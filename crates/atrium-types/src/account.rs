use serde::{Deserialize, Serialize};

use crate::error::{NameError, Result};

/// A unique account identifier: exactly 16 lowercase hex digits.
///
/// Account ids name the per-account storage directory
/// (`accounts/<id>/`), so the textual form is part of the persisted
/// layout and never varies in case or length.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId([u8; 8]);

impl AccountId {
    /// Parse an account id from its 16-hex-digit textual form.
    pub fn parse(s: &str) -> Result<Self> {
        let err = |reason: &str| NameError::InvalidAccountId {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        if s.len() != 16 {
            return Err(err("must be exactly 16 hex digits"));
        }
        if !s.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')) {
            return Err(err("only lowercase hex digits are allowed"));
        }

        let mut bytes = [0u8; 8];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| err(&e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Generate a random account id.
    pub fn generate<R: rand::Rng>(rng: &mut R) -> Self {
        Self(rng.gen())
    }

    /// The raw 8 bytes behind the id.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// The canonical 16-hex-digit form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountId({})", self.to_hex())
    }
}

impl std::str::FromStr for AccountId {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        let id = AccountId::parse("0123456789abcdef").unwrap();
        assert_eq!(id.to_string(), "0123456789abcdef");
        assert_eq!(id.as_bytes(), &[0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef]);
    }

    #[test]
    fn reject_bad_ids() {
        for s in [
            "",
            "0123456789abcde",    // too short
            "0123456789abcdef0",  // too long
            "0123456789ABCDEF",   // uppercase
            "0123456789abcdeg",   // non-hex
        ] {
            assert!(AccountId::parse(s).is_err(), "{s}");
        }
    }

    #[test]
    fn generated_ids_are_valid() {
        let mut rng = rand::thread_rng();
        for _ in 0..16 {
            let id = AccountId::generate(&mut rng);
            assert!(AccountId::parse(&id.to_string()).is_ok());
        }
    }
}
