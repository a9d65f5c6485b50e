use aes_gcm::aead::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, VaultError};

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// A symmetric vault key: 32 bytes, zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey([u8; KEY_LEN]);

impl VaultKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap existing key bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Derive a key from a domain tag and a sequence of input parts.
    ///
    /// Parts are length-framed before hashing, so part boundaries are
    /// unambiguous: `["ab", "c"]` and `["a", "bc"]` derive different keys.
    pub fn derive(domain: &str, parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain.as_bytes());
        hasher.update(b":");
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Parse a key from 64 hex digits.
    pub fn from_hex(s: &str) -> Result<Self> {
        let mut bytes = [0u8; KEY_LEN];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| VaultError::InvalidKey(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Hex-encode the key (for operator-facing key handling only).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

// Key material never appears in log or debug output.
impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("VaultKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let key = VaultKey::generate();
        let parsed = VaultKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn reject_bad_hex() {
        assert!(VaultKey::from_hex("abc").is_err());
        assert!(VaultKey::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn derive_is_deterministic_and_framed() {
        let a = VaultKey::derive("realm-combo-v1", &[b"alice", b"secret"]);
        let b = VaultKey::derive("realm-combo-v1", &[b"alice", b"secret"]);
        assert_eq!(a, b);

        let other_domain = VaultKey::derive("realm-other-v1", &[b"alice", b"secret"]);
        assert_ne!(a, other_domain);

        let shifted = VaultKey::derive("realm-combo-v1", &[b"alices", b"ecret"]);
        assert_ne!(a, shifted);
    }

    #[test]
    fn debug_does_not_leak_material() {
        let key = VaultKey::generate();
        assert_eq!(format!("{key:?}"), "VaultKey(..)");
    }
}
