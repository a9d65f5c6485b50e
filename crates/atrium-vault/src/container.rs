use aes_gcm::{
    aead::{Aead, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use atrium_types::xml::Element;

use crate::error::{Result, VaultError};
use crate::key::VaultKey;

/// Suffix appended to a logical path when its payload is stored sealed.
pub const SEALED_SUFFIX: &str = ".Ciphered.xml";

/// Nonce size for AES-GCM (96 bits).
const NONCE_LEN: usize = 12;

/// Container format version.
const VERSION: &str = "1";

/// A decrypted payload together with the metadata needed to act as a data
/// source: name, content type, and creation time (Unix seconds).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileSource {
    pub name: String,
    pub content_type: String,
    pub created: u64,
    pub data: Vec<u8>,
}

/// A sealed payload: ciphertext plus self-describing metadata.
///
/// The metadata is bound into the authentication tag as associated data, so
/// neither the ciphertext nor the metadata can be altered without
/// [`SealedFile::open`] failing.
#[derive(Clone, Debug)]
pub struct SealedFile {
    name: String,
    content_type: String,
    created: u64,
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl SealedFile {
    /// Seal a payload under a key.
    pub fn seal(key: &VaultKey, source: &FileSource) -> Result<Self> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let aad = associated_data(&source.name, &source.content_type, source.created);
        let cipher = Aes256Gcm::new(key.as_bytes().into());
        let ciphertext = cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &source.data,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|e| VaultError::Crypto(e.to_string()))?;

        Ok(Self {
            name: source.name.clone(),
            content_type: source.content_type.clone(),
            created: source.created,
            nonce,
            ciphertext,
        })
    }

    /// Open the container, authenticating ciphertext and metadata.
    ///
    /// Fails with [`VaultError::WrongKey`] on any authentication failure;
    /// partially decrypted data is never returned.
    pub fn open(&self, key: &VaultKey) -> Result<FileSource> {
        let aad = associated_data(&self.name, &self.content_type, self.created);
        let cipher = Aes256Gcm::new(key.as_bytes().into());
        let data = cipher
            .decrypt(
                Nonce::from_slice(&self.nonce),
                Payload {
                    msg: &self.ciphertext,
                    aad: aad.as_bytes(),
                },
            )
            .map_err(|_| VaultError::WrongKey)?;

        Ok(FileSource {
            name: self.name.clone(),
            content_type: self.content_type.clone(),
            created: self.created,
            data,
        })
    }

    /// The name of the sealed payload.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The MIME type of the sealed payload.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Creation time of the sealed payload, in Unix seconds.
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Serialize the container as a standalone XML document.
    pub fn to_document(&self) -> String {
        Element::new("Vault")
            .with_attr("version", VERSION)
            .with_child(
                Element::new("Content")
                    .with_attr("name", &self.name)
                    .with_attr("type", &self.content_type)
                    .with_attr("created", self.created.to_string()),
            )
            .with_child(
                Element::new("Ciphertext")
                    .with_attr("nonce", hex::encode(self.nonce))
                    .with_text(hex::encode(&self.ciphertext)),
            )
            .to_document()
    }

    /// Parse a container from its XML document form.
    pub fn parse(input: &str) -> Result<Self> {
        let root = Element::parse(input)?;
        if root.name() != "Vault" {
            return Err(VaultError::Malformed(format!(
                "expected a <Vault/> document, got <{}/>",
                root.name()
            )));
        }
        match root.attr("version") {
            Some(VERSION) => {}
            Some(v) => {
                return Err(VaultError::Malformed(format!(
                    "unsupported container version {v:?}"
                )))
            }
            None => {
                return Err(VaultError::Malformed(
                    "missing \"version\" attribute".to_string(),
                ))
            }
        }

        let content = root
            .child("Content")
            .ok_or_else(|| VaultError::Malformed("missing <Content/> element".to_string()))?;
        let attr = |name: &str| {
            content
                .attr(name)
                .map(str::to_string)
                .ok_or_else(|| {
                    VaultError::Malformed(format!("missing {name:?} attribute on <Content/>"))
                })
        };
        let name = attr("name")?;
        let content_type = attr("type")?;
        let created = attr("created")?
            .parse::<u64>()
            .map_err(|e| VaultError::Malformed(format!("bad \"created\" attribute: {e}")))?;

        let cipher_elem = root
            .child("Ciphertext")
            .ok_or_else(|| VaultError::Malformed("missing <Ciphertext/> element".to_string()))?;
        let nonce_hex = cipher_elem.attr("nonce").ok_or_else(|| {
            VaultError::Malformed("missing \"nonce\" attribute on <Ciphertext/>".to_string())
        })?;
        let mut nonce = [0u8; NONCE_LEN];
        hex::decode_to_slice(nonce_hex, &mut nonce)
            .map_err(|e| VaultError::Malformed(format!("bad nonce: {e}")))?;
        let ciphertext = hex::decode(cipher_elem.text().trim())
            .map_err(|e| VaultError::Malformed(format!("bad ciphertext: {e}")))?;

        Ok(Self {
            name,
            content_type,
            created,
            nonce,
            ciphertext,
        })
    }
}

/// The metadata string authenticated alongside the ciphertext.
fn associated_data(name: &str, content_type: &str, created: u64) -> String {
    format!("{name}\n{content_type}\n{created}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_source() -> FileSource {
        FileSource {
            name: "AccountData.xml".to_string(),
            content_type: "text/xml".to_string(),
            created: 1_722_870_000,
            data: b"<AccountData/>".to_vec(),
        }
    }

    #[test]
    fn seal_open_round_trip() {
        let key = VaultKey::generate();
        let source = sample_source();
        let sealed = SealedFile::seal(&key, &source).unwrap();
        assert_eq!(sealed.open(&key).unwrap(), source);
    }

    #[test]
    fn wrong_key_is_distinguishable() {
        let sealed = SealedFile::seal(&VaultKey::generate(), &sample_source()).unwrap();
        let err = sealed.open(&VaultKey::generate()).unwrap_err();
        assert!(matches!(err, VaultError::WrongKey));
    }

    #[test]
    fn document_round_trip() {
        let key = VaultKey::generate();
        let sealed = SealedFile::seal(&key, &sample_source()).unwrap();
        let doc = sealed.to_document();
        assert!(doc.contains("<Vault version=\"1\">"));

        let parsed = SealedFile::parse(&doc).unwrap();
        assert_eq!(parsed.name(), "AccountData.xml");
        assert_eq!(parsed.content_type(), "text/xml");
        assert_eq!(parsed.created(), 1_722_870_000);
        assert_eq!(parsed.open(&key).unwrap(), sample_source());
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let key = VaultKey::generate();
        let mut sealed = SealedFile::seal(&key, &sample_source()).unwrap();
        sealed.ciphertext[0] ^= 0x01;
        assert!(matches!(sealed.open(&key), Err(VaultError::WrongKey)));
    }

    #[test]
    fn tampered_metadata_fails_authentication() {
        let key = VaultKey::generate();
        let sealed = SealedFile::seal(&key, &sample_source()).unwrap();
        let doc = sealed.to_document();
        let forged = doc.replace("name=\"AccountData.xml\"", "name=\"Other.xml\"");
        let parsed = SealedFile::parse(&forged).unwrap();
        assert!(matches!(parsed.open(&key), Err(VaultError::WrongKey)));
    }

    #[test]
    fn malformed_containers_are_not_wrong_key() {
        for input in [
            "",
            "<NotAVault/>",
            "<Vault version=\"2\"><Content name=\"a\" type=\"b\" created=\"0\"/><Ciphertext nonce=\"000000000000000000000000\">00</Ciphertext></Vault>",
            "<Vault version=\"1\"><Ciphertext nonce=\"00\">00</Ciphertext></Vault>",
        ] {
            let err = SealedFile::parse(input).unwrap_err();
            assert!(matches!(err, VaultError::Malformed(_)), "{input}");
        }
    }
}
