//! Encryption at rest for memory text
//!
//! Memory titles and contents are stored as AES-256-GCM ciphertext tokens of
//! the form `ivHex:authTagHex:cipherHex` (16-byte IV, 16-byte tag). Reads
//! decrypt transparently. Rows written before the per-field `encrypted` flag
//! existed are disambiguated by token shape.

mod keys;

pub use keys::EncryptionKey;

use crate::error::{Error, Result};
use aes_gcm::{
    aead::{consts::U16, Aead, KeyInit},
    aes::Aes256,
    AesGcm, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// AES-256-GCM encryption key size
pub const KEY_SIZE: usize = 32;

/// IV size used in ciphertext tokens
pub const IV_SIZE: usize = 16;

/// Authentication tag size
pub const TAG_SIZE: usize = 16;

type Cipher = AesGcm<Aes256, U16>;

/// A text field as persisted.
///
/// `encrypted` is written explicitly on every create and update. `None`
/// marks legacy rows, which are classified by [`is_ciphertext_shaped`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredText {
    pub value: String,
    pub encrypted: Option<bool>,
}

impl StoredText {
    /// Plaintext stored without encryption
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            encrypted: Some(false),
        }
    }

    /// Legacy value with no flag
    pub fn legacy(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            encrypted: None,
        }
    }
}

/// Text codec bound to one key
#[derive(Clone)]
pub struct Codec {
    cipher: Cipher,
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}

impl Codec {
    /// Create a codec from key material
    pub fn new(key: &EncryptionKey) -> Result<Self> {
        let cipher = Cipher::new_from_slice(key.as_bytes())
            .map_err(|e| Error::Crypto(format!("Failed to create cipher: {}", e)))?;
        Ok(Self { cipher })
    }

    /// Encrypt text into an `iv:tag:cipher` token. Empty input stays empty.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);
        let nonce = Nonce::<U16>::from_slice(&iv);

        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

        // aes-gcm appends the tag to the ciphertext
        let (body, tag) = sealed.split_at(sealed.len() - TAG_SIZE);
        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(body)
        ))
    }

    /// Decrypt an `iv:tag:cipher` token. Empty input stays empty.
    pub fn decrypt(&self, token: &str) -> Result<String> {
        if token.is_empty() {
            return Ok(String::new());
        }

        let parts: Vec<&str> = token.split(':').collect();
        if parts.len() != 3 {
            return Err(Error::Decryption(format!(
                "expected 3 token segments, found {}",
                parts.len()
            )));
        }

        let iv = decode_segment(parts[0], "iv")?;
        let tag = decode_segment(parts[1], "tag")?;
        let body = decode_segment(parts[2], "cipher")?;

        if iv.len() != IV_SIZE {
            return Err(Error::Decryption(format!("iv must be {} bytes", IV_SIZE)));
        }
        if tag.len() != TAG_SIZE {
            return Err(Error::Decryption(format!("tag must be {} bytes", TAG_SIZE)));
        }

        let mut sealed = body;
        sealed.extend_from_slice(&tag);

        let plain = self
            .cipher
            .decrypt(Nonce::<U16>::from_slice(&iv), sealed.as_slice())
            .map_err(|_| Error::Decryption("authentication failed".to_string()))?;

        String::from_utf8(plain)
            .map_err(|_| Error::Decryption("plaintext is not valid UTF-8".to_string()))
    }

    /// Encrypt for storage, flagging the field as encrypted
    pub fn seal(&self, plaintext: &str) -> Result<StoredText> {
        Ok(StoredText {
            value: self.encrypt(plaintext)?,
            encrypted: Some(true),
        })
    }

    /// Recover plaintext from a stored field
    pub fn reveal(&self, stored: &StoredText) -> Result<String> {
        match stored.encrypted {
            Some(true) => self.decrypt(&stored.value),
            Some(false) => Ok(stored.value.clone()),
            None if is_ciphertext_shaped(&stored.value) => self.decrypt(&stored.value),
            None => Ok(stored.value.clone()),
        }
    }
}

/// Three `:`-separated, non-empty, pure-hex segments.
pub fn is_ciphertext_shaped(s: &str) -> bool {
    let parts: Vec<&str> = s.split(':').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_hexdigit()))
}

fn decode_segment(segment: &str, what: &str) -> Result<Vec<u8>> {
    hex::decode(segment).map_err(|e| Error::Decryption(format!("bad {} segment: {}", what, e)))
}
