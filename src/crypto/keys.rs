//! Key material for encryption at rest

use super::KEY_SIZE;
use crate::error::{Error, Result};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// 256-bit AES key.
///
/// Zeroized on drop to prevent secret material from lingering in memory.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Generate a new random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse a key from exactly 64 hex characters
    pub fn from_hex(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.len() != KEY_SIZE * 2 {
            return Err(Error::Crypto(format!(
                "encryption key must be {} hex characters, got {}",
                KEY_SIZE * 2,
                value.len()
            )));
        }
        let mut decoded = hex::decode(value)
            .map_err(|e| Error::Crypto(format!("encryption key is not hex: {}", e)))?;
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        Ok(Self(bytes))
    }

    /// Read the key from an environment variable
    pub fn from_env(var: &str) -> Result<Self> {
        let mut value = std::env::var(var)
            .map_err(|_| Error::Config(format!("{} is not set", var)))?;
        let key = Self::from_hex(&value);
        value.zeroize();
        key
    }

    /// Hex form, for printing freshly generated keys
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Access the raw bytes (for cipher construction only)
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_hex_roundtrip() {
        let key = EncryptionKey::generate();
        let hex = key.to_hex();
        assert_eq!(hex.len(), 64);
        let parsed = EncryptionKey::from_hex(&hex).unwrap();
        assert_eq!(parsed.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(EncryptionKey::from_hex("abcd").is_err());
        assert!(EncryptionKey::from_hex(&"g".repeat(64)).is_err());
        assert!(EncryptionKey::from_hex(&"0".repeat(66)).is_err());
        assert!(EncryptionKey::from_hex(&"0".repeat(64)).is_ok());
    }

    #[test]
    fn test_from_env_missing() {
        let err = EncryptionKey::from_env("MEMORIA_TEST_KEY_NEVER_SET").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_debug_redacts() {
        let key = EncryptionKey::generate();
        assert!(!format!("{:?}", key).contains(&key.to_hex()));
    }
}
