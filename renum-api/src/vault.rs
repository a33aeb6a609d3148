//! Credential Vault
//!
//! Authenticated symmetric encryption (AES-128-GCM) for third-party
//! integration secrets at rest. The key is loaded once at process start from
//! `ENCRYPTION_KEY` (base64, 16 bytes). Every seal uses a fresh random
//! 96-bit nonce; nonce reuse would be catastrophic for GCM security.
//!
//! Decrypt failures collapse into `InvalidCiphertext` regardless of cause
//! (wrong key, tampered payload); callers never retry.

use base64::Engine;
use renum_core::{ConfigError, RenumError, RenumResult, VaultError};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_128_GCM};
use ring::rand::{SecureRandom, SystemRandom};

/// AES-128 key length in bytes.
pub const KEY_LEN: usize = 16;

/// GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Sealed secret: ciphertext (tag appended) plus the nonce it was sealed
/// with. Both columns are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

/// Credential vault holding the process-wide encryption key.
pub struct Vault {
    key: [u8; KEY_LEN],
    rng: SystemRandom,
}

impl Vault {
    /// Build the vault from a raw 16-byte key.
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            key,
            rng: SystemRandom::new(),
        }
    }

    /// Load the key from `ENCRYPTION_KEY` (base64 of exactly 16 bytes).
    ///
    /// A missing variable is `MissingRequired`: the caller decides whether
    /// that is fatal (it is, whenever integration routes are registered).
    pub fn from_env() -> RenumResult<Self> {
        let encoded = std::env::var("ENCRYPTION_KEY").map_err(|_| {
            RenumError::Config(ConfigError::MissingRequired {
                field: "ENCRYPTION_KEY".to_string(),
            })
        })?;
        Self::from_base64(&encoded)
    }

    /// Build the vault from a base64-encoded key.
    pub fn from_base64(encoded: &str) -> RenumResult<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| {
                RenumError::Vault(VaultError::InvalidKey {
                    reason: format!("not valid base64: {}", e),
                })
            })?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            RenumError::Vault(VaultError::InvalidKey {
                reason: format!("key must decode to exactly {} bytes", KEY_LEN),
            })
        })?;
        Ok(Self::new(key))
    }

    /// Generate a fresh random key, base64-encoded. Used by the admin CLI.
    pub fn generate_key_base64() -> RenumResult<String> {
        let rng = SystemRandom::new();
        let mut key = [0u8; KEY_LEN];
        rng.fill(&mut key)
            .map_err(|_| RenumError::Vault(VaultError::MissingKey))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(key))
    }

    /// Encrypt opaque secret bytes.
    pub fn seal(&self, plaintext: &[u8]) -> RenumResult<Sealed> {
        let unbound = UnboundKey::new(&AES_128_GCM, &self.key)
            .map_err(|_| RenumError::Vault(VaultError::InvalidCiphertext))?;
        let key = LessSafeKey::new(unbound);

        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| RenumError::Vault(VaultError::InvalidCiphertext))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        // Seal in place: the buffer is extended with the authentication tag.
        let mut in_out = plaintext.to_vec();
        key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| RenumError::Vault(VaultError::InvalidCiphertext))?;

        Ok(Sealed {
            ciphertext: in_out,
            nonce: nonce_bytes,
        })
    }

    /// Decrypt a sealed secret.
    ///
    /// `ciphertext` must include the 16-byte tag appended by `seal`. Any
    /// mismatch - wrong key, wrong nonce, tampering - is `InvalidCiphertext`.
    pub fn open(&self, sealed: &Sealed) -> RenumResult<Vec<u8>> {
        let unbound = UnboundKey::new(&AES_128_GCM, &self.key)
            .map_err(|_| RenumError::Vault(VaultError::InvalidCiphertext))?;
        let key = LessSafeKey::new(unbound);
        let nonce = Nonce::assume_unique_for_key(sealed.nonce);

        let mut in_out = sealed.ciphertext.clone();
        let plaintext = key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| RenumError::Vault(VaultError::InvalidCiphertext))?;

        Ok(plaintext.to_vec())
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault").field("key", &"[REDACTED]").finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> Vault {
        Vault::new([7u8; KEY_LEN])
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let vault = vault();
        let plaintext = b"whatsapp api token";
        let sealed = vault.seal(plaintext).unwrap();
        let opened = vault.open(&sealed).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_seal_uses_fresh_nonces() {
        let vault = vault();
        let a = vault.seal(b"same input").unwrap();
        let b = vault.seal(b"same input").unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_ciphertext_includes_tag() {
        let vault = vault();
        let sealed = vault.seal(b"hello").unwrap();
        assert_eq!(sealed.ciphertext.len(), 5 + 16);
    }

    #[test]
    fn test_wrong_key_is_invalid_ciphertext() {
        let sealed = vault().seal(b"secret").unwrap();
        let other = Vault::new([9u8; KEY_LEN]);
        let err = other.open(&sealed).unwrap_err();
        assert!(matches!(
            err,
            RenumError::Vault(VaultError::InvalidCiphertext)
        ));
    }

    #[test]
    fn test_tampered_payload_is_invalid_ciphertext() {
        let vault = vault();
        let mut sealed = vault.seal(b"secret").unwrap();
        sealed.ciphertext[0] ^= 0xFF;
        assert!(vault.open(&sealed).is_err());
    }

    #[test]
    fn test_from_base64_validates_length() {
        let short = base64::engine::general_purpose::STANDARD.encode([1u8; 8]);
        assert!(Vault::from_base64(&short).is_err());

        let exact = base64::engine::general_purpose::STANDARD.encode([1u8; KEY_LEN]);
        assert!(Vault::from_base64(&exact).is_ok());
    }

    #[test]
    fn test_from_base64_rejects_garbage() {
        assert!(Vault::from_base64("not-base64!!!").is_err());
    }

    #[test]
    fn test_generated_key_roundtrips() {
        let encoded = Vault::generate_key_base64().unwrap();
        let vault = Vault::from_base64(&encoded).unwrap();
        let sealed = vault.seal(b"x").unwrap();
        assert_eq!(vault.open(&sealed).unwrap(), b"x");
    }
}
