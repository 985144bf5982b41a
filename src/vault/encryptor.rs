//! Vault encryption
//!
//! The keyring hands serialized containers to an [`Encryptor`] and keeps
//! only the opaque blob it returns. [`AesGcmEncryptor`] is the default:
//! AES-256-GCM with an Argon2id derived key.

use crate::errors::{KeyringError, Result};
use crate::security::SecureBytes;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Salt size for Argon2
const SALT_SIZE: usize = 16;

/// Nonce size for AES-GCM
const NONCE_SIZE: usize = 12;

const ENVELOPE_VERSION: u32 = 1;

/// Turns `(password, plaintext)` into an opaque vault and back.
pub trait Encryptor: Send + Sync {
    fn encrypt(&self, password: &str, plaintext: &[u8]) -> Result<String>;

    /// Fails with `InvalidPassword` when authentication fails and with
    /// `DecryptionFailed` when the envelope itself is damaged
    fn decrypt(&self, password: &str, vault: &str) -> Result<SecureBytes>;
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65536, // 64 MB
            iterations: 3,
            parallelism: 4,
        }
    }
}

/// Serialized vault format
#[derive(Debug, Serialize, Deserialize)]
struct VaultEnvelope {
    version: u32,
    kdf: KdfParams,
    /// base64
    salt: String,
    /// base64
    nonce: String,
    /// base64
    ciphertext: String,
}

#[derive(Debug, Clone, Default)]
pub struct AesGcmEncryptor {
    params: KdfParams,
}

impl AesGcmEncryptor {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> KdfParams {
        self.params
    }
}

/// Derive an encryption key from a password using Argon2id
fn derive_key(password: &str, salt: &[u8], kdf: &KdfParams) -> Result<[u8; 32]> {
    let params = Params::new(kdf.memory_kib, kdf.iterations, kdf.parallelism, Some(32))
        .map_err(|e| KeyringError::EncryptionFailed(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut output)
        .map_err(|e| KeyringError::EncryptionFailed(e.to_string()))?;

    Ok(output)
}

fn decode_field(field: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| KeyringError::DecryptionFailed(format!("Invalid {}: {}", field, e)))
}

impl Encryptor for AesGcmEncryptor {
    fn encrypt(&self, password: &str, plaintext: &[u8]) -> Result<String> {
        if password.is_empty() {
            return Err(KeyringError::EncryptionFailed(
                "Password must not be empty".to_string(),
            ));
        }

        let mut salt = [0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut key = derive_key(password, &salt, &self.params)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| KeyringError::EncryptionFailed(e.to_string()));
        key.zeroize();

        let ciphertext = cipher?
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| KeyringError::EncryptionFailed(e.to_string()))?;

        let envelope = VaultEnvelope {
            version: ENVELOPE_VERSION,
            kdf: self.params,
            salt: STANDARD.encode(salt),
            nonce: STANDARD.encode(nonce),
            ciphertext: STANDARD.encode(ciphertext),
        };

        Ok(serde_json::to_string(&envelope)?)
    }

    fn decrypt(&self, password: &str, vault: &str) -> Result<SecureBytes> {
        let envelope: VaultEnvelope = serde_json::from_str(vault)
            .map_err(|e| KeyringError::DecryptionFailed(format!("Malformed vault: {}", e)))?;

        if envelope.version != ENVELOPE_VERSION {
            return Err(KeyringError::DecryptionFailed(format!(
                "Unsupported vault version {}",
                envelope.version
            )));
        }

        let salt = decode_field("salt", &envelope.salt)?;
        let nonce = decode_field("nonce", &envelope.nonce)?;
        let ciphertext = decode_field("ciphertext", &envelope.ciphertext)?;
        if nonce.len() != NONCE_SIZE {
            return Err(KeyringError::DecryptionFailed("Invalid nonce length".to_string()));
        }

        // Vaults carry their own cost parameters
        let mut key = derive_key(password, &salt, &envelope.kdf)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| KeyringError::DecryptionFailed(e.to_string()));
        key.zeroize();

        let plaintext = cipher?
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| KeyringError::InvalidPassword)?;

        Ok(SecureBytes::new(plaintext))
    }
}

#[cfg(test)]
pub(crate) fn test_encryptor() -> AesGcmEncryptor {
    AesGcmEncryptor::new(KdfParams {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_encrypt_decrypt() {
        let encryptor = test_encryptor();
        let vault = encryptor.encrypt("test_password_123", b"[containers]").unwrap();

        let decrypted = encryptor.decrypt("test_password_123", &vault).unwrap();
        assert_eq!(decrypted.expose(), b"[containers]");
        assert!(!vault.contains("containers"));
    }

    #[test]
    fn test_wrong_password() {
        let encryptor = test_encryptor();
        let vault = encryptor.encrypt("correct_password", b"secret").unwrap();

        let result = encryptor.decrypt("wrong_password", &vault);
        assert!(matches!(result, Err(KeyringError::InvalidPassword)));
    }

    #[test]
    fn test_empty_password_rejected() {
        let result = test_encryptor().encrypt("", b"secret");
        assert!(matches!(result, Err(KeyringError::EncryptionFailed(_))));
    }

    #[test]
    fn test_vault_params_travel_with_blob() {
        let vault = test_encryptor().encrypt("pw", b"secret").unwrap();
        // A differently configured encryptor still opens it
        let other = AesGcmEncryptor::new(KdfParams {
            memory_kib: 2048,
            iterations: 2,
            parallelism: 1,
        });
        assert_eq!(other.decrypt("pw", &vault).unwrap().expose(), b"secret");
    }

    #[test]
    fn test_damaged_envelope_is_not_a_password_error() {
        let vault = test_encryptor().encrypt("pw", b"secret").unwrap();
        let mut envelope: serde_json::Value = serde_json::from_str(&vault).unwrap();
        envelope["nonce"] = serde_json::Value::String("***".to_string());

        let result = test_encryptor().decrypt("pw", &envelope.to_string());
        let err = result.unwrap_err();
        assert!(matches!(err, KeyringError::DecryptionFailed(_)));
        assert_eq!(err.kind(), ErrorKind::Encryption);
    }

    #[test]
    fn test_malformed_vault() {
        let result = test_encryptor().decrypt("pw", "not json");
        assert!(matches!(result, Err(KeyringError::DecryptionFailed(_))));
    }
}
