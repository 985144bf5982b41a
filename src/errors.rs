//! Error types for keyring-engine

use thiserror::Error;

/// Main error type for keyring operations
#[derive(Error, Debug)]
pub enum KeyringError {
    // Password and vault errors
    #[error("Invalid password")]
    InvalidPassword,

    #[error("Cannot unlock without a previous vault")]
    VaultNotFound,

    #[error("Keyring is locked")]
    Locked,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    // Key material errors
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    // Account lifecycle errors
    #[error("The account you are trying to import is a duplicate: {address}")]
    DuplicateAccount { address: String },

    #[error("No keyring found at index {index}")]
    NoKeyringFound { index: usize },

    #[error("Keyring {index} ({kind}) does not support this operation")]
    UnsupportedKeyringOperation { index: usize, kind: String },

    #[error("Unexpected import strategy: '{0}'")]
    UnsupportedImportStrategy(String),

    #[error("Cannot remove the last keyring")]
    LastKeyringRemovalForbidden,

    #[error("Cannot verify an empty keyring")]
    EmptyKeyring,

    #[error("Seed phrase verification failed: {0}")]
    SeedPhraseMismatch(String),

    #[error("Account not found: {address}")]
    AccountNotFound { address: String },

    // Signing errors
    #[error("Unexpected signTypedMessage version: '{0}'")]
    UnsupportedSigningVersion(String),

    #[error("Invalid typed data: {0}")]
    InvalidTypedData(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    // Entropy generator misuse
    #[error(transparent)]
    EntropyGenerator(#[from] EntropyError),

    // Composition errors
    #[error("{controller} must be composed with {required}")]
    MissingController { controller: String, required: String },

    #[error("Listener failed in {controller}: {reason}")]
    ListenerFailed { controller: String, reason: String },

    // Storage errors
    #[error("Storage error: {0}")]
    StorageError(String),

    // Security errors
    #[error("Memory lock failed: {0}")]
    MemoryLockFailed(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Internal errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Misuse of the entropy generator state machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntropyError {
    #[error("reset_entropy_generator must be called before appending samples")]
    NotInitialized,

    #[error("samples have already reached the requested count of {length}")]
    Exhausted { length: usize },
}

/// Fieldless discriminant of [`KeyringError`] for callers that render
/// per-kind messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidPassword,
    VaultNotFound,
    Locked,
    Encryption,
    InvalidKeyFormat,
    InvalidMnemonic,
    Derivation,
    DuplicateAccount,
    NoKeyringFound,
    UnsupportedKeyringOperation,
    UnsupportedImportStrategy,
    LastKeyringRemovalForbidden,
    EmptyKeyring,
    SeedPhraseMismatch,
    AccountNotFound,
    UnsupportedSigningVersion,
    InvalidTypedData,
    Signing,
    EntropyGeneratorMisuse,
    Composition,
    Storage,
    Config,
    Internal,
}

impl KeyringError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KeyringError::InvalidPassword => ErrorKind::InvalidPassword,
            KeyringError::VaultNotFound => ErrorKind::VaultNotFound,
            KeyringError::Locked => ErrorKind::Locked,
            KeyringError::EncryptionFailed(_) | KeyringError::DecryptionFailed(_) => {
                ErrorKind::Encryption
            }
            KeyringError::InvalidKeyFormat(_) => ErrorKind::InvalidKeyFormat,
            KeyringError::InvalidMnemonic(_) => ErrorKind::InvalidMnemonic,
            KeyringError::DerivationFailed(_) => ErrorKind::Derivation,
            KeyringError::DuplicateAccount { .. } => ErrorKind::DuplicateAccount,
            KeyringError::NoKeyringFound { .. } => ErrorKind::NoKeyringFound,
            KeyringError::UnsupportedKeyringOperation { .. } => {
                ErrorKind::UnsupportedKeyringOperation
            }
            KeyringError::UnsupportedImportStrategy(_) => ErrorKind::UnsupportedImportStrategy,
            KeyringError::LastKeyringRemovalForbidden => ErrorKind::LastKeyringRemovalForbidden,
            KeyringError::EmptyKeyring => ErrorKind::EmptyKeyring,
            KeyringError::SeedPhraseMismatch(_) => ErrorKind::SeedPhraseMismatch,
            KeyringError::AccountNotFound { .. } => ErrorKind::AccountNotFound,
            KeyringError::UnsupportedSigningVersion(_) => ErrorKind::UnsupportedSigningVersion,
            KeyringError::InvalidTypedData(_) => ErrorKind::InvalidTypedData,
            KeyringError::SigningFailed(_) => ErrorKind::Signing,
            KeyringError::EntropyGenerator(_) => ErrorKind::EntropyGeneratorMisuse,
            KeyringError::MissingController { .. } | KeyringError::ListenerFailed { .. } => {
                ErrorKind::Composition
            }
            KeyringError::StorageError(_) | KeyringError::MemoryLockFailed(_) => {
                ErrorKind::Storage
            }
            KeyringError::ConfigError(_) => ErrorKind::Config,
            KeyringError::InternalError(_) => ErrorKind::Internal,
        }
    }
}

impl From<std::io::Error> for KeyringError {
    fn from(err: std::io::Error) -> Self {
        KeyringError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for KeyringError {
    fn from(err: serde_json::Error) -> Self {
        KeyringError::StorageError(format!("JSON error: {}", err))
    }
}

impl From<hex::FromHexError> for KeyringError {
    fn from(err: hex::FromHexError) -> Self {
        KeyringError::InvalidKeyFormat(format!("Hex decode error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, KeyringError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = KeyringError::DuplicateAccount {
            address: "0xabc".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::DuplicateAccount);

        let err: KeyringError = EntropyError::NotInitialized.into();
        assert_eq!(err.kind(), ErrorKind::EntropyGeneratorMisuse);
    }

    #[test]
    fn test_hex_error_is_key_format() {
        let err: KeyringError = hex::decode("zz").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::InvalidKeyFormat);
    }
}
