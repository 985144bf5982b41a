//! Vault encryption and persistence
//!
//! This module provides:
//! - The [`Encryptor`] capability and its Argon2id/AES-256-GCM default
//! - File storage for the encrypted vault blob

pub mod encryptor;
pub mod storage;

pub use encryptor::{AesGcmEncryptor, Encryptor, KdfParams};
pub use storage::FileVaultStore;
