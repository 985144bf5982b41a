//! keyring-engine - account lifecycle and signing engine for a browser-style wallet
//!
//! Manages HD and imported key containers behind a single password-encrypted
//! vault, hides removed accounts behind tombstones so they can be restored
//! without re-derivation, mirrors every Ethereum account to a Tron address,
//! and signs messages, typed data and transactions.
//!
//! # Security
//!
//! - The vault is encrypted with AES-256-GCM under an Argon2id-derived key
//! - Decrypted vault plaintext is held in memory-locked pages while parsed
//! - Exported keys, mnemonics and serialized containers are zeroed on drop
//!
//! # Usage
//!
//! ```no_run
//! use keyring_engine::identity::IdentityController;
//! use keyring_engine::keyring::KeyringController;
//! use keyring_engine::vault::{AesGcmEncryptor, KdfParams};
//! use keyring_engine::controller::{ComposableController, ControllerHandle};
//! use std::sync::Arc;
//!
//! # async fn run() -> keyring_engine::Result<()> {
//! let keyring = Arc::new(KeyringController::new(
//!     Arc::new(AesGcmEncryptor::new(KdfParams::default())),
//!     Default::default(),
//!     Default::default(),
//! ));
//! let identities = Arc::new(IdentityController::default());
//! let _composed = ComposableController::new(
//!     vec![
//!         ControllerHandle::Keyring(keyring.clone()),
//!         ControllerHandle::Identity(identities),
//!     ],
//!     None,
//! )?;
//!
//! keyring.create_new_vault_and_keychain("password").await?;
//! let account = keyring.add_new_account(0).await?;
//! println!("{} / {}", account, keyring.get_secondary_address(&account));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod crypto;
pub mod errors;
pub mod identity;
pub mod keyring;
pub mod security;
pub mod signer;
pub mod vault;

pub use errors::{EntropyError, ErrorKind, KeyringError, Result};
pub use identity::{IdentityController, IdentityRegistry};
pub use keyring::{AccountImportStrategy, KeyringController, KeyringState};
