//! Key containers and the keyring manager
//!
//! - [`HdKeyring`]: BIP-39 mnemonic with sequential BIP-32 accounts
//! - [`SimpleKeyring`]: independently imported private keys
//! - [`KeyringController`]: vault lifecycle, tombstones, cross-chain mirror
//! - [`EntropyGenerator`]: mnemonic generation from user-supplied samples

pub mod container;
pub mod controller;
pub mod entropy;
pub mod hd;
pub mod json_wallet;
pub mod mirror;
pub mod simple;

pub use container::{KeyContainer, KeyringKind};
pub use controller::{
    AccountImportStrategy, KeyringConfig, KeyringConfigPatch, KeyringController, KeyringState,
    KeyringStatePatch, KeyringSummary, KEYRING_CONTROLLER,
};
pub use entropy::{EntropyGenerator, EntropyProgress};
pub use hd::{HdKeyring, DEFAULT_HD_PATH};
pub use mirror::{CrossChainPair, SECONDARY_HD_PATH};
pub use simple::SimpleKeyring;
