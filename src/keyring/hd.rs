//! Hierarchical deterministic key container (BIP-39 mnemonic, BIP-32 path)

use crate::crypto::{same_address, EthKeyPair};
use crate::errors::{KeyringError, Result};
use crate::security::SecureString;
use bip32::{ChildNumber, DerivationPath, XPrv};
use bip39::Mnemonic;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Primary chain account path; the account index is appended
pub const DEFAULT_HD_PATH: &str = "m/44'/60'/0'/0";

/// Entropy for freshly generated 12-word mnemonics
const MNEMONIC_ENTROPY_BYTES: usize = 16;

/// Keys derived from one mnemonic along one base path
#[derive(Clone)]
pub struct HdKeyring {
    mnemonic: SecureString,
    hd_path: String,
    root: XPrv,
    keys: Vec<EthKeyPair>,
}

impl fmt::Debug for HdKeyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdKeyring")
            .field("hd_path", &self.hd_path)
            .field("accounts", &self.accounts())
            .finish()
    }
}

/// Collapse whitespace so pasted phrases parse the same way
pub fn normalize_mnemonic(phrase: &str) -> String {
    phrase.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn parse_derivation_path(path: &str) -> Result<DerivationPath> {
    DerivationPath::from_str(path)
        .map_err(|e| KeyringError::DerivationFailed(format!("Invalid path '{}': {}", path, e)))
}

/// Generate a new random 12-word mnemonic
pub fn generate_mnemonic() -> Result<SecureString> {
    let mut entropy = Zeroizing::new([0u8; MNEMONIC_ENTROPY_BYTES]);
    rand::rngs::OsRng.fill_bytes(&mut entropy[..]);
    mnemonic_from_entropy(&entropy[..])
}

pub fn mnemonic_from_entropy(entropy: &[u8]) -> Result<SecureString> {
    let mnemonic = Mnemonic::from_entropy(entropy)
        .map_err(|e| KeyringError::InvalidMnemonic(e.to_string()))?;
    Ok(SecureString::new(mnemonic.to_string()))
}

impl HdKeyring {
    /// Fresh mnemonic with one account
    pub fn generate(hd_path: &str) -> Result<Self> {
        let mnemonic = generate_mnemonic()?;
        Self::restore(mnemonic.expose(), 1, hd_path)
    }

    /// Rebuild from a mnemonic, deriving the first `number_of_accounts` keys
    pub fn restore(phrase: &str, number_of_accounts: usize, hd_path: &str) -> Result<Self> {
        let mut keyring = Self::from_mnemonic(phrase, hd_path)?;
        keyring.add_accounts(number_of_accounts)?;
        Ok(keyring)
    }

    /// Container with no accounts yet
    pub fn from_mnemonic(phrase: &str, hd_path: &str) -> Result<Self> {
        let normalized = SecureString::new(normalize_mnemonic(phrase));
        let mnemonic = Mnemonic::parse(normalized.expose())
            .map_err(|e| KeyringError::InvalidMnemonic(e.to_string()))?;

        let seed = Zeroizing::new(mnemonic.to_seed(""));
        let mut root = XPrv::new(&seed[..])
            .map_err(|e| KeyringError::DerivationFailed(format!("Master key: {}", e)))?;

        for child in parse_derivation_path(hd_path)? {
            root = root
                .derive_child(child)
                .map_err(|e| KeyringError::DerivationFailed(e.to_string()))?;
        }

        Ok(Self {
            mnemonic: normalized,
            hd_path: hd_path.to_string(),
            root,
            keys: Vec::new(),
        })
    }

    fn derive_index(&self, index: u32) -> Result<EthKeyPair> {
        let child_number = ChildNumber::new(index, false)
            .map_err(|e| KeyringError::DerivationFailed(format!("Invalid index {}: {}", index, e)))?;
        let child = self
            .root
            .derive_child(child_number)
            .map_err(|e| KeyringError::DerivationFailed(e.to_string()))?;

        let key_bytes: Zeroizing<[u8; 32]> = Zeroizing::new(child.private_key().to_bytes().into());
        EthKeyPair::from_bytes(&key_bytes[..])
    }

    /// Derive the next `count` indices, returning their checksummed addresses
    pub fn add_accounts(&mut self, count: usize) -> Result<Vec<String>> {
        let mut added = Vec::with_capacity(count);
        for _ in 0..count {
            let index = u32::try_from(self.keys.len())
                .map_err(|_| KeyringError::DerivationFailed("Account index overflow".into()))?;
            let key = self.derive_index(index)?;
            added.push(key.address_checksum());
            self.keys.push(key);
        }
        Ok(added)
    }

    pub fn accounts(&self) -> Vec<String> {
        self.keys.iter().map(EthKeyPair::address_checksum).collect()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn mnemonic(&self) -> &SecureString {
        &self.mnemonic
    }

    pub fn hd_path(&self) -> &str {
        &self.hd_path
    }

    pub fn key_for(&self, address: &str) -> Option<&EthKeyPair> {
        self.keys
            .iter()
            .find(|key| same_address(&key.address_checksum(), address))
    }
}

#[cfg(test)]
impl HdKeyring {
    /// Append a key that was not derived from this mnemonic
    pub(crate) fn push_foreign_key(&mut self, key: EthKeyPair) {
        self.keys.push(key);
    }
}

#[cfg(test)]
pub(crate) const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";
