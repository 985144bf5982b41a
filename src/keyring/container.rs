//! Key containers owned by the keyring manager and their vault form

use crate::crypto::EthKeyPair;
use crate::errors::{KeyringError, Result};
use crate::keyring::hd::{HdKeyring, DEFAULT_HD_PATH};
use crate::keyring::simple::SimpleKeyring;
use crate::security::{SecureBytes, SecureString};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Container kind as it appears in state and in the vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyringKind {
    #[serde(rename = "HD Key Tree")]
    Hd,
    #[serde(rename = "Simple Key Pair")]
    Simple,
}

impl KeyringKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyringKind::Hd => "HD Key Tree",
            KeyringKind::Simple => "Simple Key Pair",
        }
    }
}

impl fmt::Display for KeyringKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vault entry for one container
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SerializedKeyring {
    #[serde(rename = "HD Key Tree", rename_all = "camelCase")]
    Hd {
        mnemonic: String,
        number_of_accounts: usize,
        hd_path: String,
    },
    #[serde(rename = "Simple Key Pair")]
    Simple(Vec<String>),
}

impl Drop for SerializedKeyring {
    fn drop(&mut self) {
        match self {
            SerializedKeyring::Hd { mnemonic, .. } => mnemonic.zeroize(),
            SerializedKeyring::Simple(keys) => keys.iter_mut().for_each(|k| k.zeroize()),
        }
    }
}

#[derive(Clone, Debug)]
pub enum KeyContainer {
    Hd(HdKeyring),
    Simple(SimpleKeyring),
}

impl KeyContainer {
    pub fn kind(&self) -> KeyringKind {
        match self {
            KeyContainer::Hd(_) => KeyringKind::Hd,
            KeyContainer::Simple(_) => KeyringKind::Simple,
        }
    }

    /// All accounts, checksummed, in derivation/import order
    pub fn accounts(&self) -> Vec<String> {
        match self {
            KeyContainer::Hd(hd) => hd.accounts(),
            KeyContainer::Simple(simple) => simple.accounts(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            KeyContainer::Hd(hd) => hd.len(),
            KeyContainer::Simple(simple) => simple.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn key_for(&self, address: &str) -> Option<&EthKeyPair> {
        match self {
            KeyContainer::Hd(hd) => hd.key_for(address),
            KeyContainer::Simple(simple) => simple.key_for(address),
        }
    }

    pub fn owns(&self, address: &str) -> bool {
        self.key_for(address).is_some()
    }

    pub fn export_key(&self, address: &str) -> Result<SecureBytes> {
        self.key_for(address)
            .map(EthKeyPair::private_key_bytes)
            .ok_or_else(|| KeyringError::AccountNotFound {
                address: address.to_string(),
            })
    }

    pub fn mnemonic(&self) -> Option<&SecureString> {
        match self {
            KeyContainer::Hd(hd) => Some(hd.mnemonic()),
            KeyContainer::Simple(_) => None,
        }
    }

    pub fn serialize(&self) -> SerializedKeyring {
        match self {
            KeyContainer::Hd(hd) => SerializedKeyring::Hd {
                mnemonic: hd.mnemonic().expose().to_string(),
                number_of_accounts: hd.len(),
                hd_path: hd.hd_path().to_string(),
            },
            KeyContainer::Simple(simple) => SerializedKeyring::Simple(
                simple
                    .keys()
                    .iter()
                    .map(|key| hex::encode(key.private_key_bytes().expose()))
                    .collect(),
            ),
        }
    }

    pub fn deserialize(serialized: &SerializedKeyring) -> Result<Self> {
        match serialized {
            SerializedKeyring::Hd {
                mnemonic,
                number_of_accounts,
                hd_path,
            } => {
                let path = if hd_path.is_empty() {
                    DEFAULT_HD_PATH
                } else {
                    hd_path.as_str()
                };
                Ok(KeyContainer::Hd(HdKeyring::restore(
                    mnemonic,
                    *number_of_accounts,
                    path,
                )?))
            }
            SerializedKeyring::Simple(keys) => {
                Ok(KeyContainer::Simple(SimpleKeyring::from_private_keys(keys)?))
            }
        }
    }
}

/// Serialize containers into vault plaintext
pub fn serialize_containers(containers: &[KeyContainer]) -> Result<SecureBytes> {
    let serialized: Vec<SerializedKeyring> = containers.iter().map(KeyContainer::serialize).collect();
    Ok(SecureBytes::new(serde_json::to_vec(&serialized)?))
}

/// Rebuild containers from vault plaintext
pub fn deserialize_containers(plaintext: &[u8]) -> Result<Vec<KeyContainer>> {
    let serialized: Vec<SerializedKeyring> = serde_json::from_slice(plaintext)?;
    serialized.iter().map(KeyContainer::deserialize).collect()
}
