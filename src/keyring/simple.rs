//! Imported single-key container

use crate::crypto::{same_address, EthKeyPair};
use crate::errors::{KeyringError, Result};
use std::fmt;

#[derive(Clone)]
pub struct SimpleKeyring {
    keys: Vec<EthKeyPair>,
}

impl fmt::Debug for SimpleKeyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleKeyring")
            .field("accounts", &self.accounts())
            .finish()
    }
}

impl SimpleKeyring {
    pub fn new(keys: Vec<EthKeyPair>) -> Self {
        Self { keys }
    }

    /// Parse hex private keys (with or without `0x`)
    pub fn from_private_keys<S: AsRef<str>>(private_keys: &[S]) -> Result<Self> {
        let keys = private_keys
            .iter()
            .map(|key| EthKeyPair::from_hex(key.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        if keys.is_empty() {
            return Err(KeyringError::InvalidKeyFormat(
                "Cannot import an empty key".to_string(),
            ));
        }
        Ok(Self { keys })
    }

    pub fn accounts(&self) -> Vec<String> {
        self.keys.iter().map(EthKeyPair::address_checksum).collect()
    }

    pub fn keys(&self) -> &[EthKeyPair] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_for(&self, address: &str) -> Option<&EthKeyPair> {
        self.keys
            .iter()
            .find(|key| same_address(&key.address_checksum(), address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COW_KEY: &str = "c85ef7d79691fe79573b1a7064c19c1a9819ebdbd1faaab1a8ec92344438aaf4";

    #[test]
    fn test_accounts_from_private_key() {
        let keyring = SimpleKeyring::from_private_keys(&[COW_KEY]).unwrap();
        assert_eq!(
            keyring.accounts(),
            vec!["0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"]
        );
    }

    #[test]
    fn test_prefixed_key_is_equivalent() {
        let plain = SimpleKeyring::from_private_keys(&[COW_KEY]).unwrap();
        let prefixed = SimpleKeyring::from_private_keys(&[format!("0x{}", COW_KEY)]).unwrap();
        assert_eq!(plain.accounts(), prefixed.accounts());
    }

    #[test]
    fn test_empty_list_rejected() {
        let result = SimpleKeyring::from_private_keys::<&str>(&[]);
        assert!(matches!(result, Err(KeyringError::InvalidKeyFormat(_))));
    }
}
