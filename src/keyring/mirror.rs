//! Secondary-chain address mirror
//!
//! Every primary container maps to a secondary container derived from the
//! same secret: HD containers along the secondary path, single-key
//! containers with the very same keys. Pairs are rebuilt from scratch on
//! every roster recomputation and a container contributes either one pair
//! per primary account or none.

use crate::crypto::tron::{to_tron_address, TronAddress};
use crate::crypto::same_address;
use crate::errors::{KeyringError, Result};
use crate::keyring::container::KeyContainer;
use crate::keyring::hd::HdKeyring;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Secondary chain account path; the account index is appended
pub const SECONDARY_HD_PATH: &str = "m/44'/195'/0'/0";

/// Primary address and the secondary address derived alongside it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossChainPair {
    pub keyring_index: usize,
    pub primary: String,
    pub secondary_hex: String,
    pub secondary: String,
}

/// Secondary addresses of one primary container, in account order
#[derive(Debug, Clone)]
pub struct SecondaryContainer {
    pub keyring_index: usize,
    pub addresses: Vec<TronAddress>,
}

/// Derive the secondary container for `container` at position `keyring_index`.
pub fn derive_secondary_container(
    keyring_index: usize,
    container: &KeyContainer,
    hd_path: &str,
) -> Result<SecondaryContainer> {
    let addresses = match container {
        KeyContainer::Hd(hd) => {
            let secondary = HdKeyring::restore(hd.mnemonic().expose(), hd.len(), hd_path)?;
            secondary
                .accounts()
                .iter()
                .map(|account| secondary_address(account))
                .collect::<Result<Vec<_>>>()?
        }
        KeyContainer::Simple(simple) => simple
            .keys()
            .iter()
            .map(|key| to_tron_address(&key.address()))
            .collect(),
    };

    Ok(SecondaryContainer {
        keyring_index,
        addresses,
    })
}

fn secondary_address(account: &str) -> Result<TronAddress> {
    let bytes = crate::crypto::parse_address(account)?;
    Ok(to_tron_address(&bytes))
}

/// Rebuild every pair. Containers whose secondary derivation fails or
/// disagrees in length with the primary are skipped.
pub fn build_pairs(containers: &[KeyContainer], hd_path: &str) -> Vec<CrossChainPair> {
    let mut pairs = Vec::new();

    for (index, container) in containers.iter().enumerate() {
        let primary = container.accounts();
        let secondary = match derive_secondary_container(index, container, hd_path) {
            Ok(secondary) => secondary,
            Err(e) => {
                warn!("Skipping secondary addresses for keyring {}: {}", index, e);
                continue;
            }
        };

        if let Err(e) = check_counts(index, primary.len(), secondary.addresses.len()) {
            warn!("{}", e);
            continue;
        }

        pairs.extend(
            primary
                .into_iter()
                .zip(secondary.addresses)
                .map(|(primary, address)| CrossChainPair {
                    keyring_index: index,
                    primary,
                    secondary_hex: address.hex,
                    secondary: address.base58,
                }),
        );
    }

    debug!("Rebuilt {} cross-chain pairs", pairs.len());
    pairs
}

fn check_counts(index: usize, primary: usize, secondary: usize) -> Result<()> {
    if primary != secondary {
        return Err(KeyringError::DerivationFailed(format!(
            "keyring {} has {} primary but {} secondary accounts",
            index, primary, secondary
        )));
    }
    Ok(())
}

/// Secondary address for `primary`, or an empty string when unpaired
pub fn find_secondary<'a>(pairs: &'a [CrossChainPair], primary: &str) -> &'a str {
    pairs
        .iter()
        .find(|pair| same_address(&pair.primary, primary))
        .map(|pair| pair.secondary.as_str())
        .unwrap_or("")
}
