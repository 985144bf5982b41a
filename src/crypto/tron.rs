//! Secondary-chain (Tron-style) address encoding
//!
//! Addresses are the same 20-byte keccak tail used on Ethereum, prefixed
//! with `0x41` and rendered as Base58Check.

use crate::errors::{KeyringError, Result};
use sha2::{Digest, Sha256};

/// Network prefix byte for mainnet addresses
pub const ADDRESS_PREFIX: u8 = 0x41;

/// Length of a prefixed address payload
pub const ADDRESS_LEN: usize = 21;

/// Secondary address in both of its renderings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TronAddress {
    /// `0x41` followed by the 20 address bytes, lowercase hex
    pub hex: String,
    /// Base58Check encoding
    pub base58: String,
}

fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Base58Check: payload || sha256(sha256(payload))[0..4]
pub fn encode_base58check(payload: &[u8]) -> String {
    let checksum = double_sha256(payload);
    let mut bytes = Vec::with_capacity(payload.len() + 4);
    bytes.extend_from_slice(payload);
    bytes.extend_from_slice(&checksum[..4]);
    bs58::encode(bytes).into_string()
}

/// Decode and verify a Base58Check string, returning the payload
pub fn decode_base58check(encoded: &str) -> Result<Vec<u8>> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| KeyringError::InvalidKeyFormat(format!("Invalid base58: {}", e)))?;

    if bytes.len() < 5 {
        return Err(KeyringError::InvalidKeyFormat(
            "Base58Check payload too short".to_string(),
        ));
    }

    let (payload, checksum) = bytes.split_at(bytes.len() - 4);
    if double_sha256(payload)[..4] != *checksum {
        return Err(KeyringError::InvalidKeyFormat(
            "Base58Check checksum mismatch".to_string(),
        ));
    }

    Ok(payload.to_vec())
}

/// Encode a 20-byte account address as a secondary-chain address
pub fn to_tron_address(address: &[u8; 20]) -> TronAddress {
    let mut payload = [0u8; ADDRESS_LEN];
    payload[0] = ADDRESS_PREFIX;
    payload[1..].copy_from_slice(address);

    TronAddress {
        hex: format!("0x{}", hex::encode(payload)),
        base58: encode_base58check(&payload),
    }
}

/// Parse a Base58Check secondary address back into its 20 account bytes
pub fn parse_tron_address(encoded: &str) -> Result<[u8; 20]> {
    let payload = decode_base58check(encoded)?;
    if payload.len() != ADDRESS_LEN || payload[0] != ADDRESS_PREFIX {
        return Err(KeyringError::InvalidKeyFormat(format!(
            "Not a secondary-chain address: {}",
            encoded
        )));
    }

    let mut address = [0u8; 20];
    address.copy_from_slice(&payload[1..]);
    Ok(address)
}
