//! Ethereum cryptographic utilities
//!
//! Provides:
//! - Key generation and parsing
//! - Raw hash, EIP-191 message and typed-data signing primitives
//! - Address derivation and EIP-55 checksumming

use crate::errors::{KeyringError, Result};
use crate::security::SecureBytes;
use k256::{
    ecdsa::{SigningKey, VerifyingKey},
    SecretKey,
};
use sha3::{Digest, Keccak256};

/// Ethereum key pair
#[derive(Clone)]
pub struct EthKeyPair {
    signing_key: SigningKey,
}

impl EthKeyPair {
    /// Create a new random key pair
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        Self { signing_key }
    }

    /// Create from raw private key bytes (32 bytes)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 32 {
            return Err(KeyringError::InvalidKeyFormat(format!(
                "Expected 32 bytes, got {}",
                bytes.len()
            )));
        }

        // Rejects the zero scalar and values >= the curve order
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|_| KeyringError::InvalidKeyFormat("Not a valid secp256k1 scalar".into()))?;

        let signing_key = SigningKey::from(secret_key);
        Ok(Self { signing_key })
    }

    /// Parse a hex private key, with or without `0x`
    pub fn from_hex(private_key: &str) -> Result<Self> {
        let stripped = strip_hex_prefix(private_key.trim());
        if stripped.is_empty() {
            return Err(KeyringError::InvalidKeyFormat(
                "Cannot import an empty key".to_string(),
            ));
        }
        let bytes = SecureBytes::new(hex::decode(stripped)?);
        Self::from_bytes(bytes.expose())
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Get the public key (uncompressed, 65 bytes with 0x04 prefix)
    pub fn public_key_uncompressed(&self) -> Vec<u8> {
        self.verifying_key().to_encoded_point(false).as_bytes().to_vec()
    }

    /// Get the Ethereum address (20 bytes)
    pub fn address(&self) -> [u8; 20] {
        let pubkey = self.public_key_uncompressed();
        // Skip the 0x04 prefix and hash the remaining 64 bytes
        let hash = Keccak256::digest(&pubkey[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);
        address
    }

    /// Get the checksummed Ethereum address string
    pub fn address_checksum(&self) -> String {
        checksum_address(&self.address())
    }

    /// Sign a 32-byte hash
    pub fn sign_hash(&self, hash: &[u8; 32]) -> Result<EthSignature> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(hash)
            .map_err(|e| KeyringError::SigningFailed(e.to_string()))?;

        Ok(EthSignature {
            r: signature.r().to_bytes().to_vec(),
            s: signature.s().to_bytes().to_vec(),
            v: recovery_id.to_byte(),
        })
    }

    /// Sign a message with EIP-191 personal sign
    pub fn sign_personal_message(&self, message: &[u8]) -> Result<EthSignature> {
        let hash = hash_message(message);
        self.sign_hash(&hash)
    }

    /// Export the private key bytes
    pub fn private_key_bytes(&self) -> SecureBytes {
        SecureBytes::new(self.signing_key.to_bytes().to_vec())
    }
}

/// Ethereum signature with recovery id
#[derive(Debug, Clone)]
pub struct EthSignature {
    pub r: Vec<u8>,
    pub s: Vec<u8>,
    pub v: u8,
}

impl EthSignature {
    /// Get v for legacy signatures (27/28)
    pub fn v_legacy(&self) -> u8 {
        self.v + 27
    }

    /// Get v for EIP-155 transactions
    pub fn v_eip155(&self, chain_id: u64) -> u64 {
        self.v as u64 + 35 + chain_id * 2
    }

    /// `0x`-prefixed r || s || v with v in {27, 28}, as wallets return it
    pub fn to_rpc_hex(&self) -> String {
        let mut sig = [0u8; 65];
        sig[0..32].copy_from_slice(&self.r);
        sig[32..64].copy_from_slice(&self.s);
        sig[64] = self.v_legacy();
        format!("0x{}", hex::encode(sig))
    }
}

/// Hash a message according to EIP-191 (personal sign)
pub fn hash_message(message: &[u8]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// Compute keccak256 hash
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

pub fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Convert an address to checksummed format (EIP-55)
pub fn checksum_address(address: &[u8; 20]) -> String {
    let addr_hex = hex::encode(address);
    let hash = Keccak256::digest(addr_hex.as_bytes());

    let mut result = String::with_capacity(42);
    result.push_str("0x");

    for (i, c) in addr_hex.chars().enumerate() {
        // High nibble for even positions, low nibble for odd
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            result.push(c.to_ascii_uppercase());
        } else {
            result.push(c);
        }
    }

    result
}

/// Parse a hex address string to bytes
pub fn parse_address(addr: &str) -> Result<[u8; 20]> {
    let addr = strip_hex_prefix(addr.trim());

    if addr.len() != 40 {
        return Err(KeyringError::InvalidKeyFormat(format!(
            "Address must be 40 hex chars: {}",
            addr
        )));
    }

    let bytes = hex::decode(addr)?;
    let mut result = [0u8; 20];
    result.copy_from_slice(&bytes);
    Ok(result)
}

/// Normalize any-case address input to its EIP-55 form
pub fn to_checksum_address(addr: &str) -> Result<String> {
    Ok(checksum_address(&parse_address(addr)?))
}

/// Lowercase `0x`-prefixed form used for case-insensitive comparisons
pub fn normalize_address(addr: &str) -> String {
    format!("0x{}", strip_hex_prefix(addr.trim()).to_lowercase())
}

pub fn same_address(a: &str, b: &str) -> bool {
    normalize_address(a) == normalize_address(b)
}

/// Verify an address checksum (EIP-55)
pub fn verify_checksum(addr: &str) -> bool {
    let Ok(bytes) = parse_address(addr) else {
        return false;
    };
    checksum_address(&bytes).trim_start_matches("0x") == strip_hex_prefix(addr.trim())
}
