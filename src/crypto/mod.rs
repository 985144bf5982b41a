//! Cryptographic utilities for the primary (Ethereum) and secondary (Tron) chains

pub mod eth;
pub mod tron;

pub use eth::{
    checksum_address, hash_message, keccak256, normalize_address, parse_address, same_address,
    strip_hex_prefix, to_checksum_address, EthKeyPair, EthSignature,
};
pub use tron::{to_tron_address, TronAddress};
