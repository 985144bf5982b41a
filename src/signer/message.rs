//! Message and transaction signing facade
//!
//! Every entry point validates and hashes its payload first and only then
//! asks the [`KeySource`] for the key of `from`.

use super::transaction::{SignedTransaction, Transaction};
use super::typed_data::{hash_for_version, SignTypedDataVersion};
use crate::crypto::{strip_hex_prefix, EthKeyPair};
use crate::errors::{KeyringError, Result};
use crate::security::SecureBytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Holder of private keys, queried once per signature
pub trait KeySource: Send + Sync {
    fn export_signing_key(&self, address: &str) -> Result<SecureBytes>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageParams {
    pub from: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedMessageParams {
    pub from: String,
    pub data: Value,
}

fn signing_key(source: &dyn KeySource, address: &str) -> Result<EthKeyPair> {
    let secret = source.export_signing_key(address)?;
    EthKeyPair::from_bytes(secret.expose())
}

/// `eth_sign`: sign a raw 32-byte hash given as hex
pub fn sign_message(source: &dyn KeySource, params: &MessageParams) -> Result<String> {
    let bytes = hex::decode(strip_hex_prefix(params.data.trim()))
        .map_err(|e| KeyringError::SigningFailed(format!("message is not hex: {}", e)))?;
    let hash: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        KeyringError::SigningFailed(format!("expected a 32-byte hash, got {} bytes", bytes.len()))
    })?;

    let key = signing_key(source, &params.from)?;
    debug!("Signing raw hash for {}", params.from);
    Ok(key.sign_hash(&hash)?.to_rpc_hex())
}

/// Personal messages arrive as `0x` hex or plain text
fn personal_message_bytes(data: &str) -> Vec<u8> {
    if let Some(hex_body) = data.strip_prefix("0x") {
        if let Ok(bytes) = hex::decode(hex_body) {
            return bytes;
        }
    }
    data.as_bytes().to_vec()
}

/// EIP-191 `personal_sign`
pub fn sign_personal_message(source: &dyn KeySource, params: &MessageParams) -> Result<String> {
    let message = personal_message_bytes(&params.data);
    let key = signing_key(source, &params.from)?;
    debug!("Signing personal message for {}", params.from);
    Ok(key.sign_personal_message(&message)?.to_rpc_hex())
}

/// Sign typed data. `version` is checked and the payload hashed before the
/// key is requested.
pub fn sign_typed_message(
    source: &dyn KeySource,
    params: &TypedMessageParams,
    version: &str,
) -> Result<String> {
    let version: SignTypedDataVersion = version.parse()?;
    let hash = hash_for_version(&params.data, version)?;

    let key = signing_key(source, &params.from)?;
    debug!("Signing typed data {} for {}", version, params.from);
    Ok(key.sign_hash(&hash)?.to_rpc_hex())
}

pub fn sign_transaction(
    source: &dyn KeySource,
    tx: &Transaction,
    from: &str,
) -> Result<SignedTransaction> {
    let key = signing_key(source, from)?;
    let signed = tx.sign(&key)?;
    debug!("Signed transaction {} for {}", signed.hash, from);
    Ok(signed)
}
