//! Ethereum transaction encoding and signing
//!
//! Legacy transactions are signed with EIP-155 replay protection; typed
//! EIP-1559 transactions carry the raw recovery id as `y_parity`.

use crate::crypto::{keccak256, EthKeyPair, EthSignature};
use crate::errors::Result;
use rlp::RlpStream;
use serde::Serialize;

const EIP1559_TX_TYPE: u8 = 0x02;

fn u128_to_be_bytes_trimmed(value: u128) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

fn u64_to_be_bytes_trimmed(value: u64) -> Vec<u8> {
    u128_to_be_bytes_trimmed(value as u128)
}

/// Scalars are RLP integers, so leading zero bytes are dropped
fn scalar_trimmed(value: &[u8]) -> &[u8] {
    let start = value.iter().position(|&b| b != 0).unwrap_or(value.len());
    &value[start..]
}

fn append_destination(stream: &mut RlpStream, to: &Option<[u8; 20]>) {
    match to {
        Some(addr) => stream.append(&addr.as_slice()),
        None => stream.append_empty_data(),
    };
}

/// Legacy Ethereum transaction (pre-EIP-1559)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Option<[u8; 20]>,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    fn append_body(&self, stream: &mut RlpStream) {
        stream.append(&u64_to_be_bytes_trimmed(self.nonce).as_slice());
        stream.append(&u128_to_be_bytes_trimmed(self.gas_price).as_slice());
        stream.append(&u64_to_be_bytes_trimmed(self.gas_limit).as_slice());
        append_destination(stream, &self.to);
        stream.append(&u128_to_be_bytes_trimmed(self.value).as_slice());
        stream.append(&self.data);
    }

    /// RLP encode for signing (EIP-155)
    pub fn rlp_unsigned(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&u64_to_be_bytes_trimmed(self.chain_id).as_slice());
        stream.append_empty_data();
        stream.append_empty_data();
        stream.out().to_vec()
    }

    fn rlp_signed(&self, signature: &EthSignature) -> Vec<u8> {
        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&u64_to_be_bytes_trimmed(signature.v_eip155(self.chain_id)).as_slice());
        stream.append(&scalar_trimmed(&signature.r));
        stream.append(&scalar_trimmed(&signature.s));
        stream.out().to_vec()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessListItem {
    pub address: [u8; 20],
    pub storage_keys: Vec<[u8; 32]>,
}

/// EIP-1559 transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip1559Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    pub to: Option<[u8; 20]>,
    pub value: u128,
    pub data: Vec<u8>,
    pub access_list: Vec<AccessListItem>,
}

impl Eip1559Transaction {
    fn append_body(&self, stream: &mut RlpStream) {
        stream.append(&u64_to_be_bytes_trimmed(self.chain_id).as_slice());
        stream.append(&u64_to_be_bytes_trimmed(self.nonce).as_slice());
        stream.append(&u128_to_be_bytes_trimmed(self.max_priority_fee_per_gas).as_slice());
        stream.append(&u128_to_be_bytes_trimmed(self.max_fee_per_gas).as_slice());
        stream.append(&u64_to_be_bytes_trimmed(self.gas_limit).as_slice());
        append_destination(stream, &self.to);
        stream.append(&u128_to_be_bytes_trimmed(self.value).as_slice());
        stream.append(&self.data);

        stream.begin_list(self.access_list.len());
        for item in &self.access_list {
            stream.begin_list(2);
            stream.append(&item.address.as_slice());
            stream.begin_list(item.storage_keys.len());
            for key in &item.storage_keys {
                stream.append(&key.as_slice());
            }
        }
    }

    pub fn rlp_unsigned(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        typed_envelope(stream.out().as_ref())
    }

    fn rlp_signed(&self, signature: &EthSignature) -> Vec<u8> {
        let mut stream = RlpStream::new_list(12);
        self.append_body(&mut stream);
        stream.append(&u64_to_be_bytes_trimmed(signature.v as u64).as_slice());
        stream.append(&scalar_trimmed(&signature.r));
        stream.append(&scalar_trimmed(&signature.s));
        typed_envelope(stream.out().as_ref())
    }
}

fn typed_envelope(payload: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(payload.len() + 1);
    result.push(EIP1559_TX_TYPE);
    result.extend_from_slice(payload);
    result
}

/// Unsigned transaction handed to the signing facade
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Legacy(LegacyTransaction),
    Eip1559(Eip1559Transaction),
}

impl Transaction {
    pub fn chain_id(&self) -> u64 {
        match self {
            Transaction::Legacy(tx) => tx.chain_id,
            Transaction::Eip1559(tx) => tx.chain_id,
        }
    }

    pub fn signing_hash(&self) -> [u8; 32] {
        match self {
            Transaction::Legacy(tx) => keccak256(&tx.rlp_unsigned()),
            Transaction::Eip1559(tx) => keccak256(&tx.rlp_unsigned()),
        }
    }

    pub fn sign(&self, key: &EthKeyPair) -> Result<SignedTransaction> {
        let signature = key.sign_hash(&self.signing_hash())?;
        let raw = match self {
            Transaction::Legacy(tx) => tx.rlp_signed(&signature),
            Transaction::Eip1559(tx) => tx.rlp_signed(&signature),
        };
        let hash = keccak256(&raw);

        Ok(SignedTransaction {
            raw_transaction: format!("0x{}", hex::encode(&raw)),
            hash: format!("0x{}", hex::encode(hash)),
        })
    }
}

impl From<LegacyTransaction> for Transaction {
    fn from(tx: LegacyTransaction) -> Self {
        Transaction::Legacy(tx)
    }
}

impl From<Eip1559Transaction> for Transaction {
    fn from(tx: Eip1559Transaction) -> Self {
        Transaction::Eip1559(tx)
    }
}

/// Broadcast-ready encoding and its hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    pub raw_transaction: String,
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    // EIP-155 example signer
    fn eip155_key() -> EthKeyPair {
        EthKeyPair::from_hex(&"46".repeat(32)).unwrap()
    }

    fn eip155_tx() -> LegacyTransaction {
        LegacyTransaction {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas_limit: 21_000,
            to: Some([0x35; 20]),
            value: 1_000_000_000_000_000_000,
            data: vec![],
            chain_id: 1,
        }
    }

    #[test]
    fn test_eip155_signing_hash() {
        let tx: Transaction = eip155_tx().into();
        assert_eq!(
            hex::encode(tx.signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
    }

    #[test]
    fn test_eip155_signed_encoding() {
        let tx: Transaction = eip155_tx().into();
        let signed = tx.sign(&eip155_key()).unwrap();
        assert_eq!(
            signed.raw_transaction,
            "0xf86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
        assert_eq!(signed.hash.len(), 66);
    }

    #[test]
    fn test_eip1559_signed_encoding() {
        let tx: Transaction = Eip1559Transaction {
            chain_id: 1,
            nonce: 0,
            max_priority_fee_per_gas: 2_000_000_000,
            max_fee_per_gas: 30_000_000_000,
            gas_limit: 21_000,
            to: Some([0x35; 20]),
            value: 1_000_000_000_000_000_000,
            data: vec![],
            access_list: vec![],
        }
        .into();

        assert_eq!(
            hex::encode(tx.signing_hash()),
            "d0250a2f7a06e191244626281fb023335ebeebd3503601f9d2192460b8b0a37d"
        );

        let signed = tx.sign(&eip155_key()).unwrap();
        assert_eq!(
            signed.raw_transaction,
            "0x02f873018084773594008506fc23ac00825208943535353535353535353535353535353535353535880de0b6b3a764000080c001a0829525dceb1901a95153c0762c65162a51ef1e52f1e3db3db5e180aeb162807ea01266d552e7118abffd4e0c1d060ba1d96f2f8ad87caf73ebae55e868db89f4d5"
        );
        assert_eq!(
            signed.hash,
            "0x734977895a908175370a4a63884adddaf76d8fb79bbdbe0867d839e745396f93"
        );
    }

    #[test]
    fn test_contract_creation_has_empty_destination() {
        let mut tx = eip155_tx();
        tx.to = None;
        let encoded = tx.rlp_unsigned();
        // nonce, gas price, gas limit, then the empty `to` string
        assert!(encoded.windows(4).any(|w| w == [0x82, 0x52, 0x08, 0x80]));
    }

    #[test]
    fn test_trimmed_integers() {
        assert!(u64_to_be_bytes_trimmed(0).is_empty());
        assert_eq!(u128_to_be_bytes_trimmed(0x0100), vec![0x01, 0x00]);
        assert_eq!(scalar_trimmed(&[0, 0, 7]), &[7]);
    }
}
