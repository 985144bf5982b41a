//! Signing facade
//!
//! Raw hash, personal message, typed data (V1/V3/V4) and transaction
//! signing. Keys are obtained through [`KeySource`] only after the payload
//! has been validated.

pub mod message;
pub mod transaction;
pub mod typed_data;

pub use message::{
    sign_message, sign_personal_message, sign_transaction, sign_typed_message, KeySource,
    MessageParams, TypedMessageParams,
};
pub use transaction::{
    AccessListItem, Eip1559Transaction, LegacyTransaction, SignedTransaction, Transaction,
};
pub use typed_data::{hash_for_version, hash_legacy, hash_typed_data, SignTypedDataVersion, TypedData};
