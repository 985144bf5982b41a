//! Typed structured data hashing (EIP-712 and its legacy predecessor)
//!
//! - V1: legacy `[{type, name, value}]` arrays, tightly packed
//! - V3: EIP-712 without arrays, absent fields skipped
//! - V4: EIP-712 with arrays, null structs hash to zero, absent fields rejected

use crate::crypto::{keccak256, strip_hex_prefix};
use crate::errors::{KeyringError, Result};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

const DOMAIN_TYPE: &str = "EIP712Domain";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignTypedDataVersion {
    V1,
    V3,
    V4,
}

impl FromStr for SignTypedDataVersion {
    type Err = KeyringError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "V1" => Ok(Self::V1),
            "V3" => Ok(Self::V3),
            "V4" => Ok(Self::V4),
            other => Err(KeyringError::UnsupportedSigningVersion(other.to_string())),
        }
    }
}

impl fmt::Display for SignTypedDataVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::V1 => "V1",
            Self::V3 => "V3",
            Self::V4 => "V4",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Parsed EIP-712 payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    pub types: BTreeMap<String, Vec<TypedField>>,
    pub primary_type: String,
    #[serde(default)]
    pub domain: Map<String, Value>,
    #[serde(default)]
    pub message: Map<String, Value>,
}

fn invalid(reason: impl Into<String>) -> KeyringError {
    KeyringError::InvalidTypedData(reason.into())
}

/// Hash the payload for `version`. V1 takes the legacy array; V3 and V4
/// take a [`TypedData`] object or its JSON text.
pub fn hash_for_version(data: &Value, version: SignTypedDataVersion) -> Result<[u8; 32]> {
    match version {
        SignTypedDataVersion::V1 => hash_legacy(data),
        SignTypedDataVersion::V3 | SignTypedDataVersion::V4 => {
            let typed: TypedData = match data {
                Value::String(text) => serde_json::from_str(text),
                other => serde_json::from_value(other.clone()),
            }
            .map_err(|e| invalid(e.to_string()))?;
            hash_typed_data(&typed, version == SignTypedDataVersion::V4)
        }
    }
}

/// `keccak256(0x1901 || domainSeparator || hashStruct(message))`
pub fn hash_typed_data(typed: &TypedData, v4: bool) -> Result<[u8; 32]> {
    let mut types = typed.types.clone();
    types.entry(DOMAIN_TYPE.to_string()).or_default();

    if !types.contains_key(&typed.primary_type) {
        return Err(invalid(format!("unknown primary type {}", typed.primary_type)));
    }

    let mut parts = Vec::with_capacity(66);
    parts.extend_from_slice(&[0x19, 0x01]);
    parts.extend_from_slice(&hash_struct(DOMAIN_TYPE, &typed.domain, &types, v4)?);
    if typed.primary_type != DOMAIN_TYPE {
        parts.extend_from_slice(&hash_struct(&typed.primary_type, &typed.message, &types, v4)?);
    }
    Ok(keccak256(&parts))
}

fn base_type(kind: &str) -> &str {
    kind.find('[').map(|i| &kind[..i]).unwrap_or(kind)
}

fn collect_dependencies(
    kind: &str,
    types: &BTreeMap<String, Vec<TypedField>>,
    found: &mut BTreeSet<String>,
) {
    let kind = base_type(kind);
    if found.contains(kind) {
        return;
    }
    let Some(fields) = types.get(kind) else {
        return;
    };
    found.insert(kind.to_string());
    for field in fields {
        collect_dependencies(&field.kind, types, found);
    }
}

/// `Primary(type name,...)` followed by its dependencies in name order
pub fn encode_type(primary: &str, types: &BTreeMap<String, Vec<TypedField>>) -> Result<String> {
    let fields = types
        .get(primary)
        .ok_or_else(|| invalid(format!("unknown type {}", primary)))?;

    let mut deps = BTreeSet::new();
    for field in fields {
        collect_dependencies(&field.kind, types, &mut deps);
    }
    deps.remove(primary);

    let mut out = String::new();
    for name in std::iter::once(primary).chain(deps.iter().map(String::as_str)) {
        let members: Vec<String> = types[name]
            .iter()
            .map(|f| format!("{} {}", f.kind, f.name))
            .collect();
        out.push_str(&format!("{}({})", name, members.join(",")));
    }
    Ok(out)
}

pub fn type_hash(primary: &str, types: &BTreeMap<String, Vec<TypedField>>) -> Result<[u8; 32]> {
    Ok(keccak256(encode_type(primary, types)?.as_bytes()))
}

pub fn hash_struct(
    primary: &str,
    data: &Map<String, Value>,
    types: &BTreeMap<String, Vec<TypedField>>,
    v4: bool,
) -> Result<[u8; 32]> {
    Ok(keccak256(&encode_data(primary, data, types, v4)?))
}

fn encode_data(
    primary: &str,
    data: &Map<String, Value>,
    types: &BTreeMap<String, Vec<TypedField>>,
    v4: bool,
) -> Result<Vec<u8>> {
    let fields = types
        .get(primary)
        .ok_or_else(|| invalid(format!("unknown type {}", primary)))?;

    let mut out = Vec::with_capacity(32 * (fields.len() + 1));
    out.extend_from_slice(&type_hash(primary, types)?);

    for field in fields {
        let value = data.get(&field.name);
        if v4 {
            out.extend_from_slice(&encode_field_v4(types, &field.name, &field.kind, value)?);
        } else if let Some(value) = value {
            out.extend_from_slice(&encode_field_v3(types, &field.name, &field.kind, value)?);
        }
    }
    Ok(out)
}

fn as_struct<'a>(name: &str, value: &'a Value) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| invalid(format!("field {} is not a struct", name)))
}

fn encode_field_v3(
    types: &BTreeMap<String, Vec<TypedField>>,
    name: &str,
    kind: &str,
    value: &Value,
) -> Result<[u8; 32]> {
    if types.contains_key(kind) {
        return hash_struct(kind, as_struct(name, value)?, types, false);
    }
    if kind.ends_with(']') {
        return Err(invalid("arrays are not supported before V4"));
    }
    encode_dynamic_or_atomic(name, kind, value)
}

fn encode_field_v4(
    types: &BTreeMap<String, Vec<TypedField>>,
    name: &str,
    kind: &str,
    value: Option<&Value>,
) -> Result<[u8; 32]> {
    if types.contains_key(kind) {
        return match value {
            None | Some(Value::Null) => Ok([0u8; 32]),
            Some(value) => hash_struct(kind, as_struct(name, value)?, types, true),
        };
    }

    let value = value.ok_or_else(|| invalid(format!("missing value for field {} of type {}", name, kind)))?;

    if let Some(open) = kind.rfind('[') {
        let element = &kind[..open];
        let items = value
            .as_array()
            .ok_or_else(|| invalid(format!("field {} is not an array", name)))?;
        let mut encoded = Vec::with_capacity(32 * items.len());
        for item in items {
            encoded.extend_from_slice(&encode_field_v4(types, name, element, Some(item))?);
        }
        return Ok(keccak256(&encoded));
    }

    encode_dynamic_or_atomic(name, kind, value)
}

fn encode_dynamic_or_atomic(name: &str, kind: &str, value: &Value) -> Result<[u8; 32]> {
    match kind {
        "bytes" => Ok(keccak256(&value_bytes(name, value)?)),
        "string" => {
            let text = value
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string());
            Ok(keccak256(text.as_bytes()))
        }
        _ => encode_atomic(name, kind, value),
    }
}

/// Bit width of `uintN`/`intN`; bare `uint`/`int` mean 256
fn int_width(kind: &str, prefix: &str) -> Result<Option<usize>> {
    let Some(rest) = kind.strip_prefix(prefix) else {
        return Ok(None);
    };
    if rest.is_empty() {
        return Ok(Some(256));
    }
    let bits: usize = rest
        .parse()
        .map_err(|_| invalid(format!("unknown type {}", kind)))?;
    if bits == 0 || bits > 256 || bits % 8 != 0 {
        return Err(invalid(format!("invalid integer width in {}", kind)));
    }
    Ok(Some(bits))
}

/// Fixed-size `bytesN` width
fn bytes_width(kind: &str) -> Result<Option<usize>> {
    let Some(rest) = kind.strip_prefix("bytes") else {
        return Ok(None);
    };
    let size: usize = rest
        .parse()
        .map_err(|_| invalid(format!("unknown type {}", kind)))?;
    if size == 0 || size > 32 {
        return Err(invalid(format!("invalid bytes width in {}", kind)));
    }
    Ok(Some(size))
}

/// ABI-encode one static value into a 32-byte word
fn encode_atomic(name: &str, kind: &str, value: &Value) -> Result<[u8; 32]> {
    let mut word = [0u8; 32];

    if kind == "address" {
        let bytes = address_bytes(name, value)?;
        word[12..].copy_from_slice(&bytes);
        return Ok(word);
    }

    if kind == "bool" {
        word[31] = u8::from(truthy(value));
        return Ok(word);
    }

    if let Some(size) = bytes_width(kind)? {
        let bytes = value_bytes(name, value)?;
        if bytes.len() > size {
            return Err(invalid(format!("field {} exceeds {} bytes", name, size)));
        }
        word[..bytes.len()].copy_from_slice(&bytes);
        return Ok(word);
    }

    if let Some(bits) = int_width(kind, "uint")? {
        let (negative, magnitude) = parse_integer(name, value)?;
        if negative && !magnitude.is_zero() {
            return Err(invalid(format!("field {} must be unsigned", name)));
        }
        if bits < 256 && magnitude.bits() > bits {
            return Err(invalid(format!("field {} overflows {}", name, kind)));
        }
        magnitude.to_big_endian(&mut word);
        return Ok(word);
    }

    if let Some(bits) = int_width(kind, "int")? {
        let (negative, magnitude) = parse_integer(name, value)?;
        if magnitude.bits() > bits {
            return Err(invalid(format!("field {} overflows {}", name, kind)));
        }
        twos_complement(negative, magnitude).to_big_endian(&mut word);
        return Ok(word);
    }

    Err(invalid(format!("unsupported type {} for field {}", kind, name)))
}

fn twos_complement(negative: bool, magnitude: U256) -> U256 {
    if negative && !magnitude.is_zero() {
        (!magnitude).overflowing_add(U256::one()).0
    } else {
        magnitude
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Parse a JSON number or a decimal / `0x` hex string into sign and magnitude
fn parse_integer(name: &str, value: &Value) -> Result<(bool, U256)> {
    let bad = || invalid(format!("field {} is not an integer", name));

    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Ok((false, U256::from(u)))
            } else if let Some(i) = n.as_i64() {
                Ok((i < 0, U256::from(i.unsigned_abs())))
            } else {
                Err(bad())
            }
        }
        Value::String(s) => {
            let s = s.trim();
            let (negative, digits) = match s.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, s),
            };
            let magnitude = if digits.starts_with("0x") || digits.starts_with("0X") {
                U256::from_str_radix(strip_hex_prefix(digits), 16).map_err(|_| bad())?
            } else {
                U256::from_dec_str(digits).map_err(|_| bad())?
            };
            Ok((negative, magnitude))
        }
        _ => Err(bad()),
    }
}

fn value_bytes(name: &str, value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::String(s) if s.starts_with("0x") || s.starts_with("0X") => hex::decode(strip_hex_prefix(s))
            .map_err(|_| invalid(format!("field {} is not valid hex", name))),
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .filter(|b| *b <= 0xff)
                    .map(|b| b as u8)
                    .ok_or_else(|| invalid(format!("field {} is not a byte array", name)))
            })
            .collect(),
        _ => Err(invalid(format!("field {} is not bytes", name))),
    }
}

fn address_bytes(name: &str, value: &Value) -> Result<[u8; 20]> {
    let bytes = match value {
        Value::String(_) => value_bytes(name, value)?,
        Value::Number(_) => {
            let (_, magnitude) = parse_integer(name, value)?;
            let mut word = [0u8; 32];
            magnitude.to_big_endian(&mut word);
            word[12..].to_vec()
        }
        _ => return Err(invalid(format!("field {} is not an address", name))),
    };
    if bytes.len() > 20 {
        return Err(invalid(format!("field {} is not an address", name)));
    }
    let mut out = [0u8; 20];
    out[20 - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

/// Tightly packed encoding used by the legacy V1 format
fn solidity_pack(name: &str, kind: &str, value: &Value) -> Result<Vec<u8>> {
    if let Some(open) = kind.rfind('[') {
        let element = &kind[..open];
        let items = value
            .as_array()
            .ok_or_else(|| invalid(format!("field {} is not an array", name)))?;
        let mut out = Vec::with_capacity(32 * items.len());
        for item in items {
            // Array members are padded to full words
            out.extend_from_slice(&encode_atomic(name, element, item)?);
        }
        return Ok(out);
    }

    match kind {
        "string" => Ok(value
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string())
            .into_bytes()),
        "bytes" => value_bytes(name, value),
        "bool" => Ok(vec![u8::from(truthy(value))]),
        "address" => Ok(address_bytes(name, value)?.to_vec()),
        _ => {
            if let Some(size) = bytes_width(kind)? {
                return Ok(encode_atomic(name, kind, value)?[..size].to_vec());
            }
            let bits = match int_width(kind, "uint")? {
                Some(bits) => bits,
                None => int_width(kind, "int")?
                    .ok_or_else(|| invalid(format!("unsupported type {} for field {}", kind, name)))?,
            };
            let word = encode_atomic(name, kind, value)?;
            Ok(word[32 - bits / 8..].to_vec())
        }
    }
}

/// Legacy typed data hash:
/// `keccak(keccak(packed "type name"...) || keccak(packed values...))`
pub fn hash_legacy(data: &Value) -> Result<[u8; 32]> {
    let entries = data
        .as_array()
        .ok_or_else(|| invalid("expected an array of typed values"))?;
    if entries.is_empty() {
        return Err(invalid("expected a non-empty array"));
    }

    let mut schema = Vec::new();
    let mut values = Vec::new();
    for entry in entries {
        let kind = entry
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("typed value without a type"))?;
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("typed value without a name"))?;
        let value = entry.get("value").unwrap_or(&Value::Null);

        schema.extend_from_slice(format!("{} {}", kind, name).as_bytes());
        values.extend_from_slice(&solidity_pack(name, kind, value)?);
    }

    let mut parts = Vec::with_capacity(64);
    parts.extend_from_slice(&keccak256(&schema));
    parts.extend_from_slice(&keccak256(&values));
    Ok(keccak256(&parts))
}

#[cfg(test)]
pub(crate) fn mail_typed_data_v3() -> Value {
    serde_json::json!({
        "types": {
            "EIP712Domain": [
                { "name": "name", "type": "string" },
                { "name": "version", "type": "string" },
                { "name": "chainId", "type": "uint256" },
                { "name": "verifyingContract", "type": "address" }
            ],
            "Person": [
                { "name": "name", "type": "string" },
                { "name": "wallet", "type": "address" }
            ],
            "Mail": [
                { "name": "from", "type": "Person" },
                { "name": "to", "type": "Person" },
                { "name": "contents", "type": "string" }
            ]
        },
        "primaryType": "Mail",
        "domain": {
            "name": "Ether Mail",
            "version": "1",
            "chainId": 1,
            "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
        },
        "message": {
            "from": { "name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826" },
            "to": { "name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB" },
            "contents": "Hello, Bob!"
        }
    })
}
