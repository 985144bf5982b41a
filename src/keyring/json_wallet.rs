//! Web3 Secret Storage (V3 JSON keystore) import

use crate::crypto::keccak256;
use crate::errors::{KeyringError, Result};
use crate::security::SecureBytes;
use aes::cipher::{KeyIvInit, StreamCipher};
use serde::Deserialize;
use zeroize::Zeroizing;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

#[derive(Debug, Deserialize)]
struct KeystoreFile {
    version: u32,
    #[serde(alias = "Crypto")]
    crypto: CryptoSection,
}

#[derive(Debug, Deserialize)]
struct CryptoSection {
    cipher: String,
    cipherparams: CipherParams,
    ciphertext: String,
    kdf: String,
    kdfparams: serde_json::Value,
    mac: String,
}

#[derive(Debug, Deserialize)]
struct CipherParams {
    iv: String,
}

#[derive(Debug, Deserialize)]
struct ScryptParams {
    dklen: usize,
    n: u64,
    r: u32,
    p: u32,
    salt: String,
}

#[derive(Debug, Deserialize)]
struct Pbkdf2Params {
    dklen: usize,
    c: u32,
    prf: String,
    salt: String,
}

enum Kdf {
    Scrypt(ScryptParams),
    Pbkdf2(Pbkdf2Params),
}

impl Kdf {
    fn parse(name: &str, params: serde_json::Value) -> Result<Self> {
        match name {
            "scrypt" => Ok(Kdf::Scrypt(
                serde_json::from_value(params).map_err(|e| invalid(e.to_string()))?,
            )),
            "pbkdf2" => Ok(Kdf::Pbkdf2(
                serde_json::from_value(params).map_err(|e| invalid(e.to_string()))?,
            )),
            other => Err(invalid(format!("unsupported kdf {}", other))),
        }
    }
}

fn invalid(reason: impl Into<String>) -> KeyringError {
    KeyringError::InvalidKeyFormat(format!("Invalid JSON keystore: {}", reason.into()))
}

fn derive_key(kdf: &Kdf, password: &str) -> Result<Zeroizing<Vec<u8>>> {
    match kdf {
        Kdf::Scrypt(params) => {
            if params.dklen < 32 || params.n < 2 || !params.n.is_power_of_two() {
                return Err(invalid("unsupported scrypt parameters"));
            }
            let log_n = params.n.trailing_zeros() as u8;
            let scrypt_params = scrypt::Params::new(log_n, params.r, params.p, params.dklen)
                .map_err(|e| invalid(e.to_string()))?;
            let salt = hex::decode(&params.salt)?;
            let mut output = Zeroizing::new(vec![0u8; params.dklen]);
            scrypt::scrypt(password.as_bytes(), &salt, &scrypt_params, &mut output[..])
                .map_err(|e| invalid(e.to_string()))?;
            Ok(output)
        }
        Kdf::Pbkdf2(params) => {
            if params.prf != "hmac-sha256" {
                return Err(invalid(format!("unsupported prf {}", params.prf)));
            }
            if params.dklen < 32 {
                return Err(invalid("derived key too short"));
            }
            let salt = hex::decode(&params.salt)?;
            let mut output = Zeroizing::new(vec![0u8; params.dklen]);
            pbkdf2::pbkdf2_hmac::<sha2::Sha256>(
                password.as_bytes(),
                &salt,
                params.c,
                &mut output[..],
            );
            Ok(output)
        }
    }
}

/// Decrypt a V3 keystore, returning the raw private key.
///
/// A MAC mismatch means the passphrase is wrong and yields `InvalidPassword`.
pub fn decrypt_v3(json: &str, password: &str) -> Result<SecureBytes> {
    let keystore: KeystoreFile =
        serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;

    if keystore.version != 3 {
        return Err(invalid(format!("unsupported version {}", keystore.version)));
    }
    let crypto = keystore.crypto;
    if crypto.cipher != "aes-128-ctr" {
        return Err(invalid(format!("unsupported cipher {}", crypto.cipher)));
    }

    let kdf = Kdf::parse(&crypto.kdf, crypto.kdfparams)?;
    let derived = derive_key(&kdf, password)?;
    let ciphertext = hex::decode(&crypto.ciphertext)?;

    let mut mac_input = Vec::with_capacity(16 + ciphertext.len());
    mac_input.extend_from_slice(&derived[16..32]);
    mac_input.extend_from_slice(&ciphertext);
    let expected_mac = hex::decode(&crypto.mac)?;
    if keccak256(&mac_input)[..] != expected_mac[..] {
        return Err(KeyringError::InvalidPassword);
    }

    let iv = hex::decode(&crypto.cipherparams.iv)?;
    let mut cipher = Aes128Ctr::new_from_slices(&derived[..16], &iv)
        .map_err(|e| invalid(e.to_string()))?;

    let mut plaintext = ciphertext;
    cipher.apply_keystream(&mut plaintext);
    Ok(SecureBytes::new(plaintext))
}

#[cfg(test)]
fn keystore_fixture(kdf: &str, kdfparams: &str, ciphertext: &str, mac: &str) -> String {
    format!(
        r#"{{
            "version": 3,
            "id": "3198bc9c-6672-5ab3-d995-4942343ae5b6",
            "crypto": {{
                "cipher": "aes-128-ctr",
                "cipherparams": {{ "iv": "83dbcc02d8ccb40e466191a123791e0e" }},
                "ciphertext": "{}",
                "kdf": "{}",
                "kdfparams": {},
                "mac": "{}"
            }}
        }}"#,
        ciphertext, kdf, kdfparams, mac
    )
}

#[cfg(test)]
pub(crate) fn scrypt_keystore() -> String {
    keystore_fixture(
        "scrypt",
        r#"{ "dklen": 32, "n": 1024, "r": 8, "p": 1,
             "salt": "ab0c7876052600dd703518d6fc3fe8984592145b591fc8fb5c6d43190334ba19" }"#,
        "b3d61e12c4e25f5da5acb99bd743682748cb793f6d2c051e32d6ffa3571c06be",
        "c89751e783264737d158d303910f900de39014a3e20e63688e0e6c9dc55a4935",
    )
}
