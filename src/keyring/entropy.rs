//! Physical entropy augmentation for mnemonic generation
//!
//! Touch coordinates (or any other externally observed samples) are
//! folded into two chained SHA-256 digests. Once the requested number of
//! samples is collected, half of the mnemonic entropy comes from the OS
//! RNG and half from the digests.

use crate::errors::{EntropyError, Result};
use crate::keyring::hd::mnemonic_from_entropy;
use rand::RngCore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Bytes of OS randomness in the final entropy
const RANDOM_BYTES: usize = 8;

/// Bytes taken from each digest
const DIGEST_BYTES: usize = 4;

/// Snapshot returned after each sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntropyProgress {
    /// Samples collected so far
    pub count: usize,
    /// Samples requested
    pub length: usize,
    /// `h0 || h1` as 64 uppercase hex bytes
    pub true_random: Vec<String>,
    /// Set once `count == length`
    pub mnemonic: Option<String>,
}

enum Phase {
    Idle,
    Collecting,
    Ready,
}

pub struct EntropyGenerator {
    phase: Phase,
    length: usize,
    samples: Zeroizing<Vec<u8>>,
}

impl Default for EntropyGenerator {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            length: 0,
            samples: Zeroizing::new(Vec::new()),
        }
    }
}

/// Reduce a coordinate to one byte: truncate toward zero, then wrap into 0..=255
pub fn sample_byte(value: f64) -> u8 {
    (value.trunc() as i64).rem_euclid(256) as u8
}

impl EntropyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start collecting `length` samples, discarding any previous ones.
    /// A length of zero returns the generator to idle.
    pub fn reset(&mut self, length: usize) {
        self.samples = Zeroizing::new(Vec::with_capacity(length * 2));
        self.length = length;
        self.phase = if length == 0 {
            Phase::Idle
        } else {
            Phase::Collecting
        };
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.phase, Phase::Ready)
    }

    /// Fold one `(x, y)` sample into the pool
    pub fn append(&mut self, x: f64, y: f64) -> Result<EntropyProgress> {
        self.append_with(x, y, |random| rand::rngs::OsRng.fill_bytes(random))
    }

    fn append_with<F>(&mut self, x: f64, y: f64, fill_random: F) -> Result<EntropyProgress>
    where
        F: FnOnce(&mut [u8]),
    {
        match self.phase {
            Phase::Idle => return Err(EntropyError::NotInitialized.into()),
            Phase::Ready => {
                return Err(EntropyError::Exhausted {
                    length: self.length,
                }
                .into())
            }
            Phase::Collecting => {}
        }

        self.samples.push(sample_byte(x));
        self.samples.push(sample_byte(y));

        let h0: [u8; 32] = Sha256::digest(&self.samples[..]).into();
        let h1: [u8; 32] = Sha256::digest(h0).into();

        let true_random = h0
            .iter()
            .chain(h1.iter())
            .map(|b| format!("{:02X}", b))
            .collect();

        let count = self.samples.len() / 2;
        let mnemonic = if count >= self.length {
            let mut entropy = Zeroizing::new([0u8; RANDOM_BYTES + 2 * DIGEST_BYTES]);
            fill_random(&mut entropy[..RANDOM_BYTES]);
            let (digest_part, tail) = entropy[RANDOM_BYTES..].split_at_mut(DIGEST_BYTES);
            digest_part.copy_from_slice(&h0[..DIGEST_BYTES]);
            tail.copy_from_slice(&h1[..DIGEST_BYTES]);

            self.phase = Phase::Ready;
            Some(mnemonic_from_entropy(&entropy[..])?.expose().to_string())
        } else {
            None
        };

        Ok(EntropyProgress {
            count,
            length: self.length,
            true_random,
            mnemonic,
        })
    }
}
