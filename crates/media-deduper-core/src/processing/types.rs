//! Fingerprint value and core methods
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// A fixed-width perceptual fingerprint.
///
/// Bits are packed most-significant-first into 64-bit words, so an 8x8 grid
/// fits one word and renders as the familiar 16 hex digit pHash string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint {
    bits: u32,
    words: Vec<u64>,
}

impl Fingerprint {
    /// Pack a sequence of bits, first bit most significant
    pub fn from_bits(bits: &[bool]) -> Self {
        let mut words = vec![0u64; bits.len().div_ceil(64)];
        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                words[i / 64] |= 1u64 << (63 - (i % 64));
            }
        }
        Self {
            bits: bits.len() as u32,
            words,
        }
    }

    /// A 64-bit fingerprint from a raw value
    pub fn from_u64(value: u64) -> Self {
        Self {
            bits: 64,
            words: vec![value],
        }
    }

    /// Number of bits in the fingerprint
    pub fn bit_len(&self) -> u32 {
        self.bits
    }

    /// The first 64 bits as an integer
    pub fn as_u64(&self) -> u64 {
        self.words.first().copied().unwrap_or(0)
    }

    /// Calculate the Hamming distance between two fingerprints.
    ///
    /// Fingerprints of different widths never come from the same cache
    /// generation; the width difference is added so they never look close.
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        let shared: u32 = self
            .words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        shared + self.bits.abs_diff(other.bits)
    }

    /// Check if two fingerprints are within `threshold` bits of each other
    pub fn is_similar(&self, other: &Fingerprint, threshold: u32) -> bool {
        self.distance(other) <= threshold
    }

    /// Big-endian bytes, trimmed to the bytes that carry bits
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes: Vec<u8> = self.words.iter().flat_map(|w| w.to_be_bytes()).collect();
        bytes.truncate((self.bits as usize).div_ceil(8));
        bytes
    }

    /// Rebuild a fingerprint of `bits` width from `to_bytes` output
    pub fn from_bytes(bytes: &[u8], bits: u32) -> Result<Self> {
        let expected = (bits as usize).div_ceil(8);
        if bytes.len() != expected {
            return Err(Error::Configuration(format!(
                "fingerprint of {} bits needs {} bytes, got {}",
                bits,
                expected,
                bytes.len()
            )));
        }

        let words = bytes
            .chunks(8)
            .map(|chunk| {
                let mut word = [0u8; 8];
                word[..chunk.len()].copy_from_slice(chunk);
                u64::from_be_bytes(word)
            })
            .collect();

        Ok(Self { bits, words })
    }

    /// Lowercase hex, one digit per four bits
    pub fn to_hex(&self) -> String {
        let mut hex: String = self.to_bytes().iter().map(|b| format!("{:02x}", b)).collect();
        hex.truncate((self.bits as usize).div_ceil(4));
        hex
    }

    /// Parse a hex string; the width is four bits per digit
    pub fn from_hex(hex: &str) -> Result<Self> {
        // Byte slicing below needs one byte per digit
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::Configuration(format!(
                "invalid fingerprint hex '{}': not a hex digit string",
                hex
            )));
        }

        let bits = (hex.len() * 4) as u32;
        let padded = if hex.len() % 2 == 1 {
            format!("{}0", hex)
        } else {
            hex.to_string()
        };

        let bytes = (0..padded.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&padded[i..i + 2], 16).map_err(|e| {
                    Error::Configuration(format!("invalid fingerprint hex '{}': {}", hex, e))
                })
            })
            .collect::<Result<Vec<u8>>>()?;

        Self::from_bytes(&bytes, bits)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.to_hex()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = Error;

    fn try_from(hex: String) -> Result<Self> {
        Fingerprint::from_hex(&hex)
    }
}
