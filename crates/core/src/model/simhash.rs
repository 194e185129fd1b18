use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Width of a similarity hash in bits.
pub const HASH_BITS: u32 = 128;

/// 128-bit similarity hash, stored as two 64-bit halves.
///
/// `h1` holds the high 64 bits and `h2` the low 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct SimHash {
    pub h1: u64,
    pub h2: u64,
}

impl SimHash {
    pub const fn new(h1: u64, h2: u64) -> Self {
        Self { h1, h2 }
    }

    pub const fn from_u128(value: u128) -> Self {
        Self { h1: (value >> 64) as u64, h2: value as u64 }
    }

    pub const fn as_u128(self) -> u128 {
        ((self.h1 as u128) << 64) | self.h2 as u128
    }

    /// Number of differing bit positions.
    pub fn hamming_distance(self, other: SimHash) -> u32 {
        (self.h1 ^ other.h1).count_ones() + (self.h2 ^ other.h2).count_ones()
    }

    /// Number of equal bit positions (`128 - hamming_distance`).
    pub fn matching_bits(self, other: SimHash) -> u32 {
        HASH_BITS - self.hamming_distance(other)
    }
}

impl From<u128> for SimHash {
    fn from(value: u128) -> Self {
        Self::from_u128(value)
    }
}

impl fmt::Display for SimHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}{:016x}", self.h1, self.h2)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseSimHashError {
    #[error("expected 32 hex digits, got {0} characters")]
    Length(usize),
    #[error("invalid hex digits in hash: {0}")]
    Digits(String),
}

impl FromStr for SimHash {
    type Err = ParseSimHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 32 {
            return Err(ParseSimHashError::Length(digits.len()));
        }
        u128::from_str_radix(digits, 16)
            .map(Self::from_u128)
            .map_err(|_| ParseSimHashError::Digits(digits.to_string()))
    }
}
