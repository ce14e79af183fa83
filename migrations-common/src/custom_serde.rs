//! Custom de/serialization logic used for plan literals.
//!
//! Migration configs routinely write large integers either as JSON numbers
//! (`175000000000`) or as strings (`"180"`, `"0xb4"`), so number literals
//! accept all three forms and are always written back as decimal strings.

use std::fmt;

use alloy_primitives::U256;
use serde::{de, Deserialize, Deserializer, Serializer};
use serde_with::{DeserializeAs, SerializeAs};

use crate::constants::HEX_PREFIX;

/// Marker type for de/serializing a [`U256`] number literal with `serde_as`
pub struct U256Literal;

/// The raw forms a number literal may take in a plan file
#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    /// A JSON number that fits in a `u64`
    Int(u64),
    /// A decimal or `0x`-prefixed hex string
    Str(String),
}

impl SerializeAs<U256> for U256Literal {
    fn serialize_as<S>(source: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(source)
    }
}

impl<'de> DeserializeAs<'de, U256> for U256Literal {
    fn deserialize_as<D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawNumber::deserialize(deserializer)? {
            RawNumber::Int(n) => Ok(U256::from(n)),
            RawNumber::Str(s) => parse_number(&s).map_err(de::Error::custom),
        }
    }
}

/// An error parsing a number literal from a string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberParseError(pub String);

impl fmt::Display for NumberParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid number literal `{}`", self.0)
    }
}

impl std::error::Error for NumberParseError {}

/// Parse a decimal or `0x`-prefixed hex string into a [`U256`]
pub fn parse_number(s: &str) -> Result<U256, NumberParseError> {
    let trimmed = s.trim();
    let parsed = match trimmed.strip_prefix(HEX_PREFIX) {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(trimmed, 10),
    };

    parsed.map_err(|_| NumberParseError(s.to_string()))
}
