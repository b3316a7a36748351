//! Field element helpers: infallible constants, keccak, short strings and
//! the hex wire encoding used by the node.

use starknet_crypto::FieldElement;
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Entry point names that map to the zero selector
const DEFAULT_ENTRY_POINT_NAME: &str = "__default__";
const DEFAULT_L1_ENTRY_POINT_NAME: &str = "__l1_default__";

/// Errors produced while turning text into field elements
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeltError {
    #[error("invalid field element literal '{0}'")]
    InvalidLiteral(String),

    #[error("value '{0}' does not fit in the field")]
    OutOfRange(String),

    #[error("short string '{0}' is longer than 31 characters")]
    StringTooLong(String),

    #[error("'{0}' contains non-ASCII characters")]
    NonAscii(String),
}

/// Build a field element from its high and low 128-bit halves
pub fn felt_from_halves(high: u128, low: u128) -> FieldElement {
    let shift = FieldElement::from(u128::MAX) + FieldElement::ONE;
    FieldElement::from(high) * shift + FieldElement::from(low)
}

/// Interpret big-endian bytes as an integer in the field. Callers keep the
/// value below the modulus (at most 31 bytes, or a masked 32-byte digest).
fn felt_from_be_bytes(bytes: &[u8]) -> FieldElement {
    let radix = FieldElement::from(256u32);
    bytes
        .iter()
        .fold(FieldElement::ZERO, |acc, byte| acc * radix + FieldElement::from(*byte))
}

/// Keccak256 truncated to 250 bits
pub fn starknet_keccak(data: &[u8]) -> FieldElement {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let mut hash = hasher.finalize();

    // Drop the top 6 bits so the digest fits in the field
    hash[0] &= 0b0000_0011;
    felt_from_be_bytes(&hash)
}

/// Entry point selector for a function name
pub fn selector_from_name(name: &str) -> Result<FieldElement, FeltError> {
    if name == DEFAULT_ENTRY_POINT_NAME || name == DEFAULT_L1_ENTRY_POINT_NAME {
        return Ok(FieldElement::ZERO);
    }
    if !name.is_ascii() {
        return Err(FeltError::NonAscii(name.to_string()));
    }
    Ok(starknet_keccak(name.as_bytes()))
}

/// Encode up to 31 ASCII characters as a Cairo short string
pub fn short_string(value: &str) -> Result<FieldElement, FeltError> {
    if !value.is_ascii() {
        return Err(FeltError::NonAscii(value.to_string()));
    }
    if value.len() > 31 {
        return Err(FeltError::StringTooLong(value.to_string()));
    }
    Ok(felt_from_be_bytes(value.as_bytes()))
}

/// Short string for a compile-time constant known to be valid
pub(crate) fn short_string_const(value: &'static str) -> FieldElement {
    felt_from_be_bytes(&value.as_bytes()[..value.len().min(31)])
}

/// Parse a `0x` hex or decimal literal
pub fn parse_felt(input: &str) -> Result<FieldElement, FeltError> {
    let trimmed = input.trim();
    let (digits, is_hex) = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => (hex, true),
        None => (trimmed, false),
    };

    let well_formed = !digits.is_empty()
        && digits.chars().all(|c| {
            if is_hex {
                c.is_ascii_hexdigit()
            } else {
                c.is_ascii_digit()
            }
        });
    if !well_formed {
        return Err(FeltError::InvalidLiteral(input.to_string()));
    }

    let parsed = if is_hex {
        FieldElement::from_hex_be(digits)
    } else {
        FieldElement::from_dec_str(digits)
    };
    // Digits are valid at this point, so any failure is a range error
    parsed.map_err(|_| FeltError::OutOfRange(input.to_string()))
}

/// Format a field element the way the node expects it on the wire
pub fn to_hex(value: &FieldElement) -> String {
    format!("{:#x}", value)
}

/// `#[serde(with = "...")]` adapter for a single field element as hex
pub mod serde_hex {
    use super::{parse_felt, to_hex};
    use serde::{Deserialize, Deserializer, Serializer};
    use starknet_crypto::FieldElement;

    pub fn serialize<S: Serializer>(value: &FieldElement, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_hex(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<FieldElement, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_felt(&raw).map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with = "...")]` adapter for a list of field elements as hex
pub mod serde_hex_vec {
    use super::{parse_felt, to_hex};
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};
    use starknet_crypto::FieldElement;

    pub fn serialize<S: Serializer>(
        values: &[FieldElement],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&to_hex(value))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<FieldElement>, D::Error> {
        let raw = Vec::<String>::deserialize(deserializer)?;
        raw.iter()
            .map(|value| parse_felt(value).map_err(serde::de::Error::custom))
            .collect()
    }
}
