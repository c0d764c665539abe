//! Numeric literals shared by configuration files, batch files and assemblers.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

/// Parse a literal written as decimal, `0x`/`$`/trailing-`h` hex, or
/// `0b`/`%` binary.
pub fn parse_literal(token: &str) -> Option<u32> {
    let token = token.trim().replace('_', "");
    let lowered = token.to_ascii_lowercase();
    let (digits, radix) = if let Some(hex) = lowered.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(hex) = lowered.strip_prefix('$') {
        (hex, 16)
    } else if let Some(bin) = lowered.strip_prefix("0b") {
        (bin, 2)
    } else if let Some(bin) = lowered.strip_prefix('%') {
        (bin, 2)
    } else if let Some(hex) = lowered
        .strip_suffix('h')
        .filter(|digits| digits.starts_with(|c: char| c.is_ascii_digit()))
    {
        (hex, 16)
    } else {
        (lowered.as_str(), 10)
    };
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}

/// An unsigned number that deserializes from a YAML integer or a string
/// literal such as `"0x8001"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Literal(pub u32);

impl Literal {
    pub fn to_u8(self) -> Option<u8> {
        u8::try_from(self.0).ok()
    }

    pub fn to_u16(self) -> Option<u16> {
        u16::try_from(self.0).ok()
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl Serialize for Literal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

struct LiteralVisitor;

impl Visitor<'_> for LiteralVisitor {
    type Value = Literal;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an unsigned integer or a numeric literal string")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Literal, E> {
        u32::try_from(value)
            .map(Literal)
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(value), &self))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Literal, E> {
        u32::try_from(value)
            .map(Literal)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(value), &self))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Literal, E> {
        parse_literal(value)
            .map(Literal)
            .ok_or_else(|| E::invalid_value(de::Unexpected::Str(value), &self))
    }
}

impl<'de> Deserialize<'de> for Literal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(LiteralVisitor)
    }
}

pub(crate) fn de_u8<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let literal = Literal::deserialize(deserializer)?;
    literal
        .to_u8()
        .ok_or_else(|| de::Error::custom(format!("{literal} does not fit in 8 bits")))
}

pub(crate) fn de_u16<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    let literal = Literal::deserialize(deserializer)?;
    literal
        .to_u16()
        .ok_or_else(|| de::Error::custom(format!("{literal} does not fit in 16 bits")))
}

pub(crate) fn de_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Literal::deserialize(deserializer).map(|literal| literal.0)
}
