use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GovernanceError;

lazy_static! {
    static ref ADDRESS_PATTERN: Regex = Regex::new("^0[xX][0-9a-fA-F]{40}$").unwrap();
}

/// 20-byte account identifier (externally owned account or contract).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address([u8; 20]);

impl Address {
    /// The null address. Delegating to it means "not delegating".
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Parses a `0x`-prefixed hex address. Checksum casing is not enforced.
    pub fn parse(text: &str) -> Result<Self, GovernanceError> {
        let trimmed = text.trim();
        if !ADDRESS_PATTERN.is_match(trimmed) {
            return Err(GovernanceError::InvalidAddress(text.to_string()));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(&trimmed[2..], &mut bytes)
            .map_err(|e| GovernanceError::InvalidAddress(format!("{}: {}", text, e)))?;
        Ok(Self(bytes))
    }

    /// Short form used in log lines, e.g. `0x1234…abcd`.
    pub fn short(&self) -> String {
        let full = hex::encode(self.0);
        format!("0x{}…{}", &full[..4], &full[36..])
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = GovernanceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        let lower = Address::parse("0x00000000000000000000000000000000000000ab").unwrap();
        let upper = Address::parse("0X00000000000000000000000000000000000000AB").unwrap();
        assert_eq!(lower, upper);
        assert_eq!(upper.to_string(), "0x00000000000000000000000000000000000000ab");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("00000000000000000000000000000000000000ab00").is_err());
        assert!(Address::parse("0xzz000000000000000000000000000000000000ab").is_err());
    }

    #[test]
    fn test_zero_address() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::new([1u8; 20]).is_zero());
        assert_eq!(Address::default(), Address::ZERO);
    }

    #[test]
    fn test_serde_as_string() {
        let address = Address::new([0x11; 20]);
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, "\"0x1111111111111111111111111111111111111111\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }
}
