use std::fmt;
use std::iter::Sum;

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::error::GovernanceError;

/// Decimals used by the governance token of the observed deployment.
pub const DEFAULT_DECIMALS: u8 = 18;

/// Exact non-negative token quantity in the token's smallest unit.
///
/// All governance arithmetic goes through this type; it is only turned into a
/// decimal string at the display edge via [`TokenAmount::format_units`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenAmount(U256);

impl TokenAmount {
    pub fn zero() -> Self {
        Self(U256::zero())
    }

    pub fn from_raw(raw: U256) -> Self {
        Self(raw)
    }

    /// `whole * 10^decimals`, e.g. `from_tokens(10, 18)` is ten full tokens.
    pub fn from_tokens(whole: u64, decimals: u8) -> Self {
        Self(U256::from(whole).saturating_mul(U256::exp10(decimals as usize)))
    }

    pub fn raw(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Exact decimal rendering: `1500000000000000000` at 18 decimals is `"1.5"`,
    /// whole amounts keep one fractional digit (`"2.0"`).
    pub fn format_units(&self, decimals: u8) -> String {
        if decimals == 0 {
            return self.0.to_string();
        }
        let base = U256::exp10(decimals as usize);
        let whole = self.0 / base;
        let fraction = self.0 % base;
        let padded = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
        let trimmed = padded.trim_end_matches('0');
        if trimmed.is_empty() {
            format!("{}.0", whole)
        } else {
            format!("{}.{}", whole, trimmed)
        }
    }

    /// Inverse of [`TokenAmount::format_units`]. Accepts `"12"`, `"12.5"`, `"0.000001"`.
    pub fn parse_units(text: &str, decimals: u8) -> Result<Self, GovernanceError> {
        let invalid = |reason: &str| GovernanceError::InvalidAmount(format!("{:?}: {}", text, reason));
        let text = text.trim();
        if text.is_empty() {
            return Err(invalid("empty"));
        }

        let (whole, fraction) = match text.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (text, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("no digits"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("only decimal digits and a single '.' are allowed"));
        }
        if fraction.len() > decimals as usize {
            return Err(invalid("too many fractional digits"));
        }

        let digits = format!("{}{:0<width$}", whole, fraction, width = decimals as usize);
        let digits = digits.trim_start_matches('0');
        if digits.is_empty() {
            return Ok(Self::zero());
        }
        U256::from_dec_str(digits)
            .map(Self)
            .map_err(|_| invalid("out of range"))
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<u128> for TokenAmount {
    fn from(value: u128) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for TokenAmount {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl TryFrom<String> for TokenAmount {
    type Error = GovernanceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        U256::from_dec_str(value.trim())
            .map(Self)
            .map_err(|_| GovernanceError::InvalidAmount(value))
    }
}

impl From<TokenAmount> for String {
    fn from(amount: TokenAmount) -> Self {
        amount.0.to_string()
    }
}

impl Sum for TokenAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), TokenAmount::saturating_add)
    }
}

impl<'a> Sum<&'a TokenAmount> for TokenAmount {
    fn sum<I: Iterator<Item = &'a TokenAmount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenAmount({})", self.0)
    }
}
