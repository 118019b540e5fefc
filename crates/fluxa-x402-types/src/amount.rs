//! Strict decimal-string monetary amounts.
//!
//! All monetary values in the protocol are non-negative integers in the
//! asset's smallest unit, carried on the wire as decimal strings to preserve
//! the full 256-bit range. [`Amount`] wraps a [`U256`] and enforces the wire
//! grammar on parse: digits only, no sign, no leading zeros other than
//! `"0"` itself.

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A 256-bit monetary amount with a strict decimal-string wire form.
///
/// # Example
///
/// ```
/// use fluxa_x402_types::amount::Amount;
///
/// let amount: Amount = "15000".parse().unwrap();
/// assert_eq!(amount.to_string(), "15000");
///
/// assert!("007".parse::<Amount>().is_err());
/// assert!("-1".parse::<Amount>().is_err());
/// assert!("1.5".parse::<Amount>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(U256);

impl Amount {
    /// The zero amount.
    pub const ZERO: Amount = Amount(U256::ZERO);

    /// Returns the inner 256-bit value.
    pub fn as_u256(&self) -> U256 {
        self.0
    }

    /// Checked addition; `None` on 256-bit overflow.
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// Returns `true` if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl From<U256> for Amount {
    fn from(value: U256) -> Self {
        Amount(value)
    }
}

impl From<Amount> for U256 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Amount(U256::from(value))
    }
}

/// Error returned when a string does not match the decimal wire grammar.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AmountParseError {
    /// The string is empty.
    #[error("decimal string must not be empty")]
    Empty,
    /// The string contains a character outside `0-9`.
    #[error("decimal string must contain only digits")]
    NonDigit,
    /// The string has a leading zero (and is not exactly `"0"`).
    #[error("decimal string must not have leading zeros")]
    LeadingZero,
    /// The value exceeds 256 bits.
    #[error("decimal value exceeds 256 bits")]
    Overflow,
}

/// Checks the wire grammar shared by every decimal-string numeric field
/// (amounts, nonces, timestamps): digits only, no sign, no leading zeros
/// other than `"0"` itself.
pub(crate) fn check_decimal_grammar(s: &str) -> Result<(), AmountParseError> {
    if s.is_empty() {
        return Err(AmountParseError::Empty);
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AmountParseError::NonDigit);
    }
    if s.len() > 1 && s.starts_with('0') {
        return Err(AmountParseError::LeadingZero);
    }
    Ok(())
}

impl FromStr for Amount {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        check_decimal_grammar(s)?;
        let value = U256::from_str_radix(s, 10).map_err(|_| AmountParseError::Overflow)?;
        Ok(Amount(value))
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_zero() {
        let amount: Amount = "0".parse().unwrap();
        assert!(amount.is_zero());
        assert_eq!(amount.to_string(), "0");
    }

    #[test]
    fn test_parse_large() {
        // 2^256 - 1
        let max = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        let amount: Amount = max.parse().unwrap();
        assert_eq!(amount.as_u256(), U256::MAX);
        assert_eq!(amount.to_string(), max);
    }

    #[test]
    fn test_rejects_overflow() {
        // 2^256
        let over = "115792089237316195423570985008687907853269984665640564039457584007913129639936";
        assert_eq!(over.parse::<Amount>(), Err(AmountParseError::Overflow));
    }

    #[test]
    fn test_rejects_bad_grammar() {
        assert_eq!("".parse::<Amount>(), Err(AmountParseError::Empty));
        assert_eq!("01".parse::<Amount>(), Err(AmountParseError::LeadingZero));
        assert_eq!("00".parse::<Amount>(), Err(AmountParseError::LeadingZero));
        assert_eq!("-5".parse::<Amount>(), Err(AmountParseError::NonDigit));
        assert_eq!("+5".parse::<Amount>(), Err(AmountParseError::NonDigit));
        assert_eq!("1.5".parse::<Amount>(), Err(AmountParseError::NonDigit));
        assert_eq!("1e3".parse::<Amount>(), Err(AmountParseError::NonDigit));
    }

    #[test]
    fn test_serde_roundtrip() {
        let amount: Amount = "15000".parse().unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"15000\"");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
    }

    #[test]
    fn test_checked_add() {
        let a: Amount = "15000".parse().unwrap();
        let b: Amount = "30000".parse().unwrap();
        assert_eq!(a.checked_add(b).unwrap().to_string(), "45000");
        assert!(Amount::from(U256::MAX).checked_add(Amount::from(1u64)).is_none());
    }
}
