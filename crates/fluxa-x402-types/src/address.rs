//! EIP-55 checksummed address wrapper.

use alloy_primitives::{Address, hex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// An Ethereum address that serializes with EIP-55 checksum encoding.
///
/// Parsing is case-insensitive; comparison goes through the inner
/// [`Address`], so two differently-cased spellings of the same address are
/// equal after parsing.
///
/// # Example
///
/// ```
/// use fluxa_x402_types::address::ChecksummedAddress;
///
/// let a: ChecksummedAddress = "0xd8da6bf26964af9d7eed9e03e53415d37aa96045".parse().unwrap();
/// let b: ChecksummedAddress = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".parse().unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045");
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ChecksummedAddress(pub Address);

impl ChecksummedAddress {
    /// Returns the inner address.
    pub fn inner(&self) -> Address {
        self.0
    }
}

impl FromStr for ChecksummedAddress {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let address = Address::from_str(s)?;
        Ok(Self(address))
    }
}

impl Display for ChecksummedAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_checksum(None))
    }
}

impl Serialize for ChecksummedAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_checksum(None))
    }
}

impl<'de> Deserialize<'de> for ChecksummedAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl From<ChecksummedAddress> for Address {
    fn from(value: ChecksummedAddress) -> Self {
        value.0
    }
}

impl From<Address> for ChecksummedAddress {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl PartialEq<ChecksummedAddress> for Address {
    fn eq(&self, other: &ChecksummedAddress) -> bool {
        self.eq(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_parse_canonical_output() {
        let lower: ChecksummedAddress =
            "0x4a52000000000000000000000000000000000000".parse().unwrap();
        let json = serde_json::to_string(&lower).unwrap();
        let back: ChecksummedAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(lower, back);
    }

    #[test]
    fn test_rejects_wrong_length() {
        assert!("0x1234".parse::<ChecksummedAddress>().is_err());
        assert!("not-an-address".parse::<ChecksummedAddress>().is_err());
    }
}
