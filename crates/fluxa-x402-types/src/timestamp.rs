//! Unix timestamp utilities for payment authorization windows.
//!
//! Timestamps bound signature validity windows, receipt deadlines, and
//! session expiries. They travel as stringified integers on the wire, since
//! JavaScript's `Number` type cannot safely represent all 64-bit integers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::time::SystemTime;

/// Seconds since the Unix epoch (1970-01-01T00:00:00Z).
///
/// # Serialization
///
/// Serialized as a stringified integer:
///
/// ```json
/// "1740672160"
/// ```
///
/// # Example
///
/// ```
/// use fluxa_x402_types::timestamp::UnixTimestamp;
///
/// let now = UnixTimestamp::now();
/// let expires = now + 60;
/// assert!(expires > now);
///
/// let specific = UnixTimestamp::from_secs(1740672160);
/// assert_eq!(specific.as_secs(), 1740672160);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq, Hash)]
pub struct UnixTimestamp(u64);

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        crate::amount::check_decimal_grammar(&s).map_err(serde::de::Error::custom)?;
        let ts = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp exceeds 64 bits"))?;
        Ok(UnixTimestamp(ts))
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        UnixTimestamp(self.0.saturating_add(rhs))
    }
}

impl UnixTimestamp {
    /// Creates a [`UnixTimestamp`] from a raw seconds value.
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Returns the current system time as a [`UnixTimestamp`].
    ///
    /// # Panics
    ///
    /// Panics if the system clock is set to a time before the Unix epoch.
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("SystemTime before UNIX epoch?!?")
            .as_secs();
        Self(now)
    }

    /// Returns the timestamp as raw seconds since the Unix epoch.
    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Subtracts `rhs` seconds, saturating at zero.
    pub fn saturating_sub(self, rhs: u64) -> Self {
        Self(self.0.saturating_sub(rhs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_decimal_string() {
        let ts = UnixTimestamp::from_secs(1740672160);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "\"1740672160\"");
    }

    #[test]
    fn test_deserializes_from_decimal_string() {
        let ts: UnixTimestamp = serde_json::from_str("\"1740672160\"").unwrap();
        assert_eq!(ts.as_secs(), 1740672160);
    }

    #[test]
    fn test_rejects_negative_and_non_numeric() {
        assert!(serde_json::from_str::<UnixTimestamp>("\"-1\"").is_err());
        assert!(serde_json::from_str::<UnixTimestamp>("\"+1\"").is_err());
        assert!(serde_json::from_str::<UnixTimestamp>("\"soon\"").is_err());
        assert!(serde_json::from_str::<UnixTimestamp>("1740672160").is_err());
    }

    #[test]
    fn test_rejects_leading_zeros_and_empty() {
        assert!(serde_json::from_str::<UnixTimestamp>("\"007\"").is_err());
        assert!(serde_json::from_str::<UnixTimestamp>("\"00\"").is_err());
        assert!(serde_json::from_str::<UnixTimestamp>("\"\"").is_err());
        let zero: UnixTimestamp = serde_json::from_str("\"0\"").unwrap();
        assert_eq!(zero.as_secs(), 0);
    }

    #[test]
    fn test_add_saturates() {
        let ts = UnixTimestamp::from_secs(u64::MAX);
        assert_eq!((ts + 10).as_secs(), u64::MAX);
    }
}
