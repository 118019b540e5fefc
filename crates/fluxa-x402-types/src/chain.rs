//! CAIP-2 network identifier types.
//!
//! A network identifier consists of two parts separated by a colon:
//!
//! - **Namespace**: the ecosystem (e.g., `eip155` for EVM, `fluxa` for the
//!   logical credit network)
//! - **Reference**: the network-specific identifier (e.g., `84532` for Base
//!   Sepolia, `monetize` for the credit network)
//!
//! Scheme implementations register either under a concrete network
//! (`eip155:84532`) or under a whole family (`eip155:*`). [`ChainIdPattern`]
//! captures both shapes; the registry tries concrete matches before family
//! matches.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

/// A CAIP-2 compliant network identifier.
///
/// # Serialization
///
/// Serializes to/from a colon-separated string: `"eip155:84532"`.
///
/// # Example
///
/// ```
/// use fluxa_x402_types::chain::ChainId;
///
/// let base_sepolia = ChainId::new("eip155", "84532");
/// assert_eq!(base_sepolia.to_string(), "eip155:84532");
///
/// let credit: ChainId = "fluxa:monetize".parse().unwrap();
/// assert_eq!(credit.namespace(), "fluxa");
/// assert_eq!(credit.reference(), "monetize");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainId {
    /// The network namespace (e.g., `eip155`, `fluxa`).
    pub namespace: String,
    /// The network-specific reference (e.g., `84532`, `monetize`).
    pub reference: String,
}

impl ChainId {
    /// Creates a new network identifier from namespace and reference.
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// Returns the namespace component.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the reference component.
    pub fn reference(&self) -> &str {
        &self.reference
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.to_string()
    }
}

/// Error returned when parsing an invalid network identifier string.
///
/// A valid identifier must be `namespace:reference` with both components
/// non-empty.
#[derive(Debug, thiserror::Error)]
#[error("Invalid network identifier format {0}")]
pub struct ChainIdFormatError(String);

impl FromStr for ChainId {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, reference) = s.split_once(':').ok_or(ChainIdFormatError(s.into()))?;
        if namespace.is_empty() || reference.is_empty() {
            return Err(ChainIdFormatError(s.into()));
        }
        Ok(ChainId {
            namespace: namespace.into(),
            reference: reference.into(),
        })
    }
}

impl Serialize for ChainId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ChainId::from_str(&s).map_err(de::Error::custom)
    }
}

/// A pattern for matching network identifiers.
///
/// - **Exact**: matches one specific network (`eip155:84532`)
/// - **Wildcard**: matches any network within a namespace (`eip155:*`),
///   called a "family" in the protocol
///
/// # Example
///
/// ```
/// use fluxa_x402_types::chain::{ChainId, ChainIdPattern};
///
/// let all_evm = ChainIdPattern::wildcard("eip155");
/// assert!(all_evm.matches(&ChainId::new("eip155", "84532")));
/// assert!(!all_evm.matches(&ChainId::new("fluxa", "monetize")));
///
/// let exact: ChainIdPattern = "fluxa:monetize".parse().unwrap();
/// assert!(exact.matches(&ChainId::new("fluxa", "monetize")));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChainIdPattern {
    /// Matches any network within the namespace.
    Wildcard {
        /// The namespace to match.
        namespace: String,
    },
    /// Matches exactly one network.
    Exact {
        /// The namespace of the network.
        namespace: String,
        /// The reference of the network.
        reference: String,
    },
}

impl ChainIdPattern {
    /// Creates a wildcard (family) pattern for the given namespace.
    pub fn wildcard<S: Into<String>>(namespace: S) -> Self {
        Self::Wildcard {
            namespace: namespace.into(),
        }
    }

    /// Creates an exact pattern matching only the specified network.
    pub fn exact<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self::Exact {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    /// Checks whether a [`ChainId`] matches this pattern.
    pub fn matches(&self, chain_id: &ChainId) -> bool {
        match self {
            ChainIdPattern::Wildcard { namespace } => chain_id.namespace == *namespace,
            ChainIdPattern::Exact {
                namespace,
                reference,
            } => chain_id.namespace == *namespace && chain_id.reference == *reference,
        }
    }

    /// Returns the namespace of this pattern.
    pub fn namespace(&self) -> &str {
        match self {
            ChainIdPattern::Wildcard { namespace } => namespace,
            ChainIdPattern::Exact { namespace, .. } => namespace,
        }
    }

    /// Returns `true` for family (wildcard) patterns.
    pub fn is_family(&self) -> bool {
        matches!(self, ChainIdPattern::Wildcard { .. })
    }
}

impl fmt::Display for ChainIdPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainIdPattern::Wildcard { namespace } => write!(f, "{}:*", namespace),
            ChainIdPattern::Exact {
                namespace,
                reference,
            } => write!(f, "{}:{}", namespace, reference),
        }
    }
}

impl FromStr for ChainIdPattern {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, rest) = s.split_once(':').ok_or(ChainIdFormatError(s.into()))?;
        if namespace.is_empty() || rest.is_empty() {
            return Err(ChainIdFormatError(s.into()));
        }
        if rest == "*" {
            return Ok(ChainIdPattern::wildcard(namespace));
        }
        Ok(ChainIdPattern::exact(namespace, rest))
    }
}

impl Serialize for ChainIdPattern {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainIdPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ChainIdPattern::from_str(&s).map_err(de::Error::custom)
    }
}

impl From<ChainId> for ChainIdPattern {
    fn from(chain_id: ChainId) -> Self {
        ChainIdPattern::exact(chain_id.namespace, chain_id.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_serialize() {
        let chain_id = ChainId::new("eip155", "84532");
        let serialized = serde_json::to_string(&chain_id).unwrap();
        assert_eq!(serialized, "\"eip155:84532\"");
    }

    #[test]
    fn test_chain_id_deserialize() {
        let chain_id: ChainId = serde_json::from_str("\"fluxa:monetize\"").unwrap();
        assert_eq!(chain_id.namespace, "fluxa");
        assert_eq!(chain_id.reference, "monetize");
    }

    #[test]
    fn test_chain_id_roundtrip() {
        let original = ChainId::new("eip155", "84532");
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: ChainId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_chain_id_rejects_invalid() {
        assert!("no-colon".parse::<ChainId>().is_err());
        assert!(":missing-namespace".parse::<ChainId>().is_err());
        assert!("missing-reference:".parse::<ChainId>().is_err());
    }

    #[test]
    fn test_pattern_wildcard_matches() {
        let pattern = ChainIdPattern::wildcard("eip155");
        assert!(pattern.matches(&ChainId::new("eip155", "1")));
        assert!(pattern.matches(&ChainId::new("eip155", "84532")));
        assert!(!pattern.matches(&ChainId::new("fluxa", "monetize")));
    }

    #[test]
    fn test_pattern_exact_matches() {
        let pattern = ChainIdPattern::exact("fluxa", "monetize");
        assert!(pattern.matches(&ChainId::new("fluxa", "monetize")));
        assert!(!pattern.matches(&ChainId::new("fluxa", "other")));
        assert!(!pattern.matches(&ChainId::new("eip155", "monetize")));
    }

    #[test]
    fn test_pattern_parse() {
        let family: ChainIdPattern = "eip155:*".parse().unwrap();
        assert!(family.is_family());
        assert_eq!(family.namespace(), "eip155");

        let exact: ChainIdPattern = "eip155:84532".parse().unwrap();
        assert!(!exact.is_family());
        assert_eq!(exact.to_string(), "eip155:84532");
    }
}
