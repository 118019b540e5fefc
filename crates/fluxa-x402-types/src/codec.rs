//! Payment header codecs and canonical JSON comparison.
//!
//! The three payment headers (`PAYMENT-REQUIRED`, `PAYMENT-SIGNATURE`,
//! `PAYMENT-RESPONSE`) all carry base64url-without-padding over compact
//! UTF-8 JSON. Decoding is strict: trailing padding, characters outside the
//! URL-safe alphabet, and oversized headers are rejected.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as b64url;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Header carrying a `PaymentRequired` offer on a 402 response.
pub const PAYMENT_REQUIRED_HEADER: &str = "PAYMENT-REQUIRED";
/// Header carrying a `PaymentPayload` on a retried request.
pub const PAYMENT_SIGNATURE_HEADER: &str = "PAYMENT-SIGNATURE";
/// Header carrying the settlement outcome on the final response.
pub const PAYMENT_RESPONSE_HEADER: &str = "PAYMENT-RESPONSE";

/// Upper bound on any payment-bearing header value.
///
/// The HTTP layer answers 431 for anything larger.
pub const MAX_PAYMENT_HEADER_BYTES: usize = 16 * 1024;

/// Errors produced by the payment header codec.
#[derive(Debug, thiserror::Error)]
pub enum HeaderCodecError {
    /// The header exceeds [`MAX_PAYMENT_HEADER_BYTES`].
    #[error("payment header of {len} bytes exceeds the {max} byte cap")]
    TooLarge {
        /// Observed header length.
        len: usize,
        /// The configured cap.
        max: usize,
    },
    /// The header is not valid base64url-without-padding.
    #[error("payment header is not base64url without padding: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes are not the expected JSON shape.
    #[error("payment header JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encodes a value into a payment header: compact JSON, then base64url
/// without padding.
pub fn encode_header<T: Serialize>(value: &T) -> Result<String, HeaderCodecError> {
    let json = serde_json::to_vec(value)?;
    Ok(b64url.encode(json))
}

/// Decodes a payment header into a value.
///
/// Rejects headers over [`MAX_PAYMENT_HEADER_BYTES`], trailing `=` padding,
/// and any character outside the URL-safe base64 alphabet.
pub fn decode_header<T: DeserializeOwned>(header: &str) -> Result<T, HeaderCodecError> {
    if header.len() > MAX_PAYMENT_HEADER_BYTES {
        return Err(HeaderCodecError::TooLarge {
            len: header.len(),
            max: MAX_PAYMENT_HEADER_BYTES,
        });
    }
    let json = b64url.decode(header)?;
    let value = serde_json::from_slice(&json)?;
    Ok(value)
}

/// Returns a copy of `value` with all object keys sorted recursively.
///
/// Arrays keep their order. This is the normalization used for structural
/// payment binding: two JSON documents are considered equal when their
/// canonical forms are equal.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Deep equality after recursive key-sorting.
pub fn canonical_eq(a: &Value, b: &Value) -> bool {
    canonicalize(a) == canonicalize(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_decode_roundtrip() {
        let value = json!({"scheme": "fluxacredit", "amount": "25"});
        let header = encode_header(&value).unwrap();
        let decoded: Value = decode_header(&header).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_encoding_is_compact_and_unpadded() {
        let header = encode_header(&json!({"a": 1, "b": [1, 2]})).unwrap();
        assert!(!header.contains('='));
        assert!(!header.contains('+'));
        assert!(!header.contains('/'));
        let bytes = b64url.decode(&header).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(!text.contains(' '));
    }

    #[test]
    fn test_decode_rejects_padding() {
        // "{}" encodes to "e30"; "e30=" carries trailing padding.
        assert!(decode_header::<Value>("e30").is_ok());
        assert!(decode_header::<Value>("e30=").is_err());
    }

    #[test]
    fn test_decode_rejects_standard_alphabet() {
        // '+' and '/' belong to the standard alphabet, not the URL-safe one.
        assert!(decode_header::<Value>("a+b/").is_err());
    }

    #[test]
    fn test_decode_rejects_oversized() {
        let big = "A".repeat(MAX_PAYMENT_HEADER_BYTES + 1);
        assert!(matches!(
            decode_header::<Value>(&big),
            Err(HeaderCodecError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_canonicalize_sorts_keys_recursively() {
        let a = json!({"b": {"y": 1, "x": 2}, "a": [ {"k": 1, "j": 2} ]});
        let b = json!({"a": [ {"j": 2, "k": 1} ], "b": {"x": 2, "y": 1}});
        assert!(canonical_eq(&a, &b));
    }

    #[test]
    fn test_canonicalize_keeps_array_order() {
        let a = json!({"a": [1, 2]});
        let b = json!({"a": [2, 1]});
        assert!(!canonical_eq(&a, &b));
    }
}
