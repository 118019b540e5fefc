//! Parsers for the `Signature-Input` and `Signature` headers.
//!
//! Only the subset of RFC 9421 structured fields this protocol emits is
//! recognized:
//!
//! ```text
//! Signature-Input: label=("comp1" "comp2" "@derived");param=value;...
//! Signature:       label=:base64:
//! ```
//!
//! Quoted string parameter values are unquoted; token and integer values
//! keep their raw spelling.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;

/// Error produced while parsing signature header material.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureParseError {
    #[error("missing '=' after signature label")]
    MissingLabel,
    #[error("signature label must not be empty")]
    EmptyLabel,
    #[error("covered components must be parenthesized")]
    MissingComponentList,
    #[error("unterminated component list")]
    UnterminatedComponentList,
    #[error("malformed covered component {0}")]
    MalformedComponent(String),
    #[error("malformed parameter {0}")]
    MalformedParameter(String),
    #[error("malformed integer parameter {0}")]
    MalformedInteger(String),
    #[error("signature value must be wrapped in colons")]
    MissingColons,
    #[error("signature value is not valid base64")]
    InvalidBase64,
}

/// Parameters attached to a `Signature-Input` entry.
///
/// All fields are optional at the parse layer; the verifier decides which
/// are required.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureParams {
    /// Creation time, Unix seconds.
    pub created: Option<u64>,
    /// Expiry time, Unix seconds.
    pub expires: Option<u64>,
    /// Key identifier (a JWK thumbprint in this profile).
    pub key_id: Option<String>,
    /// Application tag; must be `web-bot-auth` here.
    pub tag: Option<String>,
    /// Signature algorithm hint, unused by this profile.
    pub alg: Option<String>,
    /// Anti-replay nonce, opaque.
    pub nonce: Option<String>,
}

/// A parsed `Signature-Input` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignatureInput {
    /// The signature label (left of `=`).
    pub label: String,
    /// Covered component names; derived components keep their `@` prefix.
    pub components: Vec<String>,
    /// Parsed parameters.
    pub params: SignatureParams,
    /// The raw substring from `(` through the end of the header value.
    ///
    /// This is the byte-exact value of the `@signature-params` line in the
    /// signature base.
    pub signature_params: String,
}

impl ParsedSignatureInput {
    /// Parses a `Signature-Input` header value.
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        let (label, rest) = header
            .split_once('=')
            .ok_or(SignatureParseError::MissingLabel)?;
        let label = label.trim();
        if label.is_empty() {
            return Err(SignatureParseError::EmptyLabel);
        }
        if !rest.starts_with('(') {
            return Err(SignatureParseError::MissingComponentList);
        }
        let signature_params = rest.to_string();

        let close = rest
            .find(')')
            .ok_or(SignatureParseError::UnterminatedComponentList)?;
        let inner = &rest[1..close];
        let mut components = Vec::new();
        for item in inner.split_whitespace() {
            if let Some(stripped) = item.strip_prefix('"') {
                let name = stripped
                    .strip_suffix('"')
                    .ok_or_else(|| SignatureParseError::MalformedComponent(item.into()))?;
                if name.is_empty() {
                    return Err(SignatureParseError::MalformedComponent(item.into()));
                }
                components.push(name.to_string());
            } else if item.starts_with('@') && item.len() > 1 {
                components.push(item.to_string());
            } else {
                return Err(SignatureParseError::MalformedComponent(item.into()));
            }
        }

        let mut params = SignatureParams::default();
        for part in rest[close + 1..].split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, raw) = part
                .split_once('=')
                .ok_or_else(|| SignatureParseError::MalformedParameter(part.into()))?;
            let value = unquote(raw);
            match key {
                "created" => params.created = Some(parse_integer(raw)?),
                "expires" => params.expires = Some(parse_integer(raw)?),
                "keyid" => params.key_id = Some(value),
                "tag" => params.tag = Some(value),
                "alg" => params.alg = Some(value),
                "nonce" => params.nonce = Some(value),
                // Unknown parameters are carried in signature_params and
                // covered by the signature; nothing else to do with them.
                _ => {}
            }
        }

        Ok(ParsedSignatureInput {
            label: label.to_string(),
            components,
            params,
            signature_params,
        })
    }

    /// Whether the covered component list includes `name`.
    pub fn covers(&self, name: &str) -> bool {
        self.components.iter().any(|c| c == name)
    }
}

/// A parsed `Signature` header: label and decoded signature bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature {
    /// The signature label (left of `=`).
    pub label: String,
    /// The decoded signature bytes.
    pub signature: Vec<u8>,
}

impl ParsedSignature {
    /// Parses a `Signature` header value of the shape `label=:base64:`.
    ///
    /// The value uses standard base64, not base64url.
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        let (label, rest) = header
            .split_once('=')
            .ok_or(SignatureParseError::MissingLabel)?;
        let label = label.trim();
        if label.is_empty() {
            return Err(SignatureParseError::EmptyLabel);
        }
        let inner = rest
            .strip_prefix(':')
            .and_then(|r| r.strip_suffix(':'))
            .ok_or(SignatureParseError::MissingColons)?;
        let signature = b64
            .decode(inner)
            .map_err(|_| SignatureParseError::InvalidBase64)?;
        Ok(ParsedSignature {
            label: label.to_string(),
            signature,
        })
    }
}

fn unquote(raw: &str) -> String {
    raw.strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(raw)
        .to_string()
}

fn parse_integer(raw: &str) -> Result<u64, SignatureParseError> {
    // Same wire grammar as the protocol's decimal strings: digits only, no
    // sign, no leading zeros. `u64::from_str` alone would accept `+5`.
    let well_formed = !raw.is_empty()
        && raw.bytes().all(|b| b.is_ascii_digit())
        && !(raw.len() > 1 && raw.starts_with('0'));
    if !well_formed {
        return Err(SignatureParseError::MalformedInteger(raw.into()));
    }
    raw.parse::<u64>()
        .map_err(|_| SignatureParseError::MalformedInteger(raw.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = "sig1=(\"payment-signature\" \"signature-agent\" \"@authority\");created=1740672000;expires=1740672030;keyid=\"thumb\";tag=\"web-bot-auth\"";

    #[test]
    fn test_parse_signature_input() {
        let parsed = ParsedSignatureInput::parse(INPUT).unwrap();
        assert_eq!(parsed.label, "sig1");
        assert_eq!(
            parsed.components,
            vec!["payment-signature", "signature-agent", "@authority"]
        );
        assert_eq!(parsed.params.created, Some(1740672000));
        assert_eq!(parsed.params.expires, Some(1740672030));
        assert_eq!(parsed.params.key_id.as_deref(), Some("thumb"));
        assert_eq!(parsed.params.tag.as_deref(), Some("web-bot-auth"));
    }

    #[test]
    fn test_signature_params_substring_starts_at_paren() {
        let parsed = ParsedSignatureInput::parse(INPUT).unwrap();
        assert!(parsed.signature_params.starts_with("(\"payment-signature\""));
        assert!(parsed.signature_params.ends_with("tag=\"web-bot-auth\""));
    }

    #[test]
    fn test_quoted_values_unquote_raw_integers_stay_raw() {
        let parsed =
            ParsedSignatureInput::parse("s=(\"a\");keyid=\"k id\";created=5;nonce=tok").unwrap();
        assert_eq!(parsed.params.key_id.as_deref(), Some("k id"));
        assert_eq!(parsed.params.created, Some(5));
        assert_eq!(parsed.params.nonce.as_deref(), Some("tok"));
    }

    #[test]
    fn test_rejects_malformed_inputs() {
        assert!(ParsedSignatureInput::parse("no-equals").is_err());
        assert!(ParsedSignatureInput::parse("sig1=\"a\"").is_err());
        assert!(ParsedSignatureInput::parse("sig1=(\"a\"").is_err());
        assert!(ParsedSignatureInput::parse("sig1=(bare)").is_err());
        assert!(ParsedSignatureInput::parse("sig1=(\"a\");created=soon").is_err());
        assert!(ParsedSignatureInput::parse("sig1=(\"a\");created=007").is_err());
        assert!(ParsedSignatureInput::parse("sig1=(\"a\");created=+5").is_err());
        assert!(ParsedSignatureInput::parse("=(\"a\")").is_err());
    }

    #[test]
    fn test_parse_signature_header() {
        let parsed = ParsedSignature::parse("sig1=:aGVsbG8=:").unwrap();
        assert_eq!(parsed.label, "sig1");
        assert_eq!(parsed.signature, b"hello");
    }

    #[test]
    fn test_signature_header_rejects_base64url_and_bare() {
        assert!(ParsedSignature::parse("sig1=aGVsbG8=").is_err());
        // '-' is not in the standard alphabet.
        assert!(ParsedSignature::parse("sig1=:aGV-bG8=:").is_err());
    }
}
