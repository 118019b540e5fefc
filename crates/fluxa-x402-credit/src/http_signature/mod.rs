//! HTTP Message Signature verification for the Web Bot Auth profile.
//!
//! Implements the minimal subset of RFC 9421 this protocol needs: parsing
//! `Signature-Input` / `Signature` headers, byte-exact reconstruction of the
//! signature base over the covered components, JWK thumbprint key lookup via
//! a discoverable directory, and detached Ed25519 verification.
//!
//! The verifier trusts only three covered components:
//! `"payment-signature"`, `"signature-agent"`, and `"@authority"`.
//! Additional components are permitted but contribute nothing.

pub mod base;
pub mod directory;
pub mod input;

use ed25519_dalek::{Signature, VerifyingKey};
use fluxa_x402_types::proto::ErrorReason;
use fluxa_x402_types::timestamp::UnixTimestamp;

use crate::http_signature::directory::{DirectoryError, Jwk, KeyDirectory};
use crate::http_signature::input::{ParsedSignature, ParsedSignatureInput};

/// Components that must be covered by every accepted signature.
pub const REQUIRED_COMPONENTS: [&str; 3] = ["payment-signature", "signature-agent", "@authority"];

/// The only accepted signature tag.
pub const WEB_BOT_AUTH_TAG: &str = "web-bot-auth";

/// Maximum allowed `expires - created` span, in seconds.
pub const MAX_WINDOW_SECS: u64 = 60;

/// Clock skew tolerance around the validity window, in seconds.
pub const SKEW_SECS: u64 = 60;

/// A failed Web Bot Auth verification, with the wire reason it maps to.
#[derive(Debug, thiserror::Error)]
pub enum WebBotAuthError {
    /// Header material that does not parse, a missing parameter, or a
    /// directory that cannot be fetched.
    #[error("invalid web-bot-auth material: {0}")]
    Invalid(String),
    /// A required covered component is absent.
    #[error("covered components are missing {0}")]
    MissingComponent(&'static str),
    /// `Signature-Input` and `Signature` labels differ.
    #[error("signature label mismatch")]
    LabelMismatch,
    /// `expires - created` exceeds [`MAX_WINDOW_SECS`].
    #[error("signature validity window too long")]
    WindowTooLong,
    /// The current time is outside the window (with skew tolerance).
    #[error("signature expired or not yet valid")]
    ExpiredOrNotYetValid,
    /// No directory key matches the signature's `keyid`.
    #[error("signing key not found in directory")]
    KeyNotFound,
    /// The Ed25519 signature does not verify.
    #[error("signature verification failed")]
    SignatureVerifyFailed,
}

impl WebBotAuthError {
    /// The wire error tag this failure maps to.
    pub fn reason(&self) -> ErrorReason {
        match self {
            WebBotAuthError::Invalid(_) => ErrorReason::InvalidWebBotAuth,
            WebBotAuthError::MissingComponent(name) => match *name {
                "payment-signature" => ErrorReason::MissingComponentPaymentSignature,
                "signature-agent" => ErrorReason::MissingComponentSignatureAgent,
                _ => ErrorReason::MissingComponentAuthority,
            },
            WebBotAuthError::LabelMismatch => ErrorReason::LabelMismatch,
            WebBotAuthError::WindowTooLong => ErrorReason::WindowTooLong,
            WebBotAuthError::ExpiredOrNotYetValid => ErrorReason::ExpiredOrNotYetValid,
            WebBotAuthError::KeyNotFound => ErrorReason::KeyNotFound,
            WebBotAuthError::SignatureVerifyFailed => ErrorReason::SignatureVerifyFailed,
        }
    }
}

impl From<DirectoryError> for WebBotAuthError {
    fn from(value: DirectoryError) -> Self {
        WebBotAuthError::Invalid(value.to_string())
    }
}

/// Inputs to one verification: the raw header strings plus request context.
#[derive(Debug, Clone)]
pub struct VerificationRequest<'a> {
    /// `Signature-Agent` header value, surrounding quotes included.
    pub signature_agent: &'a str,
    /// `Signature-Input` header value.
    pub signature_input: &'a str,
    /// `Signature` header value.
    pub signature: &'a str,
    /// Exact received bytes of the `PAYMENT-SIGNATURE` header.
    pub payment_signature_header: &'a str,
    /// HTTP method of the request (conventionally `GET`).
    pub method: &'a str,
    /// Full URL of the paid resource.
    pub url: &'a str,
}

/// Verifies a Web Bot Auth HTTP Message Signature.
///
/// On success returns the RFC 7638 thumbprint of the signing key, which
/// becomes the payer identity.
pub async fn verify_web_bot_auth(
    directory: &dyn KeyDirectory,
    request: &VerificationRequest<'_>,
    now: UnixTimestamp,
) -> Result<String, WebBotAuthError> {
    let parsed_input = ParsedSignatureInput::parse(request.signature_input)
        .map_err(|e| WebBotAuthError::Invalid(e.to_string()))?;
    let parsed_signature = ParsedSignature::parse(request.signature)
        .map_err(|e| WebBotAuthError::Invalid(e.to_string()))?;

    let tag = parsed_input
        .params
        .tag
        .as_deref()
        .ok_or_else(|| WebBotAuthError::Invalid("missing tag parameter".into()))?;
    if tag != WEB_BOT_AUTH_TAG {
        return Err(WebBotAuthError::Invalid(format!(
            "unexpected signature tag {tag}"
        )));
    }

    for required in REQUIRED_COMPONENTS {
        if !parsed_input.covers(required) {
            return Err(WebBotAuthError::MissingComponent(required));
        }
    }

    if parsed_input.label != parsed_signature.label {
        return Err(WebBotAuthError::LabelMismatch);
    }

    let created = parsed_input
        .params
        .created
        .ok_or_else(|| WebBotAuthError::Invalid("missing created parameter".into()))?;
    let expires = parsed_input
        .params
        .expires
        .ok_or_else(|| WebBotAuthError::Invalid("missing expires parameter".into()))?;
    if expires < created || expires - created > MAX_WINDOW_SECS {
        return Err(WebBotAuthError::WindowTooLong);
    }
    let now = now.as_secs();
    if now + SKEW_SECS < created || now > expires + SKEW_SECS {
        return Err(WebBotAuthError::ExpiredOrNotYetValid);
    }

    let key_id = parsed_input
        .params
        .key_id
        .as_deref()
        .ok_or_else(|| WebBotAuthError::Invalid("missing keyid parameter".into()))?;

    let agent_url = directory::agent_url(request.signature_agent)
        .map_err(|e| WebBotAuthError::Invalid(e.to_string()))?;
    let base = base::signature_base(
        request.payment_signature_header,
        request.signature_agent,
        request.url,
        &parsed_input.signature_params,
    )
    .map_err(|e| WebBotAuthError::Invalid(e.to_string()))?;

    let keys = directory.fetch(&agent_url).await?;
    let Some((thumbprint, key)) = select_key(&keys, key_id) else {
        directory.invalidate(&agent_url);
        return Err(WebBotAuthError::KeyNotFound);
    };

    let signature = Signature::from_slice(&parsed_signature.signature)
        .map_err(|_| WebBotAuthError::SignatureVerifyFailed)?;
    key.verify_strict(base.as_bytes(), &signature)
        .map_err(|_| WebBotAuthError::SignatureVerifyFailed)?;

    Ok(thumbprint)
}

/// Picks the Ed25519 directory key whose RFC 7638 thumbprint equals `key_id`.
fn select_key(keys: &[Jwk], key_id: &str) -> Option<(String, VerifyingKey)> {
    for jwk in keys {
        let Some(thumbprint) = jwk.thumbprint() else {
            continue;
        };
        if thumbprint != key_id {
            continue;
        }
        if let Some(key) = jwk.verifying_key() {
            return Some((thumbprint, key));
        }
    }
    None
}
