//! Wire types for the `fluxacredit` scheme.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use fluxa_x402_types::chain::ChainIdPattern;
use fluxa_x402_types::lit_str;

lit_str!(FluxaCreditScheme, "fluxacredit");

/// The asset symbol every credit-scheme offer must carry.
pub const FLUXA_CREDIT_ASSET: &str = "FLUXA_CREDIT";

/// The logical network the credit scheme is registered under.
pub fn credit_network() -> ChainIdPattern {
    ChainIdPattern::exact("fluxa", "monetize")
}

/// `requirements.extra` for the credit scheme.
///
/// The `id` keys idempotent settlement: repeated settles with the same id
/// return the same ledger transaction and do not double-charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FluxaCreditExtra {
    /// Unique per-issuance settlement id.
    pub id: String,
}

/// Scheme-specific `payload.payload` for the credit scheme.
///
/// The agent id is a fallback payer identity used when HTTP Message
/// Signature verification cannot produce a JWK thumbprint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreditPayload {
    /// Self-declared agent identity; untrusted without a verified signature.
    #[serde(
        rename = "signature-fluxa-ai-agent-id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub agent_id: Option<String>,
}

/// Raw web-bot-auth header material, passed by the resource server through
/// `extensions["web-bot-auth"]`.
///
/// `payment_signature_header` must be the exact bytes of the
/// `PAYMENT-SIGNATURE` header as received: they are part of the signature
/// base.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebBotAuthEnvelope {
    /// `Signature-Agent` header value, double quotes included.
    pub signature_agent: String,
    /// `Signature-Input` header value.
    pub signature_input: String,
    /// `Signature` header value.
    pub signature: String,
    /// Exact received bytes of the `PAYMENT-SIGNATURE` header.
    pub payment_signature_header: String,
}
