//! Wire format types for x402 v2 protocol messages.
//!
//! These types define the JSON shapes exchanged between buyers, sellers, and
//! facilitators: the 402 offer ([`PaymentRequired`]), the payment attempt
//! ([`PaymentPayload`]), and the facilitator responses
//! ([`VerifyResponse`], [`SettleResponse`]).
//!
//! All types serialize with camelCase field names. Monetary amounts and
//! timestamps travel as decimal strings; see [`crate::amount`] and
//! [`crate::timestamp`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::fmt::{Display, Formatter};

use crate::amount::Amount;
use crate::chain::ChainId;
use crate::timestamp::UnixTimestamp;

/// Version marker for x402 protocol version 2.
///
/// Serializes as the integer `2`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct X402Version2;

impl X402Version2 {
    pub const VALUE: u8 = 2;
}

impl From<X402Version2> for u8 {
    fn from(_: X402Version2) -> Self {
        X402Version2::VALUE
    }
}

impl Serialize for X402Version2 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version2 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        if num == Self::VALUE {
            Ok(X402Version2)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected version {}, got {}",
                Self::VALUE,
                num
            )))
        }
    }
}

impl Display for X402Version2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::VALUE)
    }
}

/// Metadata about the resource being paid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// URL of the resource.
    pub url: String,
    /// Human-readable description of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of the resource content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// One accepted way to pay, set by the seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// The payment scheme identifier (e.g., `"fluxacredit"`, `"odp-deferred"`).
    pub scheme: String,
    /// The CAIP-2 network identifier.
    pub network: ChainId,
    /// The payment amount in the asset's smallest unit.
    pub amount: Amount,
    /// Scheme-specific asset identifier (token address or logical symbol).
    pub asset: String,
    /// The payee identifier (address or logical name).
    pub pay_to: String,
    /// Maximum time in seconds for payment validity.
    pub max_timeout_seconds: u64,
    /// Scheme-specific extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// HTTP 402 Payment Required response body.
///
/// Returned when a resource requires payment; lists the acceptable payment
/// methods and the resource metadata. Travels base64url-encoded in the
/// `PAYMENT-REQUIRED` header.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version (always 2).
    pub x402_version: X402Version2,
    /// Optional error message if the previous attempt was malformed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Information about the resource being paid for.
    pub resource: ResourceInfo,
    /// Non-empty ordered list of acceptable payment methods.
    pub accepts: Vec<PaymentRequirements>,
}

/// Extensions key under which the resource server passes the raw
/// web-bot-auth header material through to the facilitator.
pub const WEB_BOT_AUTH_EXTENSION: &str = "web-bot-auth";

/// One payment attempt from the buyer.
///
/// Carries the requirements the buyer accepted verbatim, plus the
/// scheme-specific signed payload. Travels base64url-encoded in the
/// `PAYMENT-SIGNATURE` header. The resource server may augment
/// [`extensions`](Self::extensions) with request-bound context before
/// forwarding to a facilitator; the facilitator reads only from there.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version (always 2).
    pub x402_version: X402Version2,
    /// Information about the resource being paid for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceInfo>,
    /// The payment requirements the buyer accepted.
    pub accepted: PaymentRequirements,
    /// The scheme-specific signed payload.
    pub payload: serde_json::Value,
    /// Out-of-band context, notably `web-bot-auth` headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<serde_json::Map<String, serde_json::Value>>,
}

impl PaymentPayload {
    /// Returns the named extension value, if present.
    pub fn extension(&self, key: &str) -> Option<&serde_json::Value> {
        self.extensions.as_ref().and_then(|map| map.get(key))
    }
}

/// Machine-readable reasons for semantic payment failures.
///
/// These travel as `invalidReason` / `errorReason` strings inside 200
/// response bodies; they never raise HTTP errors. The wire names are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    // Scheme and network routing.
    UnsupportedScheme,
    NetworkMismatch,
    // Structural payload problems.
    AcceptedRequirementsMismatch,
    InvalidOdpPayloadMissingReceipt,
    MissingReceiptSignature,
    MissingSessionSignature,
    InvalidRequirementsExtra,
    // Session binding.
    SessionIdMismatch,
    SessionApprovalMismatch,
    MissingSessionApproval,
    RequirementsSessionMismatch,
    // Chain parity.
    SettlementContractMismatch,
    DebitWalletMismatch,
    WithdrawDelayMismatch,
    DebitWalletWithdrawDelayMismatch,
    // Signatures and authorization.
    InvalidSessionSignature,
    InvalidReceiptSignature,
    AuthorizedProcessorsHashMismatch,
    UnauthorizedProcessor,
    // Receipt checks.
    ReceiptNonceMismatch,
    ReceiptAmountMismatch,
    ReceiptAmountExceedsMax,
    ReceiptDeadlineInvalid,
    RequestHashMismatch,
    SessionExpired,
    // Spend and liquidity.
    SessionMaxSpendExceeded,
    InsufficientDebitWalletBalance,
    // Settlement.
    SessionNotFound,
    SettlementInProgress,
    NoReceipts,
    ReceiptNonceGap,
    SettlementTransactionFailed,
    // Web-bot-auth signature verification.
    InvalidWebBotAuth,
    #[serde(rename = "missing_component_payment-signature")]
    MissingComponentPaymentSignature,
    #[serde(rename = "missing_component_signature-agent")]
    MissingComponentSignatureAgent,
    #[serde(rename = "missing_component_@authority")]
    MissingComponentAuthority,
    LabelMismatch,
    WindowTooLong,
    ExpiredOrNotYetValid,
    KeyNotFound,
    SignatureVerifyFailed,
}

impl Display for ErrorReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let tag = serde_json::to_value(self).map_err(|_| fmt::Error)?;
        match tag {
            serde_json::Value::String(s) => write!(f, "{s}"),
            _ => Err(fmt::Error),
        }
    }
}

/// Result of a facilitator `verify` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResponse {
    /// The payload matches the requirements and passes all checks.
    Valid {
        /// Who pays: an address or a JWK thumbprint, scheme-dependent.
        payer: String,
    },
    /// The payload was well-formed but failed a verification check.
    Invalid {
        reason: ErrorReason,
        payer: Option<String>,
    },
}

impl VerifyResponse {
    /// A passing verification attributed to `payer`.
    pub fn valid(payer: impl Into<String>) -> Self {
        VerifyResponse::Valid {
            payer: payer.into(),
        }
    }

    /// A failing verification with the given reason.
    pub fn invalid(reason: ErrorReason) -> Self {
        VerifyResponse::Invalid {
            reason,
            payer: None,
        }
    }

    /// A failing verification that still identifies the payer.
    pub fn invalid_with_payer(reason: ErrorReason, payer: impl Into<String>) -> Self {
        VerifyResponse::Invalid {
            reason,
            payer: Some(payer.into()),
        }
    }

    /// Returns `true` for the `Valid` variant.
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyResponse::Valid { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponseWire {
    is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invalid_reason: Option<ErrorReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
}

impl Serialize for VerifyResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            VerifyResponse::Valid { payer } => VerifyResponseWire {
                is_valid: true,
                invalid_reason: None,
                payer: Some(payer.clone()),
            },
            VerifyResponse::Invalid { reason, payer } => VerifyResponseWire {
                is_valid: false,
                invalid_reason: Some(*reason),
                payer: payer.clone(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for VerifyResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = VerifyResponseWire::deserialize(deserializer)?;
        if wire.is_valid {
            let payer = wire
                .payer
                .ok_or_else(|| serde::de::Error::missing_field("payer"))?;
            Ok(VerifyResponse::Valid { payer })
        } else {
            let reason = wire
                .invalid_reason
                .ok_or_else(|| serde::de::Error::missing_field("invalidReason"))?;
            Ok(VerifyResponse::Invalid {
                reason,
                payer: wire.payer,
            })
        }
    }
}

/// Result of a facilitator `settle` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleResponse {
    /// Settlement succeeded.
    Success {
        /// Transaction identifier (chain hash or synthetic ledger entry).
        transaction: String,
        /// The network settlement happened on.
        network: ChainId,
        /// Who paid, when known.
        payer: Option<String>,
    },
    /// Settlement failed or was not applicable.
    Error {
        reason: ErrorReason,
        network: ChainId,
    },
}

impl SettleResponse {
    /// Returns `true` for the `Success` variant.
    pub fn is_success(&self) -> bool {
        matches!(self, SettleResponse::Success { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleResponseWire {
    success: bool,
    transaction: String,
    network: ChainId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<ErrorReason>,
}

impl Serialize for SettleResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            SettleResponse::Success {
                transaction,
                network,
                payer,
            } => SettleResponseWire {
                success: true,
                transaction: transaction.clone(),
                network: network.clone(),
                payer: payer.clone(),
                error_reason: None,
            },
            SettleResponse::Error { reason, network } => SettleResponseWire {
                success: false,
                transaction: String::new(),
                network: network.clone(),
                payer: None,
                error_reason: Some(*reason),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SettleResponse {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = SettleResponseWire::deserialize(deserializer)?;
        if wire.success {
            Ok(SettleResponse::Success {
                transaction: wire.transaction,
                network: wire.network,
                payer: wire.payer,
            })
        } else {
            let reason = wire
                .error_reason
                .ok_or_else(|| serde::de::Error::missing_field("errorReason"))?;
            Ok(SettleResponse::Error {
                reason,
                network: wire.network,
            })
        }
    }
}

/// `PAYMENT-RESPONSE` header body: the settlement outcome delivered back to
/// the client alongside the resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponseHeader {
    /// The payment scheme that was used.
    pub scheme: String,
    /// The network the payment ran on.
    pub network: ChainId,
    /// Settlement identifier for the credit scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Credits charged (credit scheme).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charged_credits: Option<Amount>,
    /// Settlement transaction (deferred scheme).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    /// When the response was produced.
    pub timestamp: UnixTimestamp,
}

/// Describes a payment method supported by a facilitator.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKind {
    /// The x402 protocol version.
    pub x402_version: u8,
    /// The payment scheme identifier.
    pub scheme: String,
    /// The network identifier or family pattern (e.g., `"eip155:*"`).
    pub network: String,
    /// Optional scheme-specific extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Response from a facilitator's `GET /supported` endpoint.
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    /// List of supported payment kinds.
    pub kinds: Vec<SupportedPaymentKind>,
    /// List of supported protocol extensions.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Map of network identifiers to signer addresses.
    #[serde(default)]
    pub signers: HashMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_header, encode_header};
    use serde_json::json;

    fn sample_requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "fluxacredit".into(),
            network: ChainId::new("fluxa", "monetize"),
            amount: "25".parse().unwrap(),
            asset: "FLUXA_CREDIT".into(),
            pay_to: "fluxa:facilitator:us-east-1".into(),
            max_timeout_seconds: 60,
            extra: Some(json!({"id": "abc123"})),
        }
    }

    #[test]
    fn test_version_marker_wire_form() {
        assert_eq!(serde_json::to_string(&X402Version2).unwrap(), "2");
        assert!(serde_json::from_str::<X402Version2>("2").is_ok());
        assert!(serde_json::from_str::<X402Version2>("1").is_err());
    }

    #[test]
    fn test_payment_required_header_roundtrip() {
        let required = PaymentRequired {
            x402_version: X402Version2,
            error: None,
            resource: ResourceInfo {
                url: "https://api.example.com/resource".into(),
                description: Some("premium endpoint".into()),
                mime_type: Some("application/json".into()),
            },
            accepts: vec![sample_requirements()],
        };
        let header = encode_header(&required).unwrap();
        let decoded: PaymentRequired = decode_header(&header).unwrap();
        let reencoded = encode_header(&decoded).unwrap();
        assert_eq!(header, reencoded);
    }

    #[test]
    fn test_requirements_use_camel_case() {
        let json = serde_json::to_value(sample_requirements()).unwrap();
        assert_eq!(json["payTo"], "fluxa:facilitator:us-east-1");
        assert_eq!(json["maxTimeoutSeconds"], 60);
        assert_eq!(json["amount"], "25");
    }

    #[test]
    fn test_verify_response_wire_shapes() {
        let valid = VerifyResponse::valid("thumb");
        assert_eq!(
            serde_json::to_value(&valid).unwrap(),
            json!({"isValid": true, "payer": "thumb"})
        );

        let invalid = VerifyResponse::invalid(ErrorReason::ReceiptNonceMismatch);
        assert_eq!(
            serde_json::to_value(&invalid).unwrap(),
            json!({"isValid": false, "invalidReason": "receipt_nonce_mismatch"})
        );

        let back: VerifyResponse =
            serde_json::from_value(json!({"isValid": false, "invalidReason": "no_receipts"}))
                .unwrap();
        assert_eq!(back, VerifyResponse::invalid(ErrorReason::NoReceipts));
    }

    #[test]
    fn test_settle_response_wire_shapes() {
        let ok = SettleResponse::Success {
            transaction: "credit-ledger:abc123".into(),
            network: ChainId::new("fluxa", "monetize"),
            payer: None,
        };
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({
                "success": true,
                "transaction": "credit-ledger:abc123",
                "network": "fluxa:monetize"
            })
        );

        let err = SettleResponse::Error {
            reason: ErrorReason::SettlementInProgress,
            network: ChainId::new("eip155", "84532"),
        };
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["errorReason"], "settlement_in_progress");
    }

    #[test]
    fn test_hyphenated_reason_tags() {
        assert_eq!(
            serde_json::to_value(ErrorReason::MissingComponentPaymentSignature).unwrap(),
            "missing_component_payment-signature"
        );
        assert_eq!(
            serde_json::to_value(ErrorReason::MissingComponentAuthority).unwrap(),
            "missing_component_@authority"
        );
        assert_eq!(
            ErrorReason::MissingComponentSignatureAgent.to_string(),
            "missing_component_signature-agent"
        );
    }

    #[test]
    fn test_payload_extension_lookup() {
        let mut extensions = serde_json::Map::new();
        extensions.insert(WEB_BOT_AUTH_EXTENSION.into(), json!({"signature": "x"}));
        let payload = PaymentPayload {
            x402_version: X402Version2,
            resource: None,
            accepted: sample_requirements(),
            payload: json!({}),
            extensions: Some(extensions),
        };
        assert!(payload.extension(WEB_BOT_AUTH_EXTENSION).is_some());
        assert!(payload.extension("other").is_none());
    }
}
