//! Resource-server-side pieces of the credit scheme.
//!
//! The resource server issues offers priced in credits and, on a retried
//! request, passes the raw web-bot-auth header bytes through to the
//! facilitator via `extensions["web-bot-auth"]`. The facilitator reads only
//! from that extension; raw HTTP headers are never consulted.

use rand::Rng;
use serde_json::{Value, json};

use fluxa_x402_types::chain::ChainIdPattern;
use fluxa_x402_types::proto::{PaymentPayload, PaymentRequirements, WEB_BOT_AUTH_EXTENSION};
use fluxa_x402_types::scheme::{ParsedPrice, PriceError, ServerScheme, X402SchemeId};

use crate::types::{FLUXA_CREDIT_ASSET, FluxaCreditScheme, WebBotAuthEnvelope, credit_network};

/// Server-side handler for the `fluxacredit` scheme.
#[derive(Debug, Clone)]
pub struct FluxaCreditServer {
    network: ChainIdPattern,
}

impl Default for FluxaCreditServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FluxaCreditServer {
    /// Creates a server handler for the default `fluxa:monetize` network.
    pub fn new() -> Self {
        Self {
            network: credit_network(),
        }
    }
}

impl X402SchemeId for FluxaCreditServer {
    fn scheme(&self) -> &str {
        FluxaCreditScheme::VALUE
    }

    fn network(&self) -> ChainIdPattern {
        self.network.clone()
    }
}

impl ServerScheme for FluxaCreditServer {
    /// Parses a price specification into a credit amount.
    ///
    /// Accepted shapes:
    ///
    /// - object `{ "amount": ..., "asset": "FLUXA_CREDIT" }`; the asset is
    ///   mandatory and must be `FLUXA_CREDIT`
    /// - bare number or decimal string, truncated toward zero
    fn parse_price(&self, price: &Value) -> Result<ParsedPrice, PriceError> {
        let amount = match price {
            Value::Object(map) => {
                let asset = map
                    .get("asset")
                    .and_then(Value::as_str)
                    .ok_or_else(|| PriceError::InvalidPrice("price object without asset".into()))?;
                if asset != FLUXA_CREDIT_ASSET {
                    return Err(PriceError::UnsupportedAsset(asset.to_string()));
                }
                let amount = map
                    .get("amount")
                    .ok_or_else(|| PriceError::InvalidPrice("price object without amount".into()))?;
                truncate_to_credits(amount)?
            }
            other => truncate_to_credits(other)?,
        };
        Ok(ParsedPrice {
            amount,
            asset: FLUXA_CREDIT_ASSET.to_string(),
        })
    }

    /// Injects a unique settlement id when the issuer did not provide one.
    ///
    /// The id keys idempotent settlement; 128 random bits make collisions
    /// negligible per issuance.
    fn enhance_payment_requirements(&self, requirements: &mut PaymentRequirements) {
        let has_id = requirements
            .extra
            .as_ref()
            .and_then(|extra| extra.get("id"))
            .is_some();
        if has_id {
            return;
        }
        let id: [u8; 16] = rand::rng().random();
        let id = hex::encode(id);
        match &mut requirements.extra {
            Some(Value::Object(map)) => {
                map.insert("id".into(), Value::String(id));
            }
            slot => *slot = Some(json!({ "id": id })),
        }
    }
}

/// Truncates a numeric or string price toward zero into whole credits.
fn truncate_to_credits(value: &Value) -> Result<fluxa_x402_types::amount::Amount, PriceError> {
    let text = match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u.to_string()
            } else if let Some(f) = n.as_f64() {
                if f < 0.0 {
                    return Err(PriceError::InvalidPrice(n.to_string()));
                }
                format!("{}", f.trunc() as u128)
            } else {
                return Err(PriceError::InvalidPrice(n.to_string()));
            }
        }
        Value::String(s) => {
            let s = s.trim();
            if s.starts_with('-') {
                return Err(PriceError::InvalidPrice(s.to_string()));
            }
            let integer = s.split('.').next().unwrap_or_default();
            if integer.is_empty() {
                "0".to_string()
            } else if !integer.bytes().all(|b| b.is_ascii_digit()) {
                return Err(PriceError::InvalidPrice(s.to_string()));
            } else {
                let trimmed = integer.trim_start_matches('0');
                if trimmed.is_empty() { "0" } else { trimmed }.to_string()
            }
        }
        other => return Err(PriceError::InvalidPrice(other.to_string())),
    };
    text.parse()
        .map_err(|e| PriceError::InvalidPrice(format!("{text}: {e}")))
}

/// Attaches the raw web-bot-auth header bytes to a decoded payment payload.
///
/// The resource server calls this before forwarding the payload to a
/// facilitator; `envelope.payment_signature_header` must be the exact bytes
/// of the `PAYMENT-SIGNATURE` header as received.
pub fn attach_web_bot_auth(payload: &mut PaymentPayload, envelope: WebBotAuthEnvelope) {
    let extensions = payload.extensions.get_or_insert_with(Default::default);
    extensions.insert(
        WEB_BOT_AUTH_EXTENSION.into(),
        serde_json::to_value(envelope).expect("envelope serialization is infallible"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluxa_x402_types::chain::ChainId;
    use serde_json::json;

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: FluxaCreditScheme::VALUE.into(),
            network: ChainId::new("fluxa", "monetize"),
            amount: "25".parse().unwrap(),
            asset: FLUXA_CREDIT_ASSET.into(),
            pay_to: "fluxa:facilitator:us-east-1".into(),
            max_timeout_seconds: 60,
            extra: None,
        }
    }

    #[test]
    fn test_parse_price_object_requires_credit_asset() {
        let server = FluxaCreditServer::new();
        let parsed = server
            .parse_price(&json!({"amount": "25", "asset": "FLUXA_CREDIT"}))
            .unwrap();
        assert_eq!(parsed.amount.to_string(), "25");
        assert_eq!(parsed.asset, "FLUXA_CREDIT");

        let err = server.parse_price(&json!({"amount": "25", "asset": "USDC"}));
        assert!(matches!(err, Err(PriceError::UnsupportedAsset(_))));
    }

    #[test]
    fn test_parse_price_truncates_toward_zero() {
        let server = FluxaCreditServer::new();
        assert_eq!(server.parse_price(&json!(12.9)).unwrap().amount.to_string(), "12");
        assert_eq!(server.parse_price(&json!(25)).unwrap().amount.to_string(), "25");
        assert_eq!(server.parse_price(&json!("12.9")).unwrap().amount.to_string(), "12");
        assert_eq!(server.parse_price(&json!("0.5")).unwrap().amount.to_string(), "0");
    }

    #[test]
    fn test_parse_price_rejects_negative() {
        let server = FluxaCreditServer::new();
        assert!(server.parse_price(&json!(-3)).is_err());
        assert!(server.parse_price(&json!("-3")).is_err());
        assert!(server.parse_price(&json!(null)).is_err());
    }

    #[test]
    fn test_enhance_injects_unique_id() {
        let server = FluxaCreditServer::new();
        let mut a = requirements();
        let mut b = requirements();
        server.enhance_payment_requirements(&mut a);
        server.enhance_payment_requirements(&mut b);
        let id_a = a.extra.unwrap()["id"].as_str().unwrap().to_string();
        let id_b = b.extra.unwrap()["id"].as_str().unwrap().to_string();
        assert_eq!(id_a.len(), 32);
        assert_ne!(id_a, id_b);
    }

    #[test]
    fn test_enhance_keeps_existing_id() {
        let server = FluxaCreditServer::new();
        let mut r = requirements();
        r.extra = Some(json!({"id": "abc123"}));
        server.enhance_payment_requirements(&mut r);
        assert_eq!(r.extra.unwrap()["id"], "abc123");
    }
}
