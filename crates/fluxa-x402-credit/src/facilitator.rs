//! Facilitator-side verification and settlement for the credit scheme.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use fluxa_x402_types::chain::ChainIdPattern;
use fluxa_x402_types::codec::canonical_eq;
use fluxa_x402_types::proto::{
    ErrorReason, PaymentPayload, PaymentRequirements, SettleResponse, VerifyResponse,
    WEB_BOT_AUTH_EXTENSION,
};
use fluxa_x402_types::scheme::{FacilitatorScheme, SchemeError, X402SchemeId};
use fluxa_x402_types::timestamp::UnixTimestamp;

use crate::http_signature::directory::KeyDirectory;
use crate::http_signature::{VerificationRequest, verify_web_bot_auth};
use crate::types::{CreditPayload, FluxaCreditExtra, FluxaCreditScheme, WebBotAuthEnvelope, credit_network};

/// Facilitator for the `fluxacredit` scheme.
///
/// Verification delegates to the HTTP Message Signature verifier; settlement
/// debits a synthetic credit ledger keyed on `requirements.extra.id`, so
/// repeated settles with one id return the same transaction and charge once.
pub struct CreditFacilitator {
    directory: Arc<dyn KeyDirectory>,
    network: ChainIdPattern,
    ledger: DashMap<String, String>,
}

impl CreditFacilitator {
    /// Creates a credit facilitator resolving keys through `directory`,
    /// registered under the default `fluxa:monetize` network.
    pub fn new(directory: Arc<dyn KeyDirectory>) -> Self {
        Self {
            directory,
            network: credit_network(),
            ledger: DashMap::new(),
        }
    }

    /// Overrides the network this facilitator is registered under.
    pub fn with_network(mut self, network: ChainIdPattern) -> Self {
        self.network = network;
        self
    }

    /// The fallback payer identity carried inside the scheme payload.
    fn agent_id_fallback(payload: &PaymentPayload) -> Option<String> {
        serde_json::from_value::<CreditPayload>(payload.payload.clone())
            .ok()
            .and_then(|p| p.agent_id)
    }
}

impl X402SchemeId for CreditFacilitator {
    fn scheme(&self) -> &str {
        FluxaCreditScheme::VALUE
    }

    fn network(&self) -> ChainIdPattern {
        self.network.clone()
    }
}

#[async_trait]
impl FacilitatorScheme for CreditFacilitator {
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, SchemeError> {
        // Structural binding: the accepted requirements must deep-equal the
        // server's requirements after key-sort normalization.
        let accepted = serde_json::to_value(&payload.accepted)?;
        let required = serde_json::to_value(requirements)?;
        if !canonical_eq(&accepted, &required) {
            return Ok(VerifyResponse::invalid(
                ErrorReason::AcceptedRequirementsMismatch,
            ));
        }

        let fallback = Self::agent_id_fallback(payload);
        let invalid = |reason: ErrorReason| match &fallback {
            Some(payer) => VerifyResponse::invalid_with_payer(reason, payer.clone()),
            None => VerifyResponse::invalid(reason),
        };

        let Some(extension) = payload.extension(WEB_BOT_AUTH_EXTENSION) else {
            return Ok(invalid(ErrorReason::InvalidWebBotAuth));
        };
        let Ok(envelope) = serde_json::from_value::<WebBotAuthEnvelope>(extension.clone()) else {
            return Ok(invalid(ErrorReason::InvalidWebBotAuth));
        };
        let Some(resource) = payload.resource.as_ref() else {
            return Ok(invalid(ErrorReason::InvalidWebBotAuth));
        };

        let request = VerificationRequest {
            signature_agent: &envelope.signature_agent,
            signature_input: &envelope.signature_input,
            signature: &envelope.signature,
            payment_signature_header: &envelope.payment_signature_header,
            method: "GET",
            url: &resource.url,
        };
        match verify_web_bot_auth(self.directory.as_ref(), &request, UnixTimestamp::now()).await {
            Ok(thumbprint) => Ok(VerifyResponse::valid(thumbprint)),
            Err(e) => {
                tracing::debug!(reason = %e, "web-bot-auth verification failed");
                Ok(invalid(e.reason()))
            }
        }
    }

    async fn settle(
        &self,
        _payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, SchemeError> {
        let extra = requirements
            .extra
            .as_ref()
            .and_then(|extra| serde_json::from_value::<FluxaCreditExtra>(extra.clone()).ok());
        let Some(extra) = extra else {
            return Ok(SettleResponse::Error {
                reason: ErrorReason::InvalidRequirementsExtra,
                network: requirements.network.clone(),
            });
        };

        let transaction = self
            .ledger
            .entry(extra.id.clone())
            .or_insert_with(|| format!("credit-ledger:{}", extra.id))
            .clone();
        tracing::info!(id = %extra.id, transaction = %transaction, "credit settle");
        Ok(SettleResponse::Success {
            transaction,
            network: requirements.network.clone(),
            payer: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::CreditClient;
    use crate::http_signature::directory::Jwk;
    use crate::http_signature::directory::tests_support::StaticDirectory;
    use crate::server::attach_web_bot_auth;
    use crate::types::FLUXA_CREDIT_ASSET;
    use ed25519_dalek::SigningKey;
    use fluxa_x402_types::chain::ChainId;
    use fluxa_x402_types::codec::decode_header;
    use fluxa_x402_types::proto::ResourceInfo;
    use fluxa_x402_types::scheme::ClientScheme;
    use serde_json::json;

    const AGENT_URL: &str = "https://agent.example/directory";
    const RESOURCE_URL: &str = "https://api.example.com/resource";

    fn requirements() -> PaymentRequirements {
        PaymentRequirements {
            scheme: "fluxacredit".into(),
            network: ChainId::new("fluxa", "monetize"),
            amount: "25".parse().unwrap(),
            asset: FLUXA_CREDIT_ASSET.into(),
            pay_to: "fluxa:facilitator:us-east-1".into(),
            max_timeout_seconds: 60,
            extra: Some(json!({"id": "abc123"})),
        }
    }

    fn resource() -> ResourceInfo {
        ResourceInfo {
            url: RESOURCE_URL.into(),
            description: None,
            mime_type: None,
        }
    }

    fn setup() -> (CreditFacilitator, CreditClient, String) {
        let key = SigningKey::from_bytes(&[9u8; 32]);
        let jwk = Jwk::from_ed25519(&key.verifying_key());
        let thumbprint = jwk.thumbprint().unwrap();
        let directory = StaticDirectory::new(AGENT_URL, vec![jwk]);
        let facilitator = CreditFacilitator::new(Arc::new(directory));
        let client = CreditClient::new(key, AGENT_URL.parse().unwrap());
        (facilitator, client, thumbprint)
    }

    /// Replays a signed payment the way the resource server forwards it:
    /// decode the header, then attach the raw header bytes as the
    /// web-bot-auth extension.
    async fn forwarded_payload(client: &CreditClient) -> PaymentPayload {
        let signed = client.create_payment(&requirements(), &resource()).await.unwrap();
        let mut payload: PaymentPayload = decode_header(&signed.payment_header).unwrap();
        let headers: std::collections::HashMap<_, _> =
            signed.auxiliary_headers.iter().cloned().collect();
        attach_web_bot_auth(
            &mut payload,
            WebBotAuthEnvelope {
                signature_agent: headers["signature-agent"].clone(),
                signature_input: headers["signature-input"].clone(),
                signature: headers["signature"].clone(),
                payment_signature_header: signed.payment_header.clone(),
            },
        );
        payload
    }

    #[tokio::test]
    async fn test_verify_happy_path_identifies_thumbprint() {
        let (facilitator, client, thumbprint) = setup();
        let payload = forwarded_payload(&client).await;
        let response = facilitator.verify(&payload, &requirements()).await.unwrap();
        assert_eq!(response, VerifyResponse::valid(thumbprint));
    }

    #[tokio::test]
    async fn test_verify_rejects_requirements_drift() {
        let (facilitator, client, _) = setup();
        let payload = forwarded_payload(&client).await;
        let mut drifted = requirements();
        drifted.amount = "26".parse().unwrap();
        let response = facilitator.verify(&payload, &drifted).await.unwrap();
        assert_eq!(
            response,
            VerifyResponse::invalid(ErrorReason::AcceptedRequirementsMismatch)
        );
    }

    #[tokio::test]
    async fn test_verify_missing_envelope_falls_back_to_agent_id() {
        let (facilitator, client, _) = setup();
        let signed = client.create_payment(&requirements(), &resource()).await.unwrap();
        let payload: PaymentPayload = decode_header(&signed.payment_header).unwrap();
        // No extensions attached at all.
        let response = facilitator.verify(&payload, &requirements()).await.unwrap();
        match response {
            VerifyResponse::Invalid { reason, payer } => {
                assert_eq!(reason, ErrorReason::InvalidWebBotAuth);
                assert!(payer.is_some());
            }
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verify_incomplete_envelope() {
        let (facilitator, client, _) = setup();
        let mut payload = forwarded_payload(&client).await;
        let extensions = payload.extensions.as_mut().unwrap();
        extensions.insert(
            WEB_BOT_AUTH_EXTENSION.into(),
            json!({"signatureAgent": "\"https://agent.example/directory\""}),
        );
        let response = facilitator.verify(&payload, &requirements()).await.unwrap();
        assert!(!response.is_valid());
    }

    #[tokio::test]
    async fn test_settle_is_idempotent() {
        let (facilitator, client, _) = setup();
        let payload = forwarded_payload(&client).await;
        let first = facilitator.settle(&payload, &requirements()).await.unwrap();
        let second = facilitator.settle(&payload, &requirements()).await.unwrap();
        match (&first, &second) {
            (
                SettleResponse::Success { transaction: a, .. },
                SettleResponse::Success { transaction: b, .. },
            ) => {
                assert_eq!(a, "credit-ledger:abc123");
                assert_eq!(a, b);
            }
            other => panic!("expected success pair, got {other:?}"),
        }
        assert_eq!(facilitator.ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_settle_requires_extra_id() {
        let (facilitator, client, _) = setup();
        let payload = forwarded_payload(&client).await;
        let mut bare = requirements();
        bare.extra = None;
        let response = facilitator.settle(&payload, &bare).await.unwrap();
        assert_eq!(
            response,
            SettleResponse::Error {
                reason: ErrorReason::InvalidRequirementsExtra,
                network: ChainId::new("fluxa", "monetize"),
            }
        );
    }
}
