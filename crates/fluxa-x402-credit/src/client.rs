//! Client-side signing for the credit scheme.
//!
//! The client builds the `PAYMENT-SIGNATURE` header first, then signs an
//! RFC 9421 base covering that header, its own `Signature-Agent` URL, and
//! the resource authority. The three auxiliary headers ride along with the
//! retried request.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use ed25519_dalek::{Signer, SigningKey};
use rand::Rng;
use url::Url;

use fluxa_x402_types::chain::ChainIdPattern;
use fluxa_x402_types::codec::encode_header;
use fluxa_x402_types::proto::{PaymentPayload, PaymentRequirements, ResourceInfo, X402Version2};
use fluxa_x402_types::scheme::{ClientScheme, SchemeError, SignedPayment, X402SchemeId};
use fluxa_x402_types::timestamp::UnixTimestamp;

use crate::http_signature::base::signature_base;
use crate::http_signature::directory::Jwk;
use crate::types::{CreditPayload, FluxaCreditScheme, credit_network};

/// Default signature validity window. Must not exceed the verifier's 60 s
/// ceiling.
const DEFAULT_WINDOW_SECS: u64 = 30;

const SIGNATURE_LABEL: &str = "sig1";

/// Client for the `fluxacredit` scheme.
///
/// Holds the Ed25519 signing key whose public half is published in the
/// agent's key directory.
pub struct CreditClient {
    signing_key: SigningKey,
    signature_agent: Url,
    network: ChainIdPattern,
    window_secs: u64,
}

impl CreditClient {
    /// Creates a client signing with `signing_key` and advertising
    /// `signature_agent` as its key directory.
    pub fn new(signing_key: SigningKey, signature_agent: Url) -> Self {
        Self {
            signing_key,
            signature_agent,
            network: credit_network(),
            window_secs: DEFAULT_WINDOW_SECS,
        }
    }

    /// The RFC 7638 thumbprint of this client's signing key; doubles as the
    /// `keyid` parameter and the self-declared agent id.
    pub fn thumbprint(&self) -> String {
        Jwk::from_ed25519(&self.signing_key.verifying_key())
            .thumbprint()
            .expect("own key is always an Ed25519 OKP key")
    }
}

impl X402SchemeId for CreditClient {
    fn scheme(&self) -> &str {
        FluxaCreditScheme::VALUE
    }

    fn network(&self) -> ChainIdPattern {
        self.network.clone()
    }
}

#[async_trait]
impl ClientScheme for CreditClient {
    async fn create_payment(
        &self,
        requirements: &PaymentRequirements,
        resource: &ResourceInfo,
    ) -> Result<SignedPayment, SchemeError> {
        let thumbprint = self.thumbprint();
        let payload = PaymentPayload {
            x402_version: X402Version2,
            resource: Some(resource.clone()),
            accepted: requirements.clone(),
            payload: serde_json::to_value(CreditPayload {
                agent_id: Some(thumbprint.clone()),
            })?,
            extensions: None,
        };
        let payment_header =
            encode_header(&payload).map_err(|e| SchemeError::Internal(e.to_string()))?;

        let created = UnixTimestamp::now().as_secs();
        let expires = created + self.window_secs;
        let nonce: [u8; 16] = rand::rng().random();
        let nonce = hex::encode(nonce);

        let signature_agent = format!("\"{}\"", self.signature_agent);
        let signature_input = format!(
            "{SIGNATURE_LABEL}=(\"payment-signature\" \"signature-agent\" \"@authority\")\
             ;created={created};expires={expires};keyid=\"{thumbprint}\"\
             ;nonce=\"{nonce}\";tag=\"web-bot-auth\""
        );
        let params_start = signature_input
            .find('(')
            .expect("component list opener was just formatted in");

        let base = signature_base(
            &payment_header,
            &signature_agent,
            &resource.url,
            &signature_input[params_start..],
        )
        .map_err(|e| SchemeError::Internal(e.to_string()))?;
        let signature = self.signing_key.sign(base.as_bytes());
        let signature = format!("{SIGNATURE_LABEL}=:{}:", b64.encode(signature.to_bytes()));

        Ok(SignedPayment {
            payment_header,
            auxiliary_headers: vec![
                ("signature-agent", signature_agent),
                ("signature-input", signature_input),
                ("signature", signature),
            ],
        })
    }
}
