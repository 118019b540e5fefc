//! The core facilitator contract.
//!
//! A facilitator accepts `{ paymentPayload, paymentRequirements }` pairs and
//! answers with verification or settlement results. Semantic failures come
//! back as values inside [`VerifyResponse`] / [`SettleResponse`]; the error
//! type is reserved for malformed requests and internal faults.

use serde::{Deserialize, Serialize};

use crate::proto::{
    PaymentPayload, PaymentRequirements, SettleResponse, SupportedResponse, VerifyResponse,
};

/// Body of `POST /verify` and `POST /settle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    /// The signed payment attempt.
    pub payment_payload: PaymentPayload,
    /// The requirements to verify against.
    pub payment_requirements: PaymentRequirements,
}

/// Settlement uses the same request shape as verification.
pub type SettleRequest = VerifyRequest;

/// A payment facilitator: verifies payment payloads and settles them.
///
/// Implementations may verify and settle locally (scheme registry dispatch)
/// or proxy to a remote facilitator over HTTP.
pub trait Facilitator {
    /// Error type for malformed requests and internal faults.
    type Error;

    /// Verifies a payment payload against requirements.
    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send;

    /// Settles a verified payment.
    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send;

    /// Enumerates the payment kinds this facilitator supports.
    fn supported(&self) -> impl Future<Output = Result<SupportedResponse, Self::Error>> + Send;
}
