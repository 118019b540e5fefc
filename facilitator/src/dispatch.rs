//! Local facilitator: routes requests to registered scheme handlers.
//!
//! Routing is keyed on the `(scheme, network)` the buyer accepted. An
//! unroutable payment is a semantic failure (`unsupported_scheme` in the 200
//! body), not an HTTP error; only internal scheme faults surface as errors.

use std::sync::Arc;

use fluxa_x402_types::facilitator::{Facilitator, SettleRequest, VerifyRequest};
use fluxa_x402_types::proto::{
    ErrorReason, SettleResponse, SupportedResponse, VerifyResponse,
};
use fluxa_x402_types::scheme::{FacilitatorSchemeRegistry, SchemeError};

/// A [`Facilitator`] that dispatches to local scheme handlers.
#[derive(Clone)]
pub struct FacilitatorLocal {
    handlers: Arc<FacilitatorSchemeRegistry>,
}

impl FacilitatorLocal {
    /// Creates a facilitator over the given handler registry.
    pub fn new(handlers: Arc<FacilitatorSchemeRegistry>) -> Self {
        Self { handlers }
    }
}

/// Internal fault during scheme handling; surfaces as HTTP 500.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct FacilitatorLocalError(#[from] pub SchemeError);

impl Facilitator for FacilitatorLocal {
    type Error = FacilitatorLocalError;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, Self::Error> {
        let accepted = &request.payment_payload.accepted;
        let Some(handler) = self.handlers.lookup(&accepted.scheme, &accepted.network) else {
            return Ok(VerifyResponse::invalid(ErrorReason::UnsupportedScheme));
        };
        let response = handler
            .verify(&request.payment_payload, &request.payment_requirements)
            .await?;
        Ok(response)
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, Self::Error> {
        let accepted = &request.payment_payload.accepted;
        let Some(handler) = self.handlers.lookup(&accepted.scheme, &accepted.network) else {
            return Ok(SettleResponse::Error {
                reason: ErrorReason::UnsupportedScheme,
                network: accepted.network.clone(),
            });
        };
        let response = handler
            .settle(&request.payment_payload, &request.payment_requirements)
            .await?;
        Ok(response)
    }

    async fn supported(&self) -> Result<SupportedResponse, Self::Error> {
        Ok(self.handlers.supported())
    }
}
