//! Scheme traits and the `(scheme, network)` registries.
//!
//! A scheme is a self-contained payment method implementation. Each role
//! has its own trait ([`FacilitatorScheme`], [`ServerScheme`],
//! [`ClientScheme`]) and keeps its own [`SchemeRegistry`] indexed by
//! `(scheme, network)`.
//!
//! Lookup order on `(scheme, network)`:
//!
//! 1. Exact match on the concrete pair.
//! 2. Family match: same scheme, registered pattern is `namespace:*` and the
//!    namespaces agree.
//! 3. Miss: the caller reports `unsupported_scheme`.
//!
//! Registration never rebinds an existing key; a duplicate is a fatal
//! configuration error. Registries are immutable after startup and shared
//! behind `Arc`s, so readers take no lock.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::amount::Amount;
use crate::chain::{ChainId, ChainIdPattern};
use crate::proto::{
    PaymentPayload, PaymentRequired, PaymentRequirements, ResourceInfo, SettleResponse,
    SupportedPaymentKind, SupportedResponse, VerifyResponse, X402Version2,
};

/// Identity of a scheme implementation: scheme name plus the network or
/// network family it serves.
pub trait X402SchemeId {
    /// The scheme identifier (e.g., `"fluxacredit"`, `"odp-deferred"`).
    fn scheme(&self) -> &str;
    /// The network pattern this implementation is registered under.
    fn network(&self) -> ChainIdPattern;
}

/// Non-semantic scheme failure: malformed input or an internal fault.
///
/// Semantic payment failures never surface here; they are carried as
/// [`VerifyResponse::Invalid`] / [`SettleResponse::Error`] values in a 200
/// body. A `SchemeError` becomes an HTTP 4xx/5xx.
#[derive(Debug, thiserror::Error)]
pub enum SchemeError {
    /// The scheme-specific payload or extra did not have the expected shape.
    #[error("invalid payload format: {0}")]
    Format(#[from] serde_json::Error),
    /// An internal fault (store, chain adaptor, signer).
    #[error("{0}")]
    Internal(String),
}

/// Facilitator-side scheme implementation: verification and settlement.
#[async_trait]
pub trait FacilitatorScheme: X402SchemeId + Send + Sync {
    /// Verifies a payment payload against the requirements.
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, SchemeError>;

    /// Settles a verified payment.
    async fn settle(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, SchemeError>;

    /// Scheme-provided metadata for discovery.
    fn extra(&self) -> Option<serde_json::Value> {
        None
    }

    /// Signer addresses this implementation settles with.
    fn signers(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Price parsed by a server scheme: amount plus resolved asset identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPrice {
    /// The charge in the asset's smallest unit.
    pub amount: Amount,
    /// The asset identifier the requirements will carry.
    pub asset: String,
}

/// Error returned when a price specification cannot be parsed.
#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    /// The price object names an asset the scheme does not serve.
    #[error("unsupported asset {0}")]
    UnsupportedAsset(String),
    /// The price is not a non-negative number or decimal string.
    #[error("invalid price: {0}")]
    InvalidPrice(String),
}

/// Resource-server-side scheme implementation.
pub trait ServerScheme: X402SchemeId + Send + Sync {
    /// Parses a caller-supplied price specification into an amount and asset.
    fn parse_price(&self, price: &serde_json::Value) -> Result<ParsedPrice, PriceError>;

    /// Augments freshly issued requirements with scheme data (e.g., a unique
    /// settlement id).
    fn enhance_payment_requirements(&self, requirements: &mut PaymentRequirements);
}

/// A payment produced by a client scheme, ready to attach to the retried
/// request.
#[derive(Debug, Clone)]
pub struct SignedPayment {
    /// Value of the `PAYMENT-SIGNATURE` header.
    pub payment_header: String,
    /// Auxiliary headers required by the scheme (name, value pairs).
    pub auxiliary_headers: Vec<(&'static str, String)>,
}

/// Client-side scheme implementation: turns an accepted offer into a
/// payment.
#[async_trait]
pub trait ClientScheme: X402SchemeId + Send + Sync {
    /// Produces a signed payment for the given requirements.
    async fn create_payment(
        &self,
        requirements: &PaymentRequirements,
        resource: &ResourceInfo,
    ) -> Result<SignedPayment, SchemeError>;
}

/// Error raised when a registration would rebind an existing key.
#[derive(Debug, thiserror::Error)]
#[error("scheme {scheme} is already registered for {network}")]
pub struct DuplicateSchemeError {
    /// The offending scheme identifier.
    pub scheme: String,
    /// The offending network pattern.
    pub network: ChainIdPattern,
}

/// A registry of scheme implementations indexed by `(scheme, network)`.
///
/// Generic over the role trait: instantiate as
/// [`FacilitatorSchemeRegistry`], [`ServerSchemeRegistry`], or
/// [`ClientSchemeRegistry`].
pub struct SchemeRegistry<T: ?Sized> {
    entries: Vec<Arc<T>>,
    exact: HashMap<(String, ChainId), usize>,
    family: HashMap<(String, String), usize>,
}

/// Registry of facilitator-side scheme handlers.
pub type FacilitatorSchemeRegistry = SchemeRegistry<dyn FacilitatorScheme>;
/// Registry of server-side scheme handlers.
pub type ServerSchemeRegistry = SchemeRegistry<dyn ServerScheme>;
/// Registry of client-side scheme handlers.
pub type ClientSchemeRegistry = SchemeRegistry<dyn ClientScheme>;

impl<T: X402SchemeId + ?Sized> Default for SchemeRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: X402SchemeId + ?Sized> SchemeRegistry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            exact: HashMap::new(),
            family: HashMap::new(),
        }
    }

    /// Registers a handler under its `(scheme, network)` key.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateSchemeError`] when the key is already bound;
    /// rebinding is a fatal configuration error.
    pub fn register(&mut self, handler: Arc<T>) -> Result<(), DuplicateSchemeError> {
        let scheme = handler.scheme().to_string();
        let pattern = handler.network();
        let index = self.entries.len();
        match &pattern {
            ChainIdPattern::Exact {
                namespace,
                reference,
            } => {
                let key = (scheme.clone(), ChainId::new(namespace, reference.clone()));
                if self.exact.contains_key(&key) {
                    return Err(DuplicateSchemeError {
                        scheme,
                        network: pattern,
                    });
                }
                self.exact.insert(key, index);
            }
            ChainIdPattern::Wildcard { namespace } => {
                let key = (scheme.clone(), namespace.clone());
                if self.family.contains_key(&key) {
                    return Err(DuplicateSchemeError {
                        scheme,
                        network: pattern,
                    });
                }
                self.family.insert(key, index);
            }
        }
        self.entries.push(handler);
        Ok(())
    }

    /// Builder-style registration for startup wiring.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate key: rebinding a registered scheme is a fatal
    /// configuration error.
    pub fn and_register(mut self, handler: Arc<T>) -> Self {
        if let Err(e) = self.register(handler) {
            panic!("{e}");
        }
        self
    }

    /// Resolves a handler for `(scheme, network)`: exact match first, then
    /// the scheme's family for the network's namespace.
    pub fn lookup(&self, scheme: &str, network: &ChainId) -> Option<&Arc<T>> {
        let exact_key = (scheme.to_string(), network.clone());
        if let Some(&index) = self.exact.get(&exact_key) {
            return Some(&self.entries[index]);
        }
        let family_key = (scheme.to_string(), network.namespace.clone());
        self.family.get(&family_key).map(|&index| &self.entries[index])
    }

    /// Iterates handlers in registration order.
    pub fn values(&self) -> impl Iterator<Item = &Arc<T>> {
        self.entries.iter()
    }
}

/// Error produced when answering a 402 offer.
#[derive(Debug, thiserror::Error)]
pub enum PayError {
    /// None of the offered payment methods has a registered client scheme.
    #[error("no offered payment method is supported")]
    NoSupportedScheme,
    /// The selected scheme failed to produce a payment.
    #[error(transparent)]
    Scheme(#[from] SchemeError),
}

impl SchemeRegistry<dyn ClientScheme> {
    /// Answers a 402 offer: walks the `accepts` list in the server's
    /// preference order and signs the first offer a registered client
    /// scheme can pay.
    pub async fn pay(&self, required: &PaymentRequired) -> Result<SignedPayment, PayError> {
        for requirements in &required.accepts {
            let Some(client) = self.lookup(&requirements.scheme, &requirements.network) else {
                continue;
            };
            let payment = client.create_payment(requirements, &required.resource).await?;
            return Ok(payment);
        }
        Err(PayError::NoSupportedScheme)
    }
}

impl SchemeRegistry<dyn FacilitatorScheme> {
    /// Enumerates the supported kinds plus scheme metadata and signers for
    /// the discovery endpoint.
    pub fn supported(&self) -> SupportedResponse {
        let mut kinds = Vec::with_capacity(self.entries.len());
        let mut signers: HashMap<String, Vec<String>> = HashMap::new();
        for handler in &self.entries {
            let network = handler.network().to_string();
            kinds.push(SupportedPaymentKind {
                x402_version: X402Version2.into(),
                scheme: handler.scheme().to_string(),
                network: network.clone(),
                extra: handler.extra(),
            });
            let handler_signers = handler.signers();
            if !handler_signers.is_empty() {
                signers.entry(network).or_insert(handler_signers);
            }
        }
        SupportedResponse {
            kinds,
            extensions: Vec::new(),
            signers,
        }
    }
}
