//! Exact-price credit scheme (`fluxacredit`) for the fluxa-x402 protocol.
//!
//! A single non-negotiable credit charge per request, authenticated by an
//! HTTP Message Signature (Ed25519, RFC 9421 style) bound to the payment
//! payload. The signer is identified through a discoverable JWK directory
//! (Web Bot Auth profile) and addressed by RFC 7638 thumbprint.
//!
//! # Modules
//!
//! - [`types`] - Scheme identifiers, extras, and the web-bot-auth envelope
//! - [`http_signature`] - Signature parsing, base reconstruction, key lookup,
//!   and Ed25519 verification
//! - [`facilitator`] - Facilitator-side verify/settle with an idempotent
//!   credit ledger
//! - [`server`] - Resource-server-side price parsing and requirement
//!   enhancement
//! - [`client`] - Client-side header signing

pub mod client;
pub mod facilitator;
pub mod http_signature;
pub mod server;
pub mod types;

pub use client::CreditClient;
pub use facilitator::CreditFacilitator;
pub use server::FluxaCreditServer;
pub use types::{FluxaCreditScheme, WebBotAuthEnvelope};
