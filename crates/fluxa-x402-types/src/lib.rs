//! Core types for the fluxa-x402 payment protocol.
//!
//! This crate provides the foundational types used by every fluxa-x402 role
//! (resource server, client, facilitator). It is scheme-agnostic: the two
//! payment schemes (`fluxacredit` and `odp-deferred`) live in sibling crates
//! and plug into the registries defined here.
//!
//! # Overview
//!
//! The x402 protocol enables micropayments over HTTP by leveraging the
//! 402 Payment Required status code. When a client requests a paid resource,
//! the server responds with payment requirements. The client produces a
//! signed payment payload, which a facilitator verifies (and, depending on
//! the scheme, settles inline or in deferred batches).
//!
//! # Modules
//!
//! - [`chain`] - CAIP-2 network identifiers and wildcard family patterns
//! - [`codec`] - base64url header codecs and canonical JSON comparison
//! - [`proto`] - Wire format types for protocol messages
//! - [`scheme`] - Scheme traits and the `(scheme, network)` registries
//! - [`facilitator`] - Core trait for payment verification and settlement
//! - [`timestamp`] - Unix timestamp utilities for authorization windows
//! - [`amount`] - Strict decimal-string monetary amounts (256-bit)
//! - [`address`] - EIP-55 checksummed address wrapper

pub mod address;
pub mod amount;
pub mod chain;
pub mod codec;
pub mod facilitator;
pub mod proto;
pub mod scheme;
pub mod timestamp;
pub mod util;
