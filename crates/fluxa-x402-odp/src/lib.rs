//! Session-based deferred EVM scheme (`odp-deferred`) for fluxa-x402.
//!
//! A payer opens a session with an EIP-712 signed approval capping total
//! spend, then streams per-request receipts. Receipts are verified inline
//! and the resource is served immediately; settlement happens later, in
//! contiguous nonce batches against a locked debit wallet, either
//! synthetically or through a settlement contract on-chain.
//!
//! # Modules
//!
//! - [`types`] - Approvals, receipts, requirement extras, EIP-712 material
//! - [`store`] - Session records, the session store interface, per-session
//!   locks
//! - [`chain`] - The debit-wallet/settlement chain adaptor
//! - [`facilitator`] - Verify and settle state machine
//! - [`scheduler`] - Background batch-settlement loop
//! - [`client`] - Session approval and receipt signer

pub mod chain;
pub mod client;
pub mod facilitator;
pub mod scheduler;
pub mod server;
pub mod store;
#[cfg(test)]
pub(crate) mod test_support;
pub mod types;

pub use chain::OdpChainOps;
pub use client::OdpClient;
pub use facilitator::{OdpConfig, OdpDeferredFacilitator, SettlementMode};
pub use scheduler::SettlementScheduler;
pub use server::OdpServer;
pub use store::{InMemorySessionStore, OdpSessionRecord, SessionStore};
