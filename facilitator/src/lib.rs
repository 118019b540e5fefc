//! fluxa-x402 facilitator server library.
//!
//! Wires the scheme implementations from `fluxa-x402-credit` and
//! `fluxa-x402-odp` into one HTTP facilitator:
//!
//! 1. **Config** ([`config`]): JSON file + environment fallbacks
//! 2. **Dispatch** ([`dispatch`]): routes payments to scheme handlers
//! 3. **HTTP surface** ([`handlers`]): `/verify`, `/settle`, `/supported`,
//!    `/benchmark/metrics`
//! 4. **Lifecycle** ([`run`], [`sig_down`]): startup, scheduler, graceful
//!    shutdown

pub mod config;
pub mod dispatch;
pub mod handlers;
pub mod metrics;
pub mod run;
pub mod sig_down;

pub use run::run;
