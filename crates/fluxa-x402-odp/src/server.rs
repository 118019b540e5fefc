//! Resource-server-side pieces of the deferred scheme.
//!
//! The server prices a resource in the session asset and, on issuance,
//! stamps the requirement extras with a fresh session: it picks the session
//! id, the spend cap, and the expiry the payer will sign over.

use alloy_primitives::B256;
use rand::Rng;
use serde_json::Value;

use fluxa_x402_types::address::ChecksummedAddress;
use fluxa_x402_types::amount::Amount;
use fluxa_x402_types::chain::{ChainId, ChainIdPattern};
use fluxa_x402_types::proto::PaymentRequirements;
use fluxa_x402_types::scheme::{ParsedPrice, PriceError, ServerScheme, X402SchemeId};
use fluxa_x402_types::timestamp::UnixTimestamp;

use crate::types::{OdpExtras, OdpScheme};

/// Server-side handler for the `odp-deferred` scheme, bound to one chain
/// and one asset.
#[derive(Debug, Clone)]
pub struct OdpServer {
    network: ChainId,
    asset: ChecksummedAddress,
    settlement_contract: ChecksummedAddress,
    debit_wallet: ChecksummedAddress,
    withdraw_delay_seconds: u64,
    /// Spend cap written into fresh sessions.
    max_spend: Amount,
    /// Lifetime of fresh sessions, seconds.
    session_duration_seconds: u64,
    authorized_processors: Option<Vec<ChecksummedAddress>>,
}

impl OdpServer {
    pub fn new(
        network: ChainId,
        asset: ChecksummedAddress,
        settlement_contract: ChecksummedAddress,
        debit_wallet: ChecksummedAddress,
        withdraw_delay_seconds: u64,
        max_spend: Amount,
        session_duration_seconds: u64,
    ) -> Self {
        Self {
            network,
            asset,
            settlement_contract,
            debit_wallet,
            withdraw_delay_seconds,
            max_spend,
            session_duration_seconds,
            authorized_processors: None,
        }
    }

    /// Restricts settlement to the given processors.
    pub fn with_authorized_processors(mut self, processors: Vec<ChecksummedAddress>) -> Self {
        self.authorized_processors = Some(processors);
        self
    }

    fn fresh_session_id(&self) -> B256 {
        let bytes: [u8; 32] = rand::rng().random();
        B256::from(bytes)
    }
}

impl X402SchemeId for OdpServer {
    fn scheme(&self) -> &str {
        OdpScheme::VALUE
    }

    fn network(&self) -> ChainIdPattern {
        self.network.clone().into()
    }
}

impl ServerScheme for OdpServer {
    /// Parses a price into the session asset's smallest unit.
    ///
    /// Accepts an object `{ "amount": "...", "asset": "0x..." }` whose asset
    /// must be this server's asset, or a bare integer amount (number or
    /// decimal string).
    fn parse_price(&self, price: &Value) -> Result<ParsedPrice, PriceError> {
        let amount_value = match price {
            Value::Object(map) => {
                let asset = map
                    .get("asset")
                    .and_then(Value::as_str)
                    .ok_or_else(|| PriceError::InvalidPrice("price object without asset".into()))?;
                let asset: ChecksummedAddress = asset
                    .parse()
                    .map_err(|_| PriceError::UnsupportedAsset(asset.to_string()))?;
                if asset != self.asset {
                    return Err(PriceError::UnsupportedAsset(asset.to_string()));
                }
                map.get("amount")
                    .ok_or_else(|| PriceError::InvalidPrice("price object without amount".into()))?
                    .clone()
            }
            other => other.clone(),
        };
        let amount: Amount = match &amount_value {
            Value::String(s) => s
                .parse()
                .map_err(|e| PriceError::InvalidPrice(format!("{s}: {e}")))?,
            Value::Number(n) => n
                .as_u64()
                .map(Amount::from)
                .ok_or_else(|| PriceError::InvalidPrice(n.to_string()))?,
            other => return Err(PriceError::InvalidPrice(other.to_string())),
        };
        Ok(ParsedPrice {
            amount,
            asset: self.asset.to_string(),
        })
    }

    /// Stamps fresh session extras onto just-issued requirements.
    ///
    /// Requirements that already carry a session id are left alone, so an
    /// offer can be re-served while its session stays open.
    fn enhance_payment_requirements(&self, requirements: &mut PaymentRequirements) {
        let has_session = requirements
            .extra
            .as_ref()
            .and_then(|extra| extra.get("sessionId"))
            .is_some();
        if has_session {
            return;
        }
        let extras = OdpExtras {
            session_id: self.fresh_session_id(),
            start_nonce: Amount::ZERO,
            max_spend: self.max_spend,
            expiry: UnixTimestamp::now() + self.session_duration_seconds,
            settlement_contract: self.settlement_contract,
            debit_wallet: self.debit_wallet,
            withdraw_delay_seconds: Amount::from(self.withdraw_delay_seconds),
            authorized_processors: self.authorized_processors.clone(),
            request_hash: None,
        };
        requirements.extra =
            Some(serde_json::to_value(extras).expect("extras serialization is infallible"));
    }
}
