//! Shared fixtures for the in-crate test suites.

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use fluxa_x402_types::address::ChecksummedAddress;
use fluxa_x402_types::amount::Amount;
use fluxa_x402_types::chain::ChainId;
use fluxa_x402_types::proto::PaymentRequirements;
use fluxa_x402_types::timestamp::UnixTimestamp;

use crate::chain::{OdpChainError, OdpChainOps};
use crate::client::OdpClient;
use crate::facilitator::{OdpConfig, OdpDeferredFacilitator, SettlementMode};
use crate::store::InMemorySessionStore;
use crate::types::{OdpExtras, SessionApproval};

pub const CHAIN_ID: u64 = 84532;

pub fn settlement_contract() -> ChecksummedAddress {
    ChecksummedAddress(Address::repeat_byte(0xb1))
}

pub fn debit_wallet() -> ChecksummedAddress {
    ChecksummedAddress(Address::repeat_byte(0x4a))
}

pub fn payee() -> ChecksummedAddress {
    ChecksummedAddress(Address::repeat_byte(0x02))
}

pub fn asset() -> ChecksummedAddress {
    ChecksummedAddress(Address::repeat_byte(0x05))
}

pub fn session_id() -> B256 {
    B256::repeat_byte(0x4b)
}

/// Chain adaptor double: balances and delay in memory, settlement counted.
pub struct MockChain {
    pub balances: DashMap<(Address, Address), U256>,
    pub withdraw_delay: U256,
    pub signers: Vec<Address>,
    pub settle_calls: AtomicUsize,
    pub fail_settle: AtomicBool,
    pub settle_latency: Duration,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            balances: DashMap::new(),
            withdraw_delay: U256::from(86400u64),
            signers: vec![Address::repeat_byte(0xfa)],
            settle_calls: AtomicUsize::new(0),
            fail_settle: AtomicBool::new(false),
            settle_latency: Duration::ZERO,
        }
    }

    pub fn set_balance(&self, payer: Address, asset: Address, balance: u64) {
        self.balances.insert((payer, asset), U256::from(balance));
    }
}

#[async_trait]
impl OdpChainOps for MockChain {
    async fn balance_of(&self, payer: Address, asset: Address) -> Result<U256, OdpChainError> {
        Ok(self
            .balances
            .get(&(payer, asset))
            .map(|b| *b.value())
            .unwrap_or(U256::ZERO))
    }

    async fn withdraw_delay_seconds(&self) -> Result<U256, OdpChainError> {
        Ok(self.withdraw_delay)
    }

    async fn settle_session(
        &self,
        approval: &SessionApproval,
        _session_signature: &Bytes,
        start_nonce: U256,
        end_nonce: U256,
        total_amount: U256,
    ) -> Result<B256, OdpChainError> {
        if !self.settle_latency.is_zero() {
            tokio::time::sleep(self.settle_latency).await;
        }
        self.settle_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_settle.load(Ordering::SeqCst) {
            return Err(OdpChainError::Reverted(B256::ZERO));
        }
        let packed = [
            approval.sessionId.as_slice(),
            &start_nonce.to_be_bytes::<32>(),
            &end_nonce.to_be_bytes::<32>(),
            &total_amount.to_be_bytes::<32>(),
        ]
        .concat();
        Ok(keccak256(&packed))
    }

    fn chain_id(&self) -> u64 {
        CHAIN_ID
    }

    fn signer_addresses(&self) -> Vec<Address> {
        self.signers.clone()
    }
}

pub struct FixtureOptions {
    pub max_spend: &'static str,
    pub balance: u64,
    pub mode: SettlementMode,
    pub max_receipts_per_settlement: Option<usize>,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            max_spend: "1000000",
            balance: 1_000_000,
            mode: SettlementMode::Synthetic,
            max_receipts_per_settlement: None,
        }
    }
}

pub struct OdpFixture {
    pub chain: Arc<MockChain>,
    pub store: Arc<InMemorySessionStore>,
    pub facilitator: Arc<OdpDeferredFacilitator<MockChain>>,
    pub client: OdpClient<PrivateKeySigner>,
    pub requirements: PaymentRequirements,
}

impl OdpFixture {
    pub fn new(options: FixtureOptions) -> Self {
        let signer = PrivateKeySigner::random();
        let payer = signer.address();
        let chain = Arc::new(MockChain::new());
        chain.set_balance(payer, asset().inner(), options.balance);
        let store = Arc::new(InMemorySessionStore::new());

        let config = OdpConfig {
            settlement_contract: settlement_contract(),
            debit_wallet: debit_wallet(),
            withdraw_delay_seconds: 86400,
            settlement_mode: options.mode,
            authorized_processors: Vec::new(),
            max_receipts_per_settlement: options.max_receipts_per_settlement,
            max_amount_per_receipt: None,
        };
        let facilitator = Arc::new(OdpDeferredFacilitator::new(
            config,
            Arc::clone(&chain),
            store.clone() as Arc<dyn crate::store::SessionStore>,
        ));
        let client = OdpClient::new(signer, CHAIN_ID);

        let extras = OdpExtras {
            session_id: session_id(),
            start_nonce: "0".parse().unwrap(),
            max_spend: options.max_spend.parse().unwrap(),
            expiry: UnixTimestamp::now() + 3600,
            settlement_contract: settlement_contract(),
            debit_wallet: debit_wallet(),
            withdraw_delay_seconds: "86400".parse().unwrap(),
            authorized_processors: None,
            request_hash: None,
        };
        let requirements = PaymentRequirements {
            scheme: "odp-deferred".into(),
            network: ChainId::new("eip155", CHAIN_ID.to_string()),
            amount: "15000".parse().unwrap(),
            asset: asset().to_string(),
            pay_to: payee().to_string(),
            max_timeout_seconds: 600,
            extra: Some(serde_json::to_value(&extras).unwrap()),
        };

        Self {
            chain,
            store,
            facilitator,
            client,
            requirements,
        }
    }

    pub fn default() -> Self {
        Self::new(FixtureOptions::default())
    }

    pub fn extras(&self) -> OdpExtras {
        serde_json::from_value(self.requirements.extra.clone().unwrap()).unwrap()
    }

    pub async fn record(&self) -> crate::store::OdpSessionRecord {
        use crate::store::SessionStore;
        self.store
            .get(&session_id())
            .await
            .unwrap()
            .expect("session record exists")
    }

    pub fn expected_spent(&self, receipts: u64) -> Amount {
        Amount::from(15000u64 * receipts)
    }
}
