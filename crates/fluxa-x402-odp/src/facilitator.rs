//! Facilitator-side verify/settle state machine for `odp-deferred`.
//!
//! Per session, all verify and settle operations are serialized by a
//! per-session mutex held across chain reads: balance checks and nonce
//! advancement must observe a consistent record. The `settling` flag on the
//! record additionally guarantees at most one settlement in flight even when
//! an external trigger and the background loop race.

use alloy_primitives::{B256, U256, keccak256};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, Ordering};

use fluxa_x402_types::address::ChecksummedAddress;
use fluxa_x402_types::amount::Amount;
use fluxa_x402_types::chain::{ChainId, ChainIdPattern};
use fluxa_x402_types::proto::{
    ErrorReason, PaymentPayload, PaymentRequirements, SettleResponse, VerifyResponse,
};
use fluxa_x402_types::scheme::{FacilitatorScheme, SchemeError, X402SchemeId};
use fluxa_x402_types::timestamp::UnixTimestamp;

use crate::chain::OdpChainOps;
use crate::store::{OdpSessionRecord, SessionLocks, SessionStore, StoreError};
use crate::types::{OdpExtras, OdpPayload, OdpScheme};

/// How settlement batches are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementMode {
    /// No chain I/O; the transaction hash is derived from the batch.
    Synthetic,
    /// Real `settleSession` call through the chain adaptor.
    Onchain,
}

/// Static configuration of an ODP facilitator.
#[derive(Debug, Clone)]
pub struct OdpConfig {
    /// The settlement contract sessions must be bound to.
    pub settlement_contract: ChecksummedAddress,
    /// The debit wallet holding payer funds.
    pub debit_wallet: ChecksummedAddress,
    /// The withdrawal delay the debit wallet must report.
    pub withdraw_delay_seconds: u64,
    /// Synthetic or on-chain settlement.
    pub settlement_mode: SettlementMode,
    /// Processors this facilitator advertises; informational.
    pub authorized_processors: Vec<ChecksummedAddress>,
    /// Cap on receipts per settlement batch.
    pub max_receipts_per_settlement: Option<usize>,
    /// Cap on a single receipt amount.
    pub max_amount_per_receipt: Option<Amount>,
}

/// Counters surfaced on the benchmark metrics endpoint.
#[derive(Debug, Default)]
pub struct OdpMetrics {
    /// Receipts that passed verification.
    pub receipts_verified: AtomicU64,
    /// Receipts covered by successful settlement batches.
    pub receipts_settled: AtomicU64,
    /// Settlement transactions executed.
    pub settlement_transactions: AtomicU64,
}

/// Facilitator for the `odp-deferred` scheme, registered under `eip155:*`.
pub struct OdpDeferredFacilitator<C> {
    config: OdpConfig,
    chain: Arc<C>,
    store: Arc<dyn SessionStore>,
    locks: SessionLocks,
    /// Sessions with outstanding receipts, in insertion order.
    pending: StdMutex<Vec<B256>>,
    metrics: OdpMetrics,
}

fn store_error(e: StoreError) -> SchemeError {
    SchemeError::Internal(e.to_string())
}

impl<C: OdpChainOps> OdpDeferredFacilitator<C> {
    pub fn new(config: OdpConfig, chain: Arc<C>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            config,
            chain,
            store,
            locks: SessionLocks::new(),
            pending: StdMutex::new(Vec::new()),
            metrics: OdpMetrics::default(),
        }
    }

    /// The CAIP-2 identifier of the chain this facilitator settles on.
    pub fn network_id(&self) -> ChainId {
        ChainId::new("eip155", self.chain.chain_id().to_string())
    }

    /// Counters for the metrics endpoint.
    pub fn metrics(&self) -> &OdpMetrics {
        &self.metrics
    }

    /// Number of sessions with outstanding receipts.
    pub fn pending_sessions(&self) -> usize {
        self.pending.lock().expect("pending lock poisoned").len()
    }

    fn mark_pending(&self, session_id: B256) {
        let mut pending = self.pending.lock().expect("pending lock poisoned");
        if !pending.contains(&session_id) {
            pending.push(session_id);
        }
    }

    fn unmark_pending(&self, session_id: &B256) {
        let mut pending = self.pending.lock().expect("pending lock poisoned");
        pending.retain(|id| id != session_id);
    }

    pub(crate) fn pending_snapshot(&self) -> Vec<B256> {
        self.pending.lock().expect("pending lock poisoned").clone()
    }

    fn verify_signature(
        &self,
        signature: &alloy_primitives::Bytes,
        hash: B256,
        expected: ChecksummedAddress,
    ) -> bool {
        let Ok(signature) = alloy_primitives::Signature::try_from(signature.as_ref()) else {
            return false;
        };
        signature
            .recover_address_from_prehash(&hash)
            .is_ok_and(|recovered| recovered == expected.inner())
    }

    /// Resolves the session record for this payment: validates a supplied
    /// approval, reconciles against stored state, or rejects.
    ///
    /// Caller holds the session lock.
    async fn resolve_session(
        &self,
        odp: &OdpPayload,
        extras: &OdpExtras,
        payee: ChecksummedAddress,
        asset: ChecksummedAddress,
    ) -> Result<Result<OdpSessionRecord, ErrorReason>, SchemeError> {
        let stored = self
            .store
            .get(&extras.session_id)
            .await
            .map_err(store_error)?;

        let record = match (&odp.session_approval, stored) {
            (Some(approval), stored) => {
                let Some(session_signature) = odp.session_signature.clone() else {
                    return Ok(Err(ErrorReason::MissingSessionSignature));
                };
                let hash = approval.signing_hash(
                    self.chain.chain_id(),
                    self.config.settlement_contract.inner(),
                );
                if !self.verify_signature(&session_signature, hash, approval.payer) {
                    return Ok(Err(ErrorReason::InvalidSessionSignature));
                }
                let expected = extras.expected_approval(approval.payer, payee, asset);
                if approval.authorized_processors_hash != expected.authorized_processors_hash {
                    return Ok(Err(ErrorReason::AuthorizedProcessorsHashMismatch));
                }
                if *approval != expected {
                    return Ok(Err(ErrorReason::SessionApprovalMismatch));
                }
                match stored {
                    Some(existing) => {
                        // Reconcile: every field of the supplied approval
                        // must match the stored one.
                        if existing.approval != *approval
                            || existing.session_signature != session_signature
                        {
                            return Ok(Err(ErrorReason::SessionApprovalMismatch));
                        }
                        existing
                    }
                    None => OdpSessionRecord::open(
                        approval.clone(),
                        session_signature,
                        self.config.settlement_contract,
                    ),
                }
            }
            (None, Some(existing)) => {
                // No approval resent: the requirements must still describe
                // the stored session exactly.
                let expected = extras.expected_approval(existing.approval.payer, payee, asset);
                if existing.approval != expected {
                    return Ok(Err(ErrorReason::RequirementsSessionMismatch));
                }
                existing
            }
            (None, None) => return Ok(Err(ErrorReason::MissingSessionApproval)),
        };
        Ok(Ok(record))
    }

    async fn verify_at(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
        now: UnixTimestamp,
    ) -> Result<VerifyResponse, SchemeError> {
        let invalid = |reason| Ok(VerifyResponse::invalid(reason));

        // Checks run in a fixed order; the first failure wins.
        if payload.accepted.scheme != OdpScheme::VALUE || requirements.scheme != OdpScheme::VALUE {
            return invalid(ErrorReason::UnsupportedScheme);
        }
        if payload.accepted.network != requirements.network {
            return invalid(ErrorReason::NetworkMismatch);
        }
        let extras = requirements
            .extra
            .as_ref()
            .and_then(|extra| serde_json::from_value::<OdpExtras>(extra.clone()).ok());
        let Some(extras) = extras else {
            return invalid(ErrorReason::InvalidRequirementsExtra);
        };
        let Ok(payee) = requirements.pay_to.parse::<ChecksummedAddress>() else {
            return invalid(ErrorReason::InvalidRequirementsExtra);
        };
        let Ok(asset) = requirements.asset.parse::<ChecksummedAddress>() else {
            return invalid(ErrorReason::InvalidRequirementsExtra);
        };
        let Ok(odp) = serde_json::from_value::<OdpPayload>(payload.payload.clone()) else {
            return invalid(ErrorReason::InvalidOdpPayloadMissingReceipt);
        };
        let Some(receipt) = odp.receipt.clone() else {
            return invalid(ErrorReason::InvalidOdpPayloadMissingReceipt);
        };
        let Some(receipt_signature) = odp.receipt_signature.clone() else {
            return invalid(ErrorReason::MissingReceiptSignature);
        };
        if receipt.session_id != extras.session_id {
            return invalid(ErrorReason::SessionIdMismatch);
        }
        if extras.settlement_contract != self.config.settlement_contract {
            return invalid(ErrorReason::SettlementContractMismatch);
        }
        if extras.debit_wallet != self.config.debit_wallet {
            return invalid(ErrorReason::DebitWalletMismatch);
        }
        if extras.withdraw_delay_seconds.as_u256() != U256::from(self.config.withdraw_delay_seconds)
        {
            return invalid(ErrorReason::WithdrawDelayMismatch);
        }

        // Everything from session resolution to the nonce advance happens
        // under the session lock, chain reads included.
        let lock = self.locks.lock_for(&extras.session_id);
        let _guard = lock.lock().await;

        let mut record = match self.resolve_session(&odp, &extras, payee, asset).await? {
            Ok(record) => record,
            Err(reason) => return invalid(reason),
        };
        let payer = record.approval.payer;
        let invalid_for = |reason| {
            Ok(VerifyResponse::invalid_with_payer(reason, payer.to_string()))
        };

        if let Some(processors) = &extras.authorized_processors
            && !processors.is_empty()
        {
            let signers = self.chain.signer_addresses();
            let authorized = processors.iter().any(|p| signers.contains(&p.inner()));
            if !authorized {
                return invalid_for(ErrorReason::UnauthorizedProcessor);
            }
        }

        let balance = self
            .chain
            .balance_of(payer.inner(), record.approval.asset.inner())
            .await;
        let delay = self.chain.withdraw_delay_seconds().await;
        let (balance, delay) = match (balance, delay) {
            (Ok(balance), Ok(delay)) => (balance, delay),
            (Err(e), _) | (_, Err(e)) => {
                // A chain read that cannot complete is never silent success.
                tracing::warn!(session = %extras.session_id, error = %e, "debit wallet read failed");
                return invalid_for(ErrorReason::DebitWalletWithdrawDelayMismatch);
            }
        };
        if delay != extras.withdraw_delay_seconds.as_u256() {
            return invalid_for(ErrorReason::DebitWalletWithdrawDelayMismatch);
        }

        let receipt_hash = receipt.signing_hash(
            self.chain.chain_id(),
            self.config.settlement_contract.inner(),
        );
        if !self.verify_signature(&receipt_signature, receipt_hash, payer) {
            return invalid_for(ErrorReason::InvalidReceiptSignature);
        }
        if receipt.nonce != record.next_nonce {
            return invalid_for(ErrorReason::ReceiptNonceMismatch);
        }
        if receipt.amount != requirements.amount {
            return invalid_for(ErrorReason::ReceiptAmountMismatch);
        }
        if let Some(max) = self.config.max_amount_per_receipt
            && receipt.amount > max
        {
            return invalid_for(ErrorReason::ReceiptAmountExceedsMax);
        }

        if record.approval.expiry < now {
            return invalid_for(ErrorReason::SessionExpired);
        }
        let ceiling = std::cmp::min(
            now + requirements.max_timeout_seconds,
            record.approval.expiry,
        );
        if receipt.deadline < now || receipt.deadline > ceiling {
            return invalid_for(ErrorReason::ReceiptDeadlineInvalid);
        }
        if receipt.request_hash != extras.expected_request_hash() {
            return invalid_for(ErrorReason::RequestHashMismatch);
        }

        let Some(new_spent) = record.spent.checked_add(receipt.amount) else {
            return invalid_for(ErrorReason::SessionMaxSpendExceeded);
        };
        if new_spent > record.approval.max_spend {
            return invalid_for(ErrorReason::SessionMaxSpendExceeded);
        }
        if new_spent.as_u256() > balance {
            return invalid_for(ErrorReason::InsufficientDebitWalletBalance);
        }

        let Some(next_nonce) = record.next_nonce.checked_add(Amount::from(1u64)) else {
            return invalid_for(ErrorReason::ReceiptNonceMismatch);
        };
        record.receipts.push(receipt);
        record.spent = new_spent;
        record.next_nonce = next_nonce;
        self.store
            .put(extras.session_id, record)
            .await
            .map_err(store_error)?;
        self.mark_pending(extras.session_id);
        self.metrics.receipts_verified.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            session = %extras.session_id,
            payer = %payer,
            spent = %new_spent,
            "receipt accepted"
        );
        Ok(VerifyResponse::valid(payer.to_string()))
    }

    /// Settles the next contiguous batch of a session.
    ///
    /// Shared by the external `/settle` trigger and the background loop.
    pub async fn settle_session_by_id(
        &self,
        session_id: &B256,
        network: ChainId,
    ) -> Result<SettleResponse, SchemeError> {
        let error = |reason| SettleResponse::Error {
            reason,
            network: network.clone(),
        };

        let lock = self.locks.lock_for(session_id);
        let _guard = lock.lock().await;

        let Some(mut record) = self.store.get(session_id).await.map_err(store_error)? else {
            return Ok(error(ErrorReason::SessionNotFound));
        };
        if record.settling {
            return Ok(error(ErrorReason::SettlementInProgress));
        }
        record.settling = true;
        self.store
            .put(*session_id, record.clone())
            .await
            .map_err(store_error)?;

        let outcome = self.settle_batch(session_id, &mut record, &network).await;

        // Clear the flag on every exit path, then persist whatever
        // settle_batch left in the record.
        record.settling = false;
        self.store
            .put(*session_id, record)
            .await
            .map_err(store_error)?;
        outcome
    }

    async fn settle_batch(
        &self,
        session_id: &B256,
        record: &mut OdpSessionRecord,
        network: &ChainId,
    ) -> Result<SettleResponse, SchemeError> {
        let error = |reason| {
            Ok(SettleResponse::Error {
                reason,
                network: network.clone(),
            })
        };

        let batch_len = self
            .config
            .max_receipts_per_settlement
            .unwrap_or(usize::MAX)
            .min(record.receipts.len());
        if batch_len == 0 {
            return error(ErrorReason::NoReceipts);
        }
        let batch = &record.receipts[..batch_len];

        let mut total = Amount::ZERO;
        for receipt in batch {
            total = total
                .checked_add(receipt.amount)
                .ok_or_else(|| SchemeError::Internal("batch total overflow".into()))?;
        }

        let balance = self
            .chain
            .balance_of(record.approval.payer.inner(), record.approval.asset.inner())
            .await
            .map_err(|e| SchemeError::Internal(e.to_string()))?;
        if balance < total.as_u256() {
            return error(ErrorReason::InsufficientDebitWalletBalance);
        }

        let start_nonce = batch[0].nonce.as_u256();
        for (i, receipt) in batch.iter().enumerate() {
            if receipt.nonce.as_u256() != start_nonce + U256::from(i) {
                return error(ErrorReason::ReceiptNonceGap);
            }
        }
        let end_nonce = batch[batch_len - 1].nonce.as_u256();

        let transaction = match self.config.settlement_mode {
            SettlementMode::Synthetic => {
                let packed = [
                    session_id.as_slice(),
                    &start_nonce.to_be_bytes::<32>(),
                    &end_nonce.to_be_bytes::<32>(),
                    &total.as_u256().to_be_bytes::<32>(),
                ]
                .concat();
                keccak256(&packed).to_string()
            }
            SettlementMode::Onchain => {
                let result = self
                    .chain
                    .settle_session(
                        &record.approval.as_typed_data(),
                        &record.session_signature,
                        start_nonce,
                        end_nonce,
                        total.as_u256(),
                    )
                    .await;
                match result {
                    Ok(tx_hash) => tx_hash.to_string(),
                    Err(e) => {
                        tracing::warn!(session = %session_id, error = %e, "settlement call failed");
                        return error(ErrorReason::SettlementTransactionFailed);
                    }
                }
            }
        };

        // Drop the batched nonce range. Gross spend is deliberately kept.
        record.receipts.drain(..batch_len);
        self.metrics
            .receipts_settled
            .fetch_add(batch_len as u64, Ordering::Relaxed);
        self.metrics
            .settlement_transactions
            .fetch_add(1, Ordering::Relaxed);
        if record.receipts.is_empty() {
            self.unmark_pending(session_id);
        }

        tracing::info!(
            session = %session_id,
            receipts = batch_len,
            total = %total,
            transaction = %transaction,
            "settlement batch complete"
        );
        Ok(SettleResponse::Success {
            transaction,
            network: network.clone(),
            payer: Some(record.approval.payer.to_string()),
        })
    }

    /// One sweep of the pending-session set, in insertion order.
    ///
    /// Called by the background scheduler. Sessions whose receipts drained
    /// leave the pending set; expired empty sessions close and are deleted.
    pub async fn settle_pending(&self) {
        let now = UnixTimestamp::now();
        for session_id in self.pending_snapshot() {
            let record = match self.store.get(&session_id).await {
                Ok(Some(record)) => record,
                Ok(None) => {
                    self.unmark_pending(&session_id);
                    self.locks.evict(&session_id);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(session = %session_id, error = %e, "pending sweep read failed");
                    continue;
                }
            };
            if record.settling {
                continue;
            }
            if record.receipts.is_empty() {
                self.unmark_pending(&session_id);
                if record.approval.expiry < now {
                    // CLOSED: drained and expired.
                    if let Err(e) = self.store.delete(&session_id).await {
                        tracing::warn!(session = %session_id, error = %e, "session eviction failed");
                    }
                    self.locks.evict(&session_id);
                }
                continue;
            }
            match self.settle_session_by_id(&session_id, self.network_id()).await {
                Ok(SettleResponse::Success { transaction, .. }) => {
                    tracing::debug!(session = %session_id, transaction = %transaction, "auto-settled");
                }
                Ok(SettleResponse::Error { reason, .. }) => {
                    tracing::warn!(session = %session_id, reason = ?reason, "auto-settle rejected");
                }
                Err(e) => {
                    tracing::warn!(session = %session_id, error = %e, "auto-settle failed");
                }
            }
        }
    }
}

impl<C: OdpChainOps> X402SchemeId for OdpDeferredFacilitator<C> {
    fn scheme(&self) -> &str {
        OdpScheme::VALUE
    }

    fn network(&self) -> ChainIdPattern {
        ChainIdPattern::wildcard("eip155")
    }
}

#[async_trait]
impl<C: OdpChainOps + 'static> FacilitatorScheme for OdpDeferredFacilitator<C> {
    async fn verify(
        &self,
        payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<VerifyResponse, SchemeError> {
        self.verify_at(payload, requirements, UnixTimestamp::now())
            .await
    }

    async fn settle(
        &self,
        _payload: &PaymentPayload,
        requirements: &PaymentRequirements,
    ) -> Result<SettleResponse, SchemeError> {
        let network = requirements.network.clone();
        let error = |reason| {
            Ok(SettleResponse::Error {
                reason,
                network: network.clone(),
            })
        };

        let extras = requirements
            .extra
            .as_ref()
            .and_then(|extra| serde_json::from_value::<OdpExtras>(extra.clone()).ok());
        let Some(extras) = extras else {
            return error(ErrorReason::InvalidRequirementsExtra);
        };
        if extras.settlement_contract != self.config.settlement_contract {
            return error(ErrorReason::SettlementContractMismatch);
        }
        if extras.debit_wallet != self.config.debit_wallet {
            return error(ErrorReason::DebitWalletMismatch);
        }
        if let Some(processors) = &extras.authorized_processors
            && !processors.is_empty()
        {
            let signers = self.chain.signer_addresses();
            if !processors.iter().any(|p| signers.contains(&p.inner())) {
                return error(ErrorReason::UnauthorizedProcessor);
            }
        }
        match self.chain.withdraw_delay_seconds().await {
            Ok(delay) if delay == extras.withdraw_delay_seconds.as_u256() => {}
            Ok(_) | Err(_) => {
                return error(ErrorReason::DebitWalletWithdrawDelayMismatch);
            }
        }

        self.settle_session_by_id(&extras.session_id, network).await
    }

    fn extra(&self) -> Option<serde_json::Value> {
        Some(json!({
            "settlementContract": self.config.settlement_contract,
            "debitWallet": self.config.debit_wallet,
            "withdrawDelaySeconds": self.config.withdraw_delay_seconds.to_string(),
        }))
    }

    fn signers(&self) -> Vec<String> {
        self.chain
            .signer_addresses()
            .into_iter()
            .map(|a| a.to_checksum(None))
            .collect()
    }
}
