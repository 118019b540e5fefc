//! Facilitator-local session state.
//!
//! One [`OdpSessionRecord`] per session, exclusively owned by the
//! facilitator process. The store provides serializable updates per session:
//! `put` is the unit of atomicity, and callers read-modify-write under the
//! per-session lock from [`SessionLocks`]. No ordering is guaranteed across
//! sessions.

use alloy_primitives::{B256, Bytes};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

use fluxa_x402_types::address::ChecksummedAddress;
use fluxa_x402_types::amount::Amount;

use crate::types::{OdpReceipt, OdpSessionApproval};

/// Facilitator-local state of one session.
///
/// Invariants, maintained by the facilitator under the session lock:
///
/// 1. `receipts[i].nonce == approval.start_nonce + i`
/// 2. `next_nonce == approval.start_nonce + count of receipts ever accepted`
/// 3. `spent` equals the sum of all accepted receipt amounts (gross, not
///    reduced by settlement)
/// 4. `spent <= approval.max_spend`
/// 5. `settling` is raised only while a settlement call is in flight
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OdpSessionRecord {
    /// The payer-signed session approval; never mutated.
    pub approval: OdpSessionApproval,
    /// The payer's EIP-712 signature over the approval.
    pub session_signature: Bytes,
    /// The settlement contract the session is bound to.
    pub settlement_contract: ChecksummedAddress,
    /// The nonce the next receipt must carry.
    pub next_nonce: Amount,
    /// Gross session spend.
    pub spent: Amount,
    /// Accepted, not-yet-settled receipts, ordered by nonce.
    pub receipts: Vec<OdpReceipt>,
    /// At most one settlement in flight per session.
    pub settling: bool,
}

impl OdpSessionRecord {
    /// A fresh record for a just-approved session.
    pub fn open(
        approval: OdpSessionApproval,
        session_signature: Bytes,
        settlement_contract: ChecksummedAddress,
    ) -> Self {
        let next_nonce = approval.start_nonce;
        Self {
            approval,
            session_signature,
            settlement_contract,
            next_nonce,
            spent: Amount::ZERO,
            receipts: Vec::new(),
            settling: false,
        }
    }
}

/// Error from a session store backend.
#[derive(Debug, thiserror::Error)]
#[error("session store: {0}")]
pub struct StoreError(pub String);

/// Abstract session persistence.
///
/// Implementations may be in-memory (default), embedded KV, or external KV.
/// `put` replaces the whole record; the caller holds the session lock across
/// the read-modify-write.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads a session record.
    async fn get(&self, session_id: &B256) -> Result<Option<OdpSessionRecord>, StoreError>;
    /// Stores a session record, replacing any previous value.
    async fn put(&self, session_id: B256, record: OdpSessionRecord) -> Result<(), StoreError>;
    /// Removes a session record.
    async fn delete(&self, session_id: &B256) -> Result<(), StoreError>;
}

/// The default in-memory session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<B256, OdpSessionRecord>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &B256) -> Result<Option<OdpSessionRecord>, StoreError> {
        Ok(self.sessions.get(session_id).map(|r| r.value().clone()))
    }

    async fn put(&self, session_id: B256, record: OdpSessionRecord) -> Result<(), StoreError> {
        self.sessions.insert(session_id, record);
        Ok(())
    }

    async fn delete(&self, session_id: &B256) -> Result<(), StoreError> {
        self.sessions.remove(session_id);
        Ok(())
    }
}

/// Per-session mutexes.
///
/// The map is size-bound by eviction: locks are dropped when their session
/// closes. Holding the mutex across chain RPC calls is intentional; balance
/// checks and nonce advancement must stay consistent.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: DashMap<B256, Arc<Mutex<()>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for a session, creating it on first use.
    pub fn lock_for(&self, session_id: &B256) -> Arc<Mutex<()>> {
        self.locks
            .entry(*session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the lock of a closed session.
    ///
    /// Safe only once no task can still reach the session record.
    pub fn evict(&self, session_id: &B256) {
        self.locks
            .remove_if(session_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
