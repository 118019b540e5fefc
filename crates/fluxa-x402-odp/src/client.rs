//! Client-side session approval and receipt signing.
//!
//! The client opens a session by signing the approval described in the
//! server's requirement extras, then issues one receipt per request at its
//! session-local nonce. The approval travels with the first payment only;
//! the facilitator stores it and later payments carry just a receipt.

use alloy_primitives::{Address, B256, Bytes, Signature};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use fluxa_x402_types::address::ChecksummedAddress;
use fluxa_x402_types::amount::Amount;
use fluxa_x402_types::chain::ChainIdPattern;
use fluxa_x402_types::codec::encode_header;
use fluxa_x402_types::proto::{PaymentPayload, PaymentRequirements, ResourceInfo, X402Version2};
use fluxa_x402_types::scheme::{ClientScheme, SchemeError, SignedPayment, X402SchemeId};
use fluxa_x402_types::timestamp::UnixTimestamp;

use crate::types::{OdpExtras, OdpPayload, OdpReceipt, OdpScheme, OdpSessionApproval};

/// Abstracts hash signing so both owned signers and `Arc`-shared signers
/// can drive the client.
#[async_trait]
pub trait SignerLike {
    /// The signing address.
    fn address(&self) -> Address;

    /// Signs the given 32-byte hash.
    async fn sign_hash(&self, hash: &B256) -> Result<Signature, alloy_signer::Error>;
}

#[async_trait]
impl SignerLike for PrivateKeySigner {
    fn address(&self) -> Address {
        PrivateKeySigner::address(self)
    }

    async fn sign_hash(&self, hash: &B256) -> Result<Signature, alloy_signer::Error> {
        alloy_signer::Signer::sign_hash(self, hash).await
    }
}

#[async_trait]
impl<T: SignerLike + Send + Sync> SignerLike for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn sign_hash(&self, hash: &B256) -> Result<Signature, alloy_signer::Error> {
        (**self).sign_hash(hash).await
    }
}

/// Client-local state of one open session.
struct ClientSession {
    approval: OdpSessionApproval,
    signature: Bytes,
    next_nonce: Amount,
    approval_sent: bool,
}

/// Client for the `odp-deferred` scheme.
pub struct OdpClient<S> {
    signer: S,
    chain_id: u64,
    sessions: Mutex<HashMap<B256, ClientSession>>,
}

impl<S: SignerLike + Sync> OdpClient<S> {
    pub fn new(signer: S, chain_id: u64) -> Self {
        Self {
            signer,
            chain_id,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The paying address.
    pub fn payer(&self) -> ChecksummedAddress {
        ChecksummedAddress(self.signer.address())
    }

    /// Signs a session approval against its settlement contract.
    pub async fn sign_approval(
        &self,
        approval: &OdpSessionApproval,
        settlement_contract: Address,
    ) -> Result<Bytes, SchemeError> {
        let hash = approval.signing_hash(self.chain_id, settlement_contract);
        let signature = self
            .signer
            .sign_hash(&hash)
            .await
            .map_err(|e| SchemeError::Internal(e.to_string()))?;
        Ok(signature.as_bytes().into())
    }

    /// Signs a receipt against the session's settlement contract.
    pub async fn sign_receipt(
        &self,
        receipt: &OdpReceipt,
        settlement_contract: Address,
    ) -> Result<Bytes, SchemeError> {
        let hash = receipt.signing_hash(self.chain_id, settlement_contract);
        let signature = self
            .signer
            .sign_hash(&hash)
            .await
            .map_err(|e| SchemeError::Internal(e.to_string()))?;
        Ok(signature.as_bytes().into())
    }

    /// Builds the payment payload for the next request under the offer.
    ///
    /// Opens the session on first use: the approval derived from the
    /// requirement extras is signed and attached; later payments carry only
    /// the receipt. The session-local nonce advances on every call.
    pub async fn build_payment(
        &self,
        requirements: &PaymentRequirements,
        resource: Option<ResourceInfo>,
    ) -> Result<PaymentPayload, SchemeError> {
        let extras: OdpExtras = serde_json::from_value(
            requirements
                .extra
                .clone()
                .ok_or_else(|| SchemeError::Internal("offer lacks odp extras".into()))?,
        )?;
        let payee: ChecksummedAddress = requirements
            .pay_to
            .parse()
            .map_err(|_| SchemeError::Internal("offer payTo is not an address".into()))?;
        let asset: ChecksummedAddress = requirements
            .asset
            .parse()
            .map_err(|_| SchemeError::Internal("offer asset is not an address".into()))?;

        let mut sessions = self.sessions.lock().await;
        if !sessions.contains_key(&extras.session_id) {
            let approval = extras.expected_approval(self.payer(), payee, asset);
            let hash = approval.signing_hash(self.chain_id, extras.settlement_contract.inner());
            let signature = self
                .signer
                .sign_hash(&hash)
                .await
                .map_err(|e| SchemeError::Internal(e.to_string()))?;
            sessions.insert(
                extras.session_id,
                ClientSession {
                    next_nonce: approval.start_nonce,
                    approval,
                    signature: signature.as_bytes().into(),
                    approval_sent: false,
                },
            );
        }
        let session = sessions
            .get_mut(&extras.session_id)
            .expect("session was just inserted");

        let now = UnixTimestamp::now();
        let deadline = std::cmp::min(
            now + requirements.max_timeout_seconds,
            session.approval.expiry,
        );
        let receipt = OdpReceipt {
            session_id: extras.session_id,
            nonce: session.next_nonce,
            amount: requirements.amount,
            deadline,
            request_hash: extras.expected_request_hash(),
        };
        let receipt_signature = {
            let hash = receipt.signing_hash(self.chain_id, extras.settlement_contract.inner());
            let signature = self
                .signer
                .sign_hash(&hash)
                .await
                .map_err(|e| SchemeError::Internal(e.to_string()))?;
            Bytes::from(signature.as_bytes())
        };

        let odp_payload = OdpPayload {
            session_approval: (!session.approval_sent).then(|| session.approval.clone()),
            session_signature: (!session.approval_sent).then(|| session.signature.clone()),
            receipt: Some(receipt),
            receipt_signature: Some(receipt_signature),
        };
        session.approval_sent = true;
        session.next_nonce = session
            .next_nonce
            .checked_add(Amount::from(1u64))
            .ok_or_else(|| SchemeError::Internal("receipt nonce overflow".into()))?;

        Ok(PaymentPayload {
            x402_version: X402Version2,
            resource,
            accepted: requirements.clone(),
            payload: serde_json::to_value(odp_payload)?,
            extensions: None,
        })
    }
}

impl<S> X402SchemeId for OdpClient<S> {
    fn scheme(&self) -> &str {
        OdpScheme::VALUE
    }

    fn network(&self) -> ChainIdPattern {
        ChainIdPattern::wildcard("eip155")
    }
}

#[async_trait]
impl<S: SignerLike + Send + Sync> ClientScheme for OdpClient<S> {
    async fn create_payment(
        &self,
        requirements: &PaymentRequirements,
        resource: &ResourceInfo,
    ) -> Result<SignedPayment, SchemeError> {
        let payload = self
            .build_payment(requirements, Some(resource.clone()))
            .await?;
        let payment_header =
            encode_header(&payload).map_err(|e| SchemeError::Internal(e.to_string()))?;
        Ok(SignedPayment {
            payment_header,
            auxiliary_headers: Vec::new(),
        })
    }
}
