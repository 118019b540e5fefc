//! Chain adaptor for the `odp-deferred` facilitator.
//!
//! The facilitator needs four things from the chain: debit-wallet balance
//! reads, the wallet's withdrawal delay, the `settleSession` call, and the
//! set of signer addresses it settles with. [`OdpChainOps`] captures exactly
//! that surface so verification logic can run against a mock;
//! [`Eip155OdpProvider`] is the alloy-backed production implementation.

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_provider::Provider;
use alloy_sol_types::sol;
use async_trait::async_trait;

use crate::types::SessionApproval;

sol!(
    #[sol(rpc)]
    contract IDebitWallet {
        function balanceOf(address owner, address asset) external view returns (uint256);
        function withdrawDelaySeconds() external view returns (uint256);
    }
);

sol!(
    #[sol(rpc)]
    contract ISessionSettlement {
        struct Approval {
            address payer;
            address payee;
            address asset;
            uint256 maxSpend;
            uint256 expiry;
            bytes32 sessionId;
            uint256 startNonce;
            bytes32 authorizedProcessorsHash;
        }

        function settleSession(
            Approval approval,
            bytes sessionSignature,
            uint256 startNonce,
            uint256 endNonce,
            uint256 totalAmount
        ) external;
    }
);

/// Error from the chain adaptor.
#[derive(Debug, thiserror::Error)]
pub enum OdpChainError {
    /// RPC transport or contract call failure.
    #[error("chain call failed: {0}")]
    Rpc(String),
    /// The settlement transaction was mined with a non-success status.
    #[error("settlement transaction reverted: {0}")]
    Reverted(B256),
}

/// The chain surface the ODP facilitator depends on.
#[async_trait]
pub trait OdpChainOps: Send + Sync {
    /// Reads the payer's locked balance for `asset` from the debit wallet.
    async fn balance_of(&self, payer: Address, asset: Address) -> Result<U256, OdpChainError>;

    /// Reads the debit wallet's mandatory withdrawal delay.
    async fn withdraw_delay_seconds(&self) -> Result<U256, OdpChainError>;

    /// Submits a settlement batch and waits for its receipt.
    ///
    /// Returns the transaction hash of the mined, successful transaction.
    async fn settle_session(
        &self,
        approval: &SessionApproval,
        session_signature: &Bytes,
        start_nonce: U256,
        end_nonce: U256,
        total_amount: U256,
    ) -> Result<B256, OdpChainError>;

    /// The numeric chain id, used in the EIP-712 domain.
    fn chain_id(&self) -> u64;

    /// Processor addresses this facilitator settles with.
    fn signer_addresses(&self) -> Vec<Address>;
}

/// Alloy-backed chain adaptor for an EVM network.
///
/// The provider is expected to carry a wallet filler; settlement
/// transactions are signed and sent through it.
#[derive(Debug, Clone)]
pub struct Eip155OdpProvider<P> {
    provider: P,
    chain_id: u64,
    debit_wallet: Address,
    settlement_contract: Address,
    signer_addresses: Vec<Address>,
}

impl<P> Eip155OdpProvider<P> {
    pub fn new(
        provider: P,
        chain_id: u64,
        debit_wallet: Address,
        settlement_contract: Address,
        signer_addresses: Vec<Address>,
    ) -> Self {
        Self {
            provider,
            chain_id,
            debit_wallet,
            settlement_contract,
            signer_addresses,
        }
    }
}

#[async_trait]
impl<P> OdpChainOps for Eip155OdpProvider<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn balance_of(&self, payer: Address, asset: Address) -> Result<U256, OdpChainError> {
        let wallet = IDebitWallet::new(self.debit_wallet, self.provider.clone());
        wallet
            .balanceOf(payer, asset)
            .call()
            .await
            .map_err(|e| OdpChainError::Rpc(e.to_string()))
    }

    async fn withdraw_delay_seconds(&self) -> Result<U256, OdpChainError> {
        let wallet = IDebitWallet::new(self.debit_wallet, self.provider.clone());
        wallet
            .withdrawDelaySeconds()
            .call()
            .await
            .map_err(|e| OdpChainError::Rpc(e.to_string()))
    }

    async fn settle_session(
        &self,
        approval: &SessionApproval,
        session_signature: &Bytes,
        start_nonce: U256,
        end_nonce: U256,
        total_amount: U256,
    ) -> Result<B256, OdpChainError> {
        let contract = ISessionSettlement::new(self.settlement_contract, self.provider.clone());
        let approval = ISessionSettlement::Approval {
            payer: approval.payer,
            payee: approval.payee,
            asset: approval.asset,
            maxSpend: approval.maxSpend,
            expiry: approval.expiry,
            sessionId: approval.sessionId,
            startNonce: approval.startNonce,
            authorizedProcessorsHash: approval.authorizedProcessorsHash,
        };
        let pending = contract
            .settleSession(
                approval,
                session_signature.clone(),
                start_nonce,
                end_nonce,
                total_amount,
            )
            .send()
            .await
            .map_err(|e| OdpChainError::Rpc(e.to_string()))?;
        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| OdpChainError::Rpc(e.to_string()))?;
        if !receipt.status() {
            return Err(OdpChainError::Reverted(receipt.transaction_hash));
        }
        Ok(receipt.transaction_hash)
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn signer_addresses(&self) -> Vec<Address> {
        self.signer_addresses.clone()
    }
}
