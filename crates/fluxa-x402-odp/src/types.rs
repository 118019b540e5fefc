//! Wire types and EIP-712 material for the `odp-deferred` scheme.

use alloy_primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_sol_types::{Eip712Domain, SolStruct, eip712_domain, sol};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use fluxa_x402_types::address::ChecksummedAddress;
use fluxa_x402_types::amount::Amount;
use fluxa_x402_types::lit_str;
use fluxa_x402_types::timestamp::UnixTimestamp;

lit_str!(OdpScheme, "odp-deferred");

/// EIP-712 domain name shared by approvals and receipts.
pub const EIP712_DOMAIN_NAME: &str = "x402-odp-deferred";
/// EIP-712 domain version.
pub const EIP712_DOMAIN_VERSION: &str = "1";

sol!(
    /// EIP-712 typed-data shape of a session approval.
    ///
    /// Field order is part of the signature; it must match the settlement
    /// contract's definition exactly.
    #[derive(Serialize, Deserialize)]
    struct SessionApproval {
        address payer;
        address payee;
        address asset;
        uint256 maxSpend;
        uint256 expiry;
        bytes32 sessionId;
        uint256 startNonce;
        bytes32 authorizedProcessorsHash;
    }

    /// EIP-712 typed-data shape of a per-request receipt.
    #[derive(Serialize, Deserialize)]
    struct Receipt {
        bytes32 sessionId;
        uint256 nonce;
        uint256 amount;
        uint256 deadline;
        bytes32 requestHash;
    }
);

/// Builds the EIP-712 domain for a given chain and settlement contract.
pub fn signing_domain(chain_id: u64, settlement_contract: Address) -> Eip712Domain {
    eip712_domain! {
        name: EIP712_DOMAIN_NAME,
        version: EIP712_DOMAIN_VERSION,
        chain_id: chain_id,
        verifying_contract: settlement_contract,
    }
}

/// The payer's session-level authorization, wire form.
///
/// Every receipt under this approval carries its `session_id`, a nonce at
/// or above `start_nonce`, and total spend capped by `max_spend`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OdpSessionApproval {
    /// The paying wallet.
    pub payer: ChecksummedAddress,
    /// The payee the session pays.
    pub payee: ChecksummedAddress,
    /// The asset receipts are denominated in.
    pub asset: ChecksummedAddress,
    /// Cap on the sum of receipt amounts.
    pub max_spend: Amount,
    /// Session expiry, Unix seconds.
    pub expiry: UnixTimestamp,
    /// Server-chosen session identifier.
    pub session_id: B256,
    /// First valid receipt nonce.
    pub start_nonce: Amount,
    /// `keccak256(abi.encodePacked(sortedLowercaseAddresses))`; zero when
    /// unrestricted.
    pub authorized_processors_hash: B256,
}

impl OdpSessionApproval {
    /// The EIP-712 struct this approval hashes to.
    pub fn as_typed_data(&self) -> SessionApproval {
        SessionApproval {
            payer: self.payer.into(),
            payee: self.payee.into(),
            asset: self.asset.into(),
            maxSpend: self.max_spend.as_u256(),
            expiry: U256::from(self.expiry.as_secs()),
            sessionId: self.session_id,
            startNonce: self.start_nonce.as_u256(),
            authorizedProcessorsHash: self.authorized_processors_hash,
        }
    }

    /// The hash the payer signs for this approval.
    pub fn signing_hash(&self, chain_id: u64, settlement_contract: Address) -> B256 {
        self.as_typed_data()
            .eip712_signing_hash(&signing_domain(chain_id, settlement_contract))
    }
}

/// One request's micropayment under a session, wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OdpReceipt {
    /// The session this receipt belongs to.
    pub session_id: B256,
    /// Monotonic receipt nonce.
    pub nonce: Amount,
    /// Receipt amount; must equal the offer amount.
    pub amount: Amount,
    /// Latest acceptance time, Unix seconds.
    pub deadline: UnixTimestamp,
    /// Binding to a specific request, zero when unused.
    pub request_hash: B256,
}

impl OdpReceipt {
    /// The EIP-712 struct this receipt hashes to.
    pub fn as_typed_data(&self) -> Receipt {
        Receipt {
            sessionId: self.session_id,
            nonce: self.nonce.as_u256(),
            amount: self.amount.as_u256(),
            deadline: U256::from(self.deadline.as_secs()),
            requestHash: self.request_hash,
        }
    }

    /// The hash the payer signs for this receipt.
    pub fn signing_hash(&self, chain_id: u64, settlement_contract: Address) -> B256 {
        self.as_typed_data()
            .eip712_signing_hash(&signing_domain(chain_id, settlement_contract))
    }
}

/// Scheme-specific `payload.payload` for `odp-deferred`.
///
/// The approval travels with the first payment of a session only; every
/// field is optional at the parse layer so the facilitator can report
/// precise structural errors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OdpPayload {
    /// Session-level authorization, first payment only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_approval: Option<OdpSessionApproval>,
    /// EIP-712 signature over the approval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_signature: Option<Bytes>,
    /// The per-request receipt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<OdpReceipt>,
    /// EIP-712 signature over the receipt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_signature: Option<Bytes>,
}

/// `requirements.extra` for the `odp-deferred` scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OdpExtras {
    /// Server-chosen session identifier.
    pub session_id: B256,
    /// First valid receipt nonce.
    pub start_nonce: Amount,
    /// Session spend cap.
    pub max_spend: Amount,
    /// Session expiry, Unix seconds.
    pub expiry: UnixTimestamp,
    /// The settlement contract receipts settle through.
    pub settlement_contract: ChecksummedAddress,
    /// The debit wallet holding the payer's locked funds.
    pub debit_wallet: ChecksummedAddress,
    /// The debit wallet's mandatory withdrawal delay, seconds.
    pub withdraw_delay_seconds: Amount,
    /// Processors allowed to settle this session; empty means any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized_processors: Option<Vec<ChecksummedAddress>>,
    /// Request binding hash; zero/absent when unused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_hash: Option<B256>,
}

impl OdpExtras {
    /// The request hash receipts must carry: the configured one, or zero.
    pub fn expected_request_hash(&self) -> B256 {
        self.request_hash.unwrap_or(B256::ZERO)
    }

    /// The approval the payer is expected to have signed for these extras.
    pub fn expected_approval(
        &self,
        payer: ChecksummedAddress,
        payee: ChecksummedAddress,
        asset: ChecksummedAddress,
    ) -> OdpSessionApproval {
        OdpSessionApproval {
            payer,
            payee,
            asset,
            max_spend: self.max_spend,
            expiry: self.expiry,
            session_id: self.session_id,
            start_nonce: self.start_nonce,
            authorized_processors_hash: authorized_processors_hash(
                self.authorized_processors.as_deref().unwrap_or_default(),
            ),
        }
    }
}

/// `keccak256(abi.encodePacked(sortedLowercaseAddresses))`.
///
/// Sorting lowercase hex strings is byte-order sorting of the addresses, so
/// the addresses are sorted numerically and their 20-byte forms
/// concatenated. Returns the zero hash for an empty list.
pub fn authorized_processors_hash(processors: &[ChecksummedAddress]) -> B256 {
    if processors.is_empty() {
        return B256::ZERO;
    }
    let mut addresses: Vec<Address> = processors.iter().map(|p| p.inner()).collect();
    addresses.sort();
    let mut packed = Vec::with_capacity(addresses.len() * 20);
    for address in addresses {
        packed.extend_from_slice(address.as_slice());
    }
    keccak256(&packed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn address(byte: u8) -> ChecksummedAddress {
        ChecksummedAddress(Address::repeat_byte(byte))
    }

    #[test]
    fn test_scheme_literal() {
        assert_eq!(OdpScheme::VALUE, "odp-deferred");
    }

    #[test]
    fn test_processors_hash_zero_when_empty() {
        assert_eq!(authorized_processors_hash(&[]), B256::ZERO);
    }

    #[test]
    fn test_processors_hash_order_independent() {
        let a = address(0x11);
        let b = address(0x22);
        assert_eq!(
            authorized_processors_hash(&[a, b]),
            authorized_processors_hash(&[b, a])
        );
        assert_eq!(
            authorized_processors_hash(&[a, b]),
            keccak256(
                [Address::repeat_byte(0x11).as_slice(), Address::repeat_byte(0x22).as_slice()]
                    .concat()
            )
        );
    }

    #[test]
    fn test_approval_wire_form() {
        let approval = OdpSessionApproval {
            payer: address(0x01),
            payee: address(0x02),
            asset: address(0x03),
            max_spend: "1000000".parse().unwrap(),
            expiry: UnixTimestamp::from_secs(1740673000),
            session_id: B256::repeat_byte(0x4b),
            start_nonce: "0".parse().unwrap(),
            authorized_processors_hash: B256::ZERO,
        };
        let json = serde_json::to_value(&approval).unwrap();
        assert_eq!(json["maxSpend"], "1000000");
        assert_eq!(json["expiry"], "1740673000");
        assert_eq!(json["startNonce"], "0");
        let back: OdpSessionApproval = serde_json::from_value(json).unwrap();
        assert_eq!(back, approval);
    }

    #[test]
    fn test_signing_hash_changes_with_domain() {
        let receipt = OdpReceipt {
            session_id: B256::repeat_byte(0x4b),
            nonce: "0".parse().unwrap(),
            amount: "15000".parse().unwrap(),
            deadline: UnixTimestamp::from_secs(1740672160),
            request_hash: B256::ZERO,
        };
        let contract =
            Address::from_str("0xB1F3000000000000000000000000000000000000").unwrap();
        let on_base_sepolia = receipt.signing_hash(84532, contract);
        let on_mainnet = receipt.signing_hash(1, contract);
        assert_ne!(on_base_sepolia, on_mainnet);
        assert_ne!(on_base_sepolia, B256::ZERO);
    }

    #[test]
    fn test_extras_parse_from_requirements_extra() {
        let extras: OdpExtras = serde_json::from_value(serde_json::json!({
            "sessionId": "0x4b4b4b4b4b4b4b4b4b4b4b4b4b4b4b4b4b4b4b4b4b4b4b4b4b4b4b4b4b4b06c7",
            "startNonce": "0",
            "maxSpend": "1000000",
            "expiry": "1740673000",
            "settlementContract": "0xB1F3000000000000000000000000000000000000",
            "debitWallet": "0x4a52000000000000000000000000000000000000",
            "withdrawDelaySeconds": "86400"
        }))
        .unwrap();
        assert_eq!(extras.start_nonce.to_string(), "0");
        assert_eq!(extras.withdraw_delay_seconds.to_string(), "86400");
        assert_eq!(extras.expected_request_hash(), B256::ZERO);
        assert!(extras.authorized_processors.is_none());
    }

    #[test]
    fn test_extras_reject_bad_hex_length() {
        let result = serde_json::from_value::<OdpExtras>(serde_json::json!({
            "sessionId": "0x4b2f",
            "startNonce": "0",
            "maxSpend": "1000000",
            "expiry": "1740673000",
            "settlementContract": "0xB1F3000000000000000000000000000000000000",
            "debitWallet": "0x4a52000000000000000000000000000000000000",
            "withdrawDelaySeconds": "86400"
        }));
        assert!(result.is_err());
    }
}
