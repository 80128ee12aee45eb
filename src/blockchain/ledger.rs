// src/blockchain/ledger.rs
//! Interface to the ledger the authentication flow records to.

use crate::error::LedgerError;
use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use serde::Serialize;

/// Identifiers of a confirmed authentication record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthenticationReceipt {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
}

/// Network operations on the external ledger.
///
/// Implementations own their retry policy; callers never retry.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Submits an authentication record for `address` and waits for it to be
    /// mined.
    async fn record_authentication(&self, address: Address) -> Result<AuthenticationReceipt, LedgerError>;

    /// Native currency balance of `address`, in wei.
    async fn balance_of(&self, address: Address) -> Result<U256, LedgerError>;

    /// Transfers `amount` wei to `address` and returns the transaction hash
    /// without waiting for confirmation.
    async fn fund(&self, address: Address, amount: U256) -> Result<H256, LedgerError>;
}
