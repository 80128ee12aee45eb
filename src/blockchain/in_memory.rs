// src/blockchain/in_memory.rs
//! Process-local ledger.
//!
//! Keeps authentication records and balances in memory. Used outside
//! production when no RPC endpoint is configured, and as a test double with
//! injectable failures and latency.

use crate::blockchain::ledger::{AuthenticationReceipt, LedgerGateway};
use crate::error::LedgerError;
use crate::utils::crypto::hash_data;
use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct LedgerState {
    block_number: u64,
    authenticated: Vec<Address>,
    balances: HashMap<Address, U256>,
    fundings: Vec<(Address, U256)>,
}

#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<LedgerState>>,
    record_error: Option<LedgerError>,
    funding_error: Option<LedgerError>,
    latency: Option<Duration>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `record_authentication` call fail with `error`.
    pub fn failing_records(mut self, error: LedgerError) -> Self {
        self.record_error = Some(error);
        self
    }

    /// Makes balance reads and transfers fail with `error`.
    pub fn failing_funding(mut self, error: LedgerError) -> Self {
        self.funding_error = Some(error);
        self
    }

    /// Delays every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.lock().balances.insert(address, balance);
    }

    /// Addresses recorded so far, in submission order.
    pub fn authenticated(&self) -> Vec<Address> {
        self.lock().authenticated.clone()
    }

    /// Transfers made so far, in submission order.
    pub fn fundings(&self) -> Vec<(Address, U256)> {
        self.lock().fundings.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        // every update is a single push or insert, so a poisoned guard is still usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn transaction_hash(kind: &str, address: Address, nonce: u64) -> H256 {
    let mut preimage = kind.as_bytes().to_vec();
    preimage.extend_from_slice(address.as_bytes());
    preimage.extend_from_slice(&nonce.to_be_bytes());
    H256::from(hash_data(&preimage))
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn record_authentication(&self, address: Address) -> Result<AuthenticationReceipt, LedgerError> {
        self.simulate_latency().await;
        if let Some(error) = &self.record_error {
            return Err(error.clone());
        }

        let mut state = self.lock();
        state.block_number += 1;
        state.authenticated.push(address);
        Ok(AuthenticationReceipt {
            tx_hash: transaction_hash("authenticate", address, state.block_number),
            block_number: Some(state.block_number),
        })
    }

    async fn balance_of(&self, address: Address) -> Result<U256, LedgerError> {
        self.simulate_latency().await;
        if let Some(error) = &self.funding_error {
            return Err(error.clone());
        }
        Ok(self.lock().balances.get(&address).copied().unwrap_or_default())
    }

    async fn fund(&self, address: Address, amount: U256) -> Result<H256, LedgerError> {
        self.simulate_latency().await;
        if let Some(error) = &self.funding_error {
            return Err(error.clone());
        }

        let mut state = self.lock();
        let balance = state.balances.entry(address).or_default();
        *balance = balance.saturating_add(amount);
        state.fundings.push((address, amount));
        let nonce = state.fundings.len() as u64;
        Ok(transaction_hash("fund", address, nonce))
    }
}
