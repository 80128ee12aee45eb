// src/blockchain/ethereum_client.rs
//! Ethereum JSON-RPC client implementation.
//!
//! Provides the [`LedgerGateway`] used in production: authentication records
//! are written through the `AuthProvider` contract and accounts are funded
//! with plain value transfers from the service wallet.

use crate::blockchain::ledger::{AuthenticationReceipt, LedgerGateway};
use crate::error::LedgerError;
use async_trait::async_trait;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Authorization, Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{TransactionReceipt, TransactionRequest},
};
use ethers_contract::{BaseContract, Contract};
use ethers_core::{
    abi::{parse_abi, Abi, Tokenize},
    types::{Address, H256, U256},
};
use log::{debug, info};
use std::sync::Arc;

type WalletClient = SignerMiddleware<Arc<Provider<Http>>, LocalWallet>;

/// Human readable ABI of the `AuthProvider` contract methods used here.
const AUTH_PROVIDER_ABI: &[&str] = &["function authenticate(address user) external"];

/// Ethereum client for managing wallet and contract interactions.
///
/// This client provides:
/// - Transaction signing with the service wallet
/// - Contract calls that wait for their receipt
/// - Balance queries and value transfers
#[derive(Clone)]
pub struct EthereumClient {
    /// JSON-RPC provider
    provider: Arc<Provider<Http>>,
    /// Provider wrapped with the service wallet for signing
    client: Arc<WalletClient>,
    /// Address of the deployed AuthProvider contract
    auth_provider_address: Address,
    auth_provider_abi: Abi,
    /// Confirmations to wait for before a record counts as written
    confirmations: usize,
}

impl EthereumClient {
    /// Creates a new client instance.
    ///
    /// # Arguments
    /// * `rpc_url` - JSON-RPC endpoint URL
    /// * `basic_auth` - Optional user and password sent to the endpoint
    /// * `private_key` - Hex-encoded private key (with or without 0x prefix)
    /// * `auth_provider_address` - Address of the AuthProvider contract
    ///
    /// # Errors
    /// Returns error if:
    /// - The RPC URL is invalid or the chain ID cannot be retrieved
    /// - Private key or contract address are invalid
    pub async fn new(
        rpc_url: &str,
        basic_auth: Option<(&str, &str)>,
        private_key: &str,
        auth_provider_address: &str,
    ) -> Result<Self, LedgerError> {
        let provider = Arc::new(Provider::new(http_transport(rpc_url, basic_auth)?));
        let wallet: LocalWallet = private_key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| LedgerError::Rejected(format!("invalid wallet key: {}", e)))?;
        let auth_provider_address: Address = auth_provider_address
            .parse()
            .map_err(|e| LedgerError::Rejected(format!("invalid contract address: {}", e)))?;
        let auth_provider_abi =
            parse_abi(AUTH_PROVIDER_ABI).map_err(|e| LedgerError::Rejected(format!("invalid ABI: {}", e)))?;

        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?
            .as_u64();
        let client = Arc::new(SignerMiddleware::new(provider.clone(), wallet.with_chain_id(chain_id)));

        info!("Connected to chain {} at {}", chain_id, rpc_url);
        Ok(Self {
            provider,
            client,
            auth_provider_address,
            auth_provider_abi,
            confirmations: 1,
        })
    }

    /// Gets the service wallet address.
    pub fn get_address(&self) -> Address {
        self.client.address()
    }

    /// Sends a transaction to a smart contract and waits for its receipt.
    ///
    /// # Errors
    /// - [`LedgerError::Rejected`] if the call cannot be encoded, reverts, or
    ///   is mined with a failed status
    /// - [`LedgerError::Unavailable`] for transport failures or a dropped
    ///   transaction
    pub async fn send_transaction(
        &self,
        contract_address: Address,
        abi: &Abi,
        method: &str,
        params: impl Tokenize,
    ) -> Result<TransactionReceipt, LedgerError> {
        let abi = BaseContract::from(abi.clone());
        let contract = Contract::<WalletClient>::new(contract_address, abi, self.client.clone());
        let call = contract
            .method::<_, ()>(method, params)
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;

        let pending = call.send().await.map_err(|e| {
            if e.is_revert() {
                LedgerError::Rejected(e.to_string())
            } else {
                LedgerError::Unavailable(e.to_string())
            }
        })?;
        debug!("Submitted {} as {:?}", method, pending.tx_hash());

        let receipt = pending
            .confirmations(self.confirmations)
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?
            .ok_or_else(|| LedgerError::Unavailable(format!("{} transaction dropped from mempool", method)))?;

        if receipt.status == Some(0u64.into()) {
            return Err(LedgerError::Rejected(format!(
                "{} reverted in {:?}",
                method, receipt.transaction_hash
            )));
        }
        Ok(receipt)
    }
}

/// Builds the HTTP transport, attaching basic auth credentials when given.
fn http_transport(rpc_url: &str, basic_auth: Option<(&str, &str)>) -> Result<Http, LedgerError> {
    let url = url::Url::parse(rpc_url).map_err(|e| LedgerError::Unavailable(format!("invalid RPC URL: {}", e)))?;
    match basic_auth {
        Some((user, password)) => Http::new_with_auth(url, Authorization::basic(user, password))
            .map_err(|e| LedgerError::Unavailable(format!("invalid RPC credentials: {}", e))),
        None => Ok(Http::new(url)),
    }
}

#[async_trait]
impl LedgerGateway for EthereumClient {
    async fn record_authentication(&self, address: Address) -> Result<AuthenticationReceipt, LedgerError> {
        let receipt = self
            .send_transaction(self.auth_provider_address, &self.auth_provider_abi, "authenticate", address)
            .await?;
        Ok(AuthenticationReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
        })
    }

    async fn balance_of(&self, address: Address) -> Result<U256, LedgerError> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))
    }

    async fn fund(&self, address: Address, amount: U256) -> Result<H256, LedgerError> {
        let tx = TransactionRequest::pay(address, amount);
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| LedgerError::Unavailable(e.to_string()))?;
        Ok(pending.tx_hash())
    }
}
