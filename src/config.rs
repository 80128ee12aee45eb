// src/config.rs
//! Service configuration.
//!
//! Values are layered from built-in defaults and `AUTH_`-prefixed environment
//! variables (a `.env` file is loaded first if present). Nested keys use a
//! double underscore:
//!
//! - `AUTH_PRODUCTION`: `true` disables every skip flag
//! - `AUTH_SERVER__BIND_ADDRESS`: listen address (default `127.0.0.1:3000`)
//! - `AUTH_SIGNER__METHOD`: `ethr` or `key`
//! - `AUTH_SIGNER__PRIVATE_KEY_HEX`: service signing key (required)
//! - `AUTH_ATTESTATION__CERTIFICATE_PEM` / `AUTH_ATTESTATION__CERTIFICATE_PATH`:
//!   public key of the identity broker (required in production)
//! - `AUTH_LEDGER__RPC_URL`, `AUTH_LEDGER__PRIVATE_KEY_HEX`,
//!   `AUTH_LEDGER__AUTH_PROVIDER_ADDRESS`: ledger access (required in production)
//! - `AUTH_LEDGER__RPC_USER` / `AUTH_LEDGER__RPC_PASSWORD`: basic auth for the
//!   RPC endpoint, set both or neither
//! - `AUTH_LEDGER__FUNDING_THRESHOLD_ETH` / `AUTH_LEDGER__FUNDING_AMOUNT_ETH`

use crate::error::ConfigError;
use crate::services::auth_orchestrator::FundingPolicy;
use crate::wallet::key_management::SignerMethod;
use config::{Config, Environment};
use ethers::utils::parse_ether;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub production: bool,
    pub server: ServerSettings,
    pub signer: SignerSettings,
    pub attestation: AttestationSettings,
    pub ledger: LedgerSettings,
    pub credential: CredentialSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub bind_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignerSettings {
    pub method: SignerMethod,
    pub private_key_hex: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttestationSettings {
    pub certificate_pem: Option<String>,
    pub certificate_path: Option<String>,
    /// Required `aud` of attestation tokens, if any
    pub audience: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSettings {
    pub rpc_url: Option<String>,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub private_key_hex: Option<String>,
    pub auth_provider_address: Option<String>,
    pub timeout_secs: u64,
    pub funding_threshold_eth: String,
    pub funding_amount_eth: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialSettings {
    /// Lifetime of issued credentials; unset issues non-expiring credentials
    pub validity_secs: Option<i64>,
    pub clock_skew_secs: i64,
}

/// Ledger connection parameters, all present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEndpoint<'a> {
    pub rpc_url: &'a str,
    /// User and password for the RPC endpoint
    pub basic_auth: Option<(&'a str, &'a str)>,
    pub private_key_hex: &'a str,
    pub auth_provider_address: &'a str,
}

impl Settings {
    /// Loads `.env` and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_environment(Environment::with_prefix("AUTH"))
    }

    /// Builds settings from an explicit variable map instead of the process
    /// environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_environment(Environment::with_prefix("AUTH").source(Some(vars)))
    }

    fn from_environment(environment: Environment) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .set_default("production", false)?
            .set_default("server.bind_address", "127.0.0.1:3000")?
            .set_default("signer.method", "ethr")?
            .set_default("attestation.timeout_secs", 30i64)?
            .set_default("ledger.timeout_secs", 60i64)?
            .set_default("ledger.funding_threshold_eth", "0.1")?
            .set_default("ledger.funding_amount_eth", "0.11")?
            .set_default("credential.clock_skew_secs", 300i64)?
            .add_source(environment.prefix_separator("_").separator("__"))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_address()?;
        self.funding_policy()?;
        if self.ledger.rpc_user.is_some() != self.ledger.rpc_password.is_some() {
            return Err(ConfigError::Invalid {
                key: "ledger.rpc_user",
                reason: "rpc_user and rpc_password must be set together".into(),
            });
        }
        if self.production {
            if self.attestation.certificate_pem.is_none() && self.attestation.certificate_path.is_none() {
                return Err(ConfigError::Invalid {
                    key: "attestation.certificate_pem",
                    reason: "a trusted certificate is required in production".into(),
                });
            }
            if self.ledger_endpoint().is_none() {
                return Err(ConfigError::Invalid {
                    key: "ledger.rpc_url",
                    reason: "rpc_url, private_key_hex and auth_provider_address are required in production".into(),
                });
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        self.server.bind_address.parse().map_err(|e| ConfigError::Invalid {
            key: "server.bind_address",
            reason: format!("{}", e),
        })
    }

    pub fn funding_policy(&self) -> Result<FundingPolicy, ConfigError> {
        let ether = |key: &'static str, value: &str| {
            parse_ether(value).map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            })
        };
        Ok(FundingPolicy {
            threshold: ether("ledger.funding_threshold_eth", &self.ledger.funding_threshold_eth)?,
            amount: ether("ledger.funding_amount_eth", &self.ledger.funding_amount_eth)?,
        })
    }

    /// Ledger connection, if fully configured.
    pub fn ledger_endpoint(&self) -> Option<LedgerEndpoint<'_>> {
        Some(LedgerEndpoint {
            rpc_url: self.ledger.rpc_url.as_deref()?,
            basic_auth: self.ledger.rpc_user.as_deref().zip(self.ledger.rpc_password.as_deref()),
            private_key_hex: self.ledger.private_key_hex.as_deref()?,
            auth_provider_address: self.ledger.auth_provider_address.as_deref()?,
        })
    }

    /// The broker certificate, read from `certificate_path` if no inline PEM
    /// is configured.
    pub fn certificate_pem(&self) -> Result<Option<String>, ConfigError> {
        if let Some(pem) = &self.attestation.certificate_pem {
            return Ok(Some(pem.clone()));
        }
        match &self.attestation.certificate_path {
            Some(path) => std::fs::read_to_string(path).map(Some).map_err(|e| ConfigError::Invalid {
                key: "attestation.certificate_path",
                reason: format!("{}: {}", path, e),
            }),
            None => Ok(None),
        }
    }

    pub fn attestation_timeout(&self) -> Duration {
        Duration::from_secs(self.attestation.timeout_secs)
    }

    pub fn ledger_timeout(&self) -> Duration {
        Duration::from_secs(self.ledger.timeout_secs)
    }

    pub fn credential_validity(&self) -> Option<chrono::Duration> {
        self.credential.validity_secs.map(chrono::Duration::seconds)
    }
}
