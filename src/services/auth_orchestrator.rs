// src/services/auth_orchestrator.rs
//! Authentication and credential issuance flow.
//!
//! A user proves their identity with a BankID attestation issued by an
//! external broker and proves control of an Ethereum account by signing the
//! hash of that attestation. The orchestrator checks both, records the
//! authentication on the ledger, tops up the account if it is low on funds
//! and issues two person credentials to `did:ethr:<account>`.
//!
//! ```text
//! Start -> ExternalCheck -> SignatureRecovery -> (LedgerRecord | SkipLedger)
//!       -> (Fund | SkipFund) -> DateNormalize -> Issue -> Done
//! ```
//!
//! Only the external check and the ledger record can abort the flow.
//! Funding and date parsing failures are logged and absorbed.

use crate::blockchain::ledger::LedgerGateway;
use crate::error::{AuthError, ExternalValidationError, LedgerError};
use crate::models::attestation::{BankIdClaims, DATE_OF_BIRTH_FORMAT};
use crate::models::credential::{ClaimSet, PERSON_CREDENTIAL};
use crate::models::token::DecodedToken;
use crate::services::credential_issuer::CredentialIssuer;
use crate::services::external_validator::{decode_unverified, ExternalTokenValidator};
use crate::services::verifier::{CredentialVerifier, VerifyOptions};
use crate::utils::crypto::recover_binding_address;
use crate::wallet::resolver::{did_ethr, ethr_address};
use chrono::NaiveDate;
use ethers::types::{Address, H256, U256};
use ethers::utils::to_checksum;
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Credential subject member that carries the raw attestation token in the
/// presentation flow.
pub const BANKID_TOKEN_CLAIM: &str = "bankIdToken";

/// Steps the caller asks to skip. Honoured only outside production.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthFlags {
    pub skip_external_check: bool,
    pub skip_ledger_record: bool,
}

/// When and how much to fund an authenticated account, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingPolicy {
    /// Accounts with a balance below this are funded
    pub threshold: U256,
    /// Amount transferred to an account below the threshold
    pub amount: U256,
}

impl Default for FundingPolicy {
    /// 0.1 ether threshold, 0.11 ether top-up.
    fn default() -> Self {
        FundingPolicy {
            threshold: U256::exp10(17),
            amount: U256::exp10(16) * U256::from(11u64),
        }
    }
}

/// Skip decisions for one flow, fixed before any step runs.
#[derive(Debug, Clone, Copy)]
struct SkipDecision {
    external_check: bool,
    ledger_record: bool,
}

/// Runs the authentication flows against shared, long-lived collaborators.
#[derive(Clone)]
pub struct AuthOrchestrator {
    production: bool,
    validator: Arc<dyn ExternalTokenValidator>,
    ledger: Arc<dyn LedgerGateway>,
    verifier: CredentialVerifier,
    issuer: CredentialIssuer,
    funding: FundingPolicy,
    external_check_timeout: Duration,
    ledger_timeout: Duration,
}

impl AuthOrchestrator {
    /// Creates an orchestrator with the default funding policy and 30 second
    /// timeouts for the external check and the ledger.
    ///
    /// # Arguments
    /// * `production` - Whether skip flags must be ignored
    /// * `validator` - Checks attestations against the broker certificate
    /// * `ledger` - Records authentications and funds accounts
    /// * `verifier` - Verifies holder presentations
    /// * `issuer` - Issues the person credentials with the service key
    pub fn new(
        production: bool,
        validator: Arc<dyn ExternalTokenValidator>,
        ledger: Arc<dyn LedgerGateway>,
        verifier: CredentialVerifier,
        issuer: CredentialIssuer,
    ) -> Self {
        AuthOrchestrator {
            production,
            validator,
            ledger,
            verifier,
            issuer,
            funding: FundingPolicy::default(),
            external_check_timeout: Duration::from_secs(30),
            ledger_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_funding(mut self, funding: FundingPolicy) -> Self {
        self.funding = funding;
        self
    }

    pub fn with_timeouts(mut self, external_check: Duration, ledger: Duration) -> Self {
        self.external_check_timeout = external_check;
        self.ledger_timeout = ledger;
        self
    }

    pub fn is_production(&self) -> bool {
        self.production
    }

    pub fn issuer_id(&self) -> &str {
        self.issuer.issuer_id()
    }

    /// Authenticates a user from a BankID attestation and a signature over
    /// its hash, and issues their person credentials.
    ///
    /// # Arguments
    /// * `attestation_token` - Attestation token issued by the identity broker
    /// * `binding_signature` - Personal-sign signature over keccak256 of the
    ///   attestation token bytes, hex encoded
    /// * `flags` - Steps to skip, ignored in production
    ///
    /// # Returns
    /// The credential tokens `[personal data, national identifier and
    /// account]`, both addressed to `did:ethr:<recovered account>`. Nothing is
    /// returned if any fatal step fails.
    pub async fn authenticate(
        &self,
        attestation_token: &str,
        binding_signature: &str,
        flags: AuthFlags,
    ) -> Result<[String; 2], AuthError> {
        let skip = self.skip_decision(flags);

        let claims = decode_unverified(attestation_token).map_err(AuthError::MalformedAttestation)?;
        self.check_attestation(attestation_token, skip).await?;

        let address = recover_binding_address(attestation_token.as_bytes(), binding_signature)
            .map_err(|e| AuthError::InvalidSignature(e.to_string()))?;
        debug!("Attestation bound to account {}", to_checksum(&address, None));

        self.complete(&claims, address, &did_ethr(address), skip).await
    }

    /// Authenticates a holder from a presentation that embeds a credential
    /// carrying their BankID attestation in its `bankIdToken` claim.
    ///
    /// The presentation must be addressed to this service. The account is
    /// taken from the `did:ethr` subject of the attestation credential and
    /// the new credentials are issued to that subject.
    pub async fn authenticate_presentation(
        &self,
        presentation_token: &str,
        flags: AuthFlags,
    ) -> Result<[String; 2], AuthError> {
        let skip = self.skip_decision(flags);

        let options = VerifyOptions::default()
            .audience(self.issuer.issuer_id())
            .decode_credentials(true)
            .require_verifiable_presentation(true);
        let presentation = self.verifier.decode_and_verify(presentation_token, &options)?;

        let credential = presentation
            .decoded_credentials()
            .iter()
            .find(|credential| attestation_of(credential).is_some())
            .ok_or(AuthError::MissingAttestation)?;
        let attestation_token = attestation_of(credential)
            .and_then(Value::as_str)
            .ok_or_else(|| AuthError::MalformedAttestation(format!("{} is not a string", BANKID_TOKEN_CLAIM)))?;

        let claims = decode_unverified(attestation_token).map_err(AuthError::MalformedAttestation)?;
        self.check_attestation(attestation_token, skip).await?;

        let subject_did = credential
            .payload
            .sub
            .as_deref()
            .ok_or_else(|| AuthError::UnboundSubject("credential has no subject".into()))?;
        let address = ethr_address(subject_did).map_err(|e| AuthError::UnboundSubject(e.to_string()))?;
        let destination = credential
            .payload
            .credential_subject()
            .and_then(|subject| subject.get("id"))
            .and_then(Value::as_str)
            .unwrap_or(subject_did)
            .to_string();

        self.complete(&claims, address, &destination, skip).await
    }

    /// `allow_skip = requested && !production`, decided once per flow.
    fn skip_decision(&self, flags: AuthFlags) -> SkipDecision {
        SkipDecision {
            external_check: flags.skip_external_check && !self.production,
            ledger_record: flags.skip_ledger_record && !self.production,
        }
    }

    async fn check_attestation(&self, token: &str, skip: SkipDecision) -> Result<(), AuthError> {
        if skip.external_check {
            warn!("Skipping attestation verification because we are not in production");
            return Ok(());
        }

        match timeout(self.external_check_timeout, self.validator.verify(token)).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(ExternalValidationError::Rejected(format!(
                "no answer within {:?}",
                self.external_check_timeout
            ))
            .into()),
        }
    }

    /// Ledger record, funding and issuance, shared by both flows.
    async fn complete(
        &self,
        claims: &BankIdClaims,
        address: Address,
        subject_id: &str,
        skip: SkipDecision,
    ) -> Result<[String; 2], AuthError> {
        self.record_authentication(address, skip).await?;
        self.fund_if_needed(address).await;
        self.issue_person_credentials(claims, address, subject_id)
    }

    async fn record_authentication(&self, address: Address, skip: SkipDecision) -> Result<(), AuthError> {
        if skip.ledger_record {
            warn!("Skipping on-chain authentication record because we are not in production");
            return Ok(());
        }

        let receipt = timeout(self.ledger_timeout, self.ledger.record_authentication(address))
            .await
            .map_err(|_| LedgerError::Unavailable(format!("no receipt within {:?}", self.ledger_timeout)))??;
        info!(
            "Authentication of {:?} recorded in tx {:?} (block {:?})",
            address, receipt.tx_hash, receipt.block_number
        );
        Ok(())
    }

    async fn fund_if_needed(&self, address: Address) {
        match timeout(self.ledger_timeout, self.try_fund(address)).await {
            Ok(Ok(Some(tx_hash))) => info!("Funded {:?} with {} wei in tx {:?}", address, self.funding.amount, tx_hash),
            Ok(Ok(None)) => debug!("Account {:?} does not need funding", address),
            Ok(Err(e)) => warn!("Funding {:?} failed: {}", address, e),
            Err(_) => warn!("Funding {:?} timed out after {:?}", address, self.ledger_timeout),
        }
    }

    async fn try_fund(&self, address: Address) -> Result<Option<H256>, LedgerError> {
        let balance = self.ledger.balance_of(address).await?;
        if balance >= self.funding.threshold {
            return Ok(None);
        }
        debug!("Balance of {:?} is {} wei, below threshold", address, balance);
        self.ledger.fund(address, self.funding.amount).await.map(Some)
    }

    fn issue_person_credentials(
        &self,
        claims: &BankIdClaims,
        address: Address,
        subject_id: &str,
    ) -> Result<[String; 2], AuthError> {
        let mut personal = ClaimSet::new();
        personal.insert("name".into(), json!(claims.name));
        personal.insert("familyName".into(), json!(claims.family_name));
        personal.insert("givenName".into(), json!(claims.given_name));
        personal.insert("birthDate".into(), normalize_birth_date(claims.dateofbirth.as_deref()));

        let mut identity = ClaimSet::new();
        identity.insert("nationalIdentifier".into(), json!(claims.socialno));
        identity.insert("blockchainAccounts".into(), json!([to_checksum(&address, None)]));

        let personal = self.issuer.issue(personal, subject_id, &[PERSON_CREDENTIAL])?;
        let identity = self.issuer.issue(identity, subject_id, &[PERSON_CREDENTIAL])?;
        info!("Issued person credentials to {}", subject_id);
        Ok([personal.proof, identity.proof])
    }
}

fn attestation_of(credential: &DecodedToken) -> Option<&Value> {
    credential.payload.credential_subject()?.get(BANKID_TOKEN_CLAIM)
}

/// Converts a `yyyyMMdd` birth date to an ISO-8601 calendar date, or null if
/// it is missing or does not parse.
pub fn normalize_birth_date(raw: Option<&str>) -> Value {
    let Some(raw) = raw else {
        return Value::Null;
    };
    match NaiveDate::parse_from_str(raw, DATE_OF_BIRTH_FORMAT) {
        Ok(date) => Value::String(date.format("%Y-%m-%d").to_string()),
        Err(e) => {
            error!("Unparsable date of birth {:?}: {}", raw, e);
            Value::Null
        }
    }
}
