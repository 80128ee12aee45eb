// src/services/external_validator.rs
//! Validation of externally issued attestation tokens.
//!
//! The identity broker signs BankID attestations with a key published as a
//! certificate. This module checks tokens against that key; it does not parse
//! or chain certificates itself.

use crate::error::ExternalValidationError;
use crate::models::attestation::BankIdClaims;
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

/// Checks an attestation token against a trusted certificate.
#[async_trait]
pub trait ExternalTokenValidator: Send + Sync {
    /// Returns the decoded claims if the token is authentic and current.
    async fn verify(&self, token: &str) -> Result<BankIdClaims, ExternalValidationError>;
}

/// Decodes an attestation token without checking its signature or expiry.
///
/// Used to read the identity attributes before (or instead of, outside
/// production) the authenticity check.
pub fn decode_unverified(token: &str) -> Result<BankIdClaims, String> {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    decode::<BankIdClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| e.to_string())
}

/// Validator backed by the PEM encoded public key of the broker certificate.
pub struct CertificateTokenValidator {
    key: DecodingKey,
    algorithms: Vec<Algorithm>,
    audience: Option<String>,
    leeway: u64,
}

impl CertificateTokenValidator {
    pub fn new(key: DecodingKey, algorithms: Vec<Algorithm>) -> Self {
        Self {
            key,
            algorithms,
            audience: None,
            leeway: 60,
        }
    }

    /// Accepts an RSA or EC public key in PEM form.
    pub fn from_pem(pem: &str) -> Result<Self, ExternalValidationError> {
        if let Ok(key) = DecodingKey::from_rsa_pem(pem.as_bytes()) {
            return Ok(Self::new(key, vec![Algorithm::RS256, Algorithm::RS384, Algorithm::RS512]));
        }
        DecodingKey::from_ec_pem(pem.as_bytes())
            .map(|key| Self::new(key, vec![Algorithm::ES256, Algorithm::ES384]))
            .map_err(|e| ExternalValidationError::Certificate(e.to_string()))
    }

    /// Requires the attestation to be addressed to `audience`.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    fn validation(&self) -> Result<Validation, ExternalValidationError> {
        let algorithm = self
            .algorithms
            .first()
            .ok_or_else(|| ExternalValidationError::Certificate("no signature algorithms configured".into()))?;
        let mut validation = Validation::new(*algorithm);
        validation.algorithms = self.algorithms.clone();
        validation.leeway = self.leeway;
        if let Some(audience) = &self.audience {
            validation.set_audience(&[audience]);
        }
        Ok(validation)
    }
}

#[async_trait]
impl ExternalTokenValidator for CertificateTokenValidator {
    async fn verify(&self, token: &str) -> Result<BankIdClaims, ExternalValidationError> {
        decode::<BankIdClaims>(token, &self.key, &self.validation()?)
            .map(|data| data.claims)
            .map_err(|e| ExternalValidationError::Rejected(e.to_string()))
    }
}

/// Stand-in used outside production when no broker certificate is
/// configured. Every attestation is rejected, so flows only succeed when the
/// caller skips the external check.
pub struct UnconfiguredValidator;

#[async_trait]
impl ExternalTokenValidator for UnconfiguredValidator {
    async fn verify(&self, _token: &str) -> Result<BankIdClaims, ExternalValidationError> {
        Err(ExternalValidationError::Certificate("no trusted certificate configured".into()))
    }
}
