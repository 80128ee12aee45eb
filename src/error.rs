// src/error.rs
//! Error taxonomy for the authentication provider.
//!
//! Token authenticity failures are fatal for the token they describe.
//! Constraint violations found while verifying a token are collected into a
//! single [`VerificationError`] so callers see every problem in one pass.

use crate::models::token::DecodedToken;
use thiserror::Error;

/// A signed token could not be trusted at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("unable to resolve signing key for issuer {issuer}: {reason}")]
    UnresolvableIssuer { issuer: String, reason: String },

    #[error("invalid signature for issuer {0}")]
    InvalidSignature(String),

    #[error("token expired at {exp} (now {now})")]
    Expired { exp: i64, now: i64 },

    #[error("token not valid before {nbf} (now {now})")]
    NotYetValid { nbf: i64, now: i64 },
}

/// Aggregate of every constraint violation found while verifying one token.
///
/// `decoded` holds whatever could be decoded, including successfully decoded
/// embedded credentials in their original order.
#[derive(Debug, Clone, Error)]
#[error("{}", .messages.join("\n"))]
pub struct VerificationError {
    pub messages: Vec<String>,
    pub decoded: Box<DecodedToken>,
}

/// Failure of `CredentialVerifier::decode_and_verify`.
#[derive(Debug, Clone, Error)]
pub enum VerifyError {
    /// Structurally invalid or forged token; never aggregated.
    #[error(transparent)]
    MalformedToken(#[from] TokenError),

    #[error(transparent)]
    Verification(#[from] VerificationError),
}

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("payload encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    #[error("unsupported DID method in {0}")]
    UnsupportedMethod(String),

    #[error("invalid DID {did}: {reason}")]
    InvalidDid { did: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("ledger rejected transaction: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalValidationError {
    #[error("trusted certificate is not usable: {0}")]
    Certificate(String),

    #[error("attestation token rejected: {0}")]
    Rejected(String),
}

/// Fatal failure of an authentication flow. No credentials are returned.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed attestation token: {0}")]
    MalformedAttestation(String),

    #[error("external validation failed: {0}")]
    ExternalValidationFailed(#[from] ExternalValidationError),

    #[error("invalid binding signature: {0}")]
    InvalidSignature(String),

    #[error("ledger record failed: {0}")]
    LedgerRecordFailed(#[from] LedgerError),

    #[error("presentation rejected: {0}")]
    PresentationRejected(#[from] VerifyError),

    #[error("no credential in presentation carries a bankIdToken")]
    MissingAttestation,

    #[error("credential subject does not identify an Ethereum account: {0}")]
    UnboundSubject(String),

    #[error("credential issuance failed: {0}")]
    Issuance(#[from] SignerError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration value {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Failure to assemble the service at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("service signer: {0}")]
    Signer(#[from] SignerError),

    #[error("attestation validator: {0}")]
    Attestation(#[from] ExternalValidationError),

    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
}
