// src/services/credential_issuer.rs
//! Credential Issuer Service
//!
//! Builds credential and presentation payloads and signs them into compact
//! tokens. The service signs credentials with its own long-lived key;
//! presentations are always signed by the holder that assembles them.

use crate::error::SignerError;
use crate::models::credential::{
    ClaimSet, Credential, CredentialEnvelope, Presentation, PresentationEnvelope, VERIFIABLE_CREDENTIAL,
    VERIFIABLE_PRESENTATION, W3C_CREDENTIALS_CONTEXT,
};
use crate::models::token::{Audience, JwtPayload};
use crate::services::jwt::create_jwt;
use crate::wallet::key_management::Signer;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Service for issuing signed credentials.
#[derive(Clone)]
pub struct CredentialIssuer {
    /// The service's own signing key, shared for the process lifetime
    signer: Arc<dyn Signer>,

    /// Lifetime of issued credentials; `None` issues non-expiring tokens
    validity: Option<Duration>,
}

impl CredentialIssuer {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer, validity: None }
    }

    /// Sets the lifetime of credentials issued from now on.
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity = Some(validity);
        self
    }

    /// Identifier every credential is issued under.
    pub fn issuer_id(&self) -> &str {
        self.signer.did()
    }

    /// Issues a credential about `subject_id` at the current time.
    ///
    /// # Arguments
    /// * `claims` - Attribute set describing the subject
    /// * `subject_id` - Identifier of the subject the claims are about
    /// * `types` - Type tags, appended after `VerifiableCredential`
    ///
    /// # Returns
    /// The credential with its signed `proof`, or an error if signing fails
    pub fn issue(&self, claims: ClaimSet, subject_id: &str, types: &[&str]) -> Result<Credential, SignerError> {
        self.issue_at(claims, subject_id, types, Utc::now())
    }

    /// Issues a credential with an explicit issuance time.
    ///
    /// Output is deterministic for identical inputs.
    pub fn issue_at(
        &self,
        claims: ClaimSet,
        subject_id: &str,
        types: &[&str],
        issued_at: DateTime<Utc>,
    ) -> Result<Credential, SignerError> {
        let types = credential_types(types);
        let issued = issued_at.timestamp();

        let payload = JwtPayload {
            iat: Some(issued),
            nbf: Some(issued),
            exp: self.validity.map(|validity| (issued_at + validity).timestamp()),
            iss: Some(self.issuer_id().to_string()),
            sub: Some(subject_id.to_string()),
            vc: Some(CredentialEnvelope {
                context: vec![W3C_CREDENTIALS_CONTEXT.to_string()],
                types: types.clone(),
                credential_subject: claims.clone(),
            }),
            ..Default::default()
        };
        let proof = create_jwt(self.signer.as_ref(), &payload)?;

        Ok(Credential {
            subject_claims: claims,
            subject_id: subject_id.to_string(),
            issuer_id: self.issuer_id().to_string(),
            types,
            proof,
        })
    }

    /// Bundles credentials into a presentation signed by `holder`.
    ///
    /// Credential tokens are embedded as-is, never re-parsed.
    pub fn present(
        holder: &dyn Signer,
        verifier_ids: &[String],
        credentials: &[Credential],
    ) -> Result<Presentation, SignerError> {
        Self::present_at(holder, verifier_ids, credentials, Utc::now())
    }

    pub fn present_at(
        holder: &dyn Signer,
        verifier_ids: &[String],
        credentials: &[Credential],
        issued_at: DateTime<Utc>,
    ) -> Result<Presentation, SignerError> {
        let issued = issued_at.timestamp();
        let payload = JwtPayload {
            iat: Some(issued),
            nbf: Some(issued),
            iss: Some(holder.did().to_string()),
            aud: Audience::from_list(verifier_ids.to_vec()),
            vp: Some(PresentationEnvelope {
                context: vec![W3C_CREDENTIALS_CONTEXT.to_string()],
                types: vec![VERIFIABLE_PRESENTATION.to_string()],
                verifiable_credential: credentials.iter().map(|c| c.proof.clone()).collect(),
                decoded_credentials: Vec::new(),
            }),
            ..Default::default()
        };
        let proof = create_jwt(holder, &payload)?;

        Ok(Presentation {
            holder_id: holder.did().to_string(),
            verifier_ids: verifier_ids.to_vec(),
            credentials: credentials.to_vec(),
            proof,
        })
    }
}

fn credential_types(requested: &[&str]) -> Vec<String> {
    let mut types = vec![VERIFIABLE_CREDENTIAL.to_string()];
    for t in requested {
        if !types.iter().any(|existing| existing == t) {
            types.push(t.to_string());
        }
    }
    types
}
