// src/services/verifier.rs
//! Credential verification service.
//!
//! Decodes signed credential and presentation tokens and checks them against
//! caller supplied constraints. Authenticity failures of the outer token are
//! fatal; every other problem is collected so a single call reports all of
//! them, including failures of individual credentials embedded in a
//! presentation.

use crate::error::{TokenError, VerificationError, VerifyError};
use crate::models::token::{Audience, DecodedToken};
use crate::services::jwt::{verify_jwt, DEFAULT_CLOCK_SKEW_SECS};
use crate::wallet::resolver::DidResolver;
use chrono::Utc;
use log::debug;
use std::sync::Arc;

/// Deepest nesting level that is decoded. Level 0 is the outer token,
/// level 1 the credentials embedded in a presentation.
pub const MAX_DECODE_DEPTH: usize = 1;

/// Expected issuer: a single identifier or any member of a set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuerConstraint {
    Exact(String),
    AnyOf(Vec<String>),
}

impl IssuerConstraint {
    fn accepts(&self, issuer: &str) -> bool {
        match self {
            IssuerConstraint::Exact(expected) => expected == issuer,
            IssuerConstraint::AnyOf(accepted) => accepted.iter().any(|a| a == issuer),
        }
    }
}

/// Constraints applied by [`CredentialVerifier::decode_and_verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyOptions {
    pub audience: Option<String>,
    pub issuer: Option<IssuerConstraint>,
    pub subject: Option<String>,
    /// Decode and verify the credentials embedded in a presentation
    pub decode_credentials: bool,
    /// Reject payloads that are not tagged `VerifiablePresentation`
    pub require_verifiable_presentation: bool,
}

impl VerifyOptions {
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(IssuerConstraint::Exact(issuer.into()));
        self
    }

    pub fn any_issuer_of(mut self, issuers: Vec<String>) -> Self {
        self.issuer = Some(IssuerConstraint::AnyOf(issuers));
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn decode_credentials(mut self, decode: bool) -> Self {
        self.decode_credentials = decode;
        self
    }

    pub fn require_verifiable_presentation(mut self, require: bool) -> Self {
        self.require_verifiable_presentation = require;
        self
    }

    /// Options for a credential embedded in a presentation issued by
    /// `holder`: the credential must be about the holder.
    fn for_embedded_credential(holder: Option<String>) -> Self {
        VerifyOptions {
            subject: holder,
            ..Default::default()
        }
    }
}

/// Credential verifier backed by a DID resolver.
#[derive(Clone)]
pub struct CredentialVerifier {
    /// Shared resolver for issuer keys
    resolver: Arc<dyn DidResolver>,
    /// Tolerance applied to token validity windows, in seconds
    clock_skew: i64,
}

impl CredentialVerifier {
    pub fn new(resolver: Arc<dyn DidResolver>) -> Self {
        Self {
            resolver,
            clock_skew: DEFAULT_CLOCK_SKEW_SECS,
        }
    }

    pub fn with_clock_skew(mut self, clock_skew: i64) -> Self {
        self.clock_skew = clock_skew;
        self
    }

    /// Decodes `token` and verifies it against `options` at the current time.
    ///
    /// # Returns
    /// - `Ok(DecodedToken)` when the token is authentic and every check holds;
    ///   for presentations decoded with `decode_credentials`, the embedded
    ///   credentials are attached in input order
    /// - `Err(VerifyError::MalformedToken)` when the token itself cannot be
    ///   trusted (structure, signature, validity window)
    /// - `Err(VerifyError::Verification)` with every violated constraint,
    ///   newline separated, and the partially decoded token
    pub fn decode_and_verify(&self, token: &str, options: &VerifyOptions) -> Result<DecodedToken, VerifyError> {
        self.decode_and_verify_at(token, options, Utc::now().timestamp())
    }

    /// Like [`decode_and_verify`](Self::decode_and_verify) with an explicit
    /// clock (unix seconds).
    pub fn decode_and_verify_at(
        &self,
        token: &str,
        options: &VerifyOptions,
        now: i64,
    ) -> Result<DecodedToken, VerifyError> {
        self.decode_at_depth(token, options, now, 0)
    }

    /// Returns whether a token is authentic, without constraint checks.
    pub fn verify_credential(&self, token: &str) -> bool {
        match verify_jwt(token, self.resolver.as_ref(), Utc::now().timestamp(), self.clock_skew) {
            Ok(_) => true,
            Err(e) => {
                debug!("Token not valid: {}", e);
                false
            }
        }
    }

    fn decode_at_depth(
        &self,
        token: &str,
        options: &VerifyOptions,
        now: i64,
        depth: usize,
    ) -> Result<DecodedToken, VerifyError> {
        let mut decoded = self.authenticate(token, now)?;
        let mut errors = Vec::new();

        if options.require_verifiable_presentation
            && !decoded.payload.vp.as_ref().is_some_and(|vp| vp.is_verifiable_presentation())
        {
            errors.push("payload is not a VerifiablePresentation".to_string());
        }

        if options.decode_credentials && depth < MAX_DECODE_DEPTH {
            let holder = decoded.payload.iss.clone();
            if let Some(vp) = decoded.payload.vp.as_mut() {
                let sub_options = VerifyOptions::for_embedded_credential(holder);
                let mut decoded_credentials = Vec::with_capacity(vp.verifiable_credential.len());

                for (index, credential) in vp.verifiable_credential.iter().enumerate() {
                    match self.decode_at_depth(credential, &sub_options, now, depth + 1) {
                        Ok(sub) => decoded_credentials.push(sub),
                        Err(e) => errors.push(format!(
                            "embedded credential #{} failed to decode: {} (token: {})",
                            index,
                            single_line(&e.to_string()),
                            credential
                        )),
                    }
                }
                vp.decoded_credentials = decoded_credentials;
            }
        }

        if let Some(expected) = &options.audience {
            match &decoded.payload.aud {
                Some(aud) if aud.contains(expected) => {}
                Some(aud) => errors.push(format!(
                    "audience mismatch: expected {} in {}",
                    expected,
                    describe_audience(aud)
                )),
                None => errors.push(format!("audience mismatch: expected {} but token has no aud", expected)),
            }
        }

        if let Some(expected) = &options.issuer {
            if !expected.accepts(&decoded.issuer) {
                errors.push(format!(
                    "issuer mismatch: {} is not {}",
                    decoded.issuer,
                    describe_issuer(expected)
                ));
            }
        }

        if let Some(expected) = &options.subject {
            if decoded.payload.sub.as_deref() != Some(expected.as_str()) {
                errors.push(format!(
                    "subject mismatch: expected {} but got {}",
                    expected,
                    decoded.payload.sub.as_deref().unwrap_or("<none>")
                ));
            }
        }

        if errors.is_empty() {
            Ok(decoded)
        } else {
            Err(VerificationError {
                messages: errors,
                decoded: Box::new(decoded),
            }
            .into())
        }
    }

    fn authenticate(&self, token: &str, now: i64) -> Result<DecodedToken, TokenError> {
        verify_jwt(token, self.resolver.as_ref(), now, self.clock_skew)
    }
}

fn describe_audience(aud: &Audience) -> String {
    match aud {
        Audience::Single(aud) => format!("[{}]", aud),
        Audience::Multiple(auds) => format!("[{}]", auds.join(", ")),
    }
}

fn describe_issuer(expected: &IssuerConstraint) -> String {
    match expected {
        IssuerConstraint::Exact(issuer) => issuer.clone(),
        IssuerConstraint::AnyOf(issuers) => format!("one of [{}]", issuers.join(", ")),
    }
}

// Keeps nested aggregate messages on a single line of the outer report.
fn single_line(message: &str) -> String {
    message.replace('\n', "; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::credential::{ClaimSet, Credential, PERSON_CREDENTIAL};
    use crate::models::token::JwtPayload;
    use crate::services::credential_issuer::CredentialIssuer;
    use crate::services::jwt::create_jwt;
    use crate::wallet::key_management::{EthrSigner, KeyDidSigner, Signer};
    use crate::wallet::resolver::UniversalResolver;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    const VERIFIER: &str = "did:example:verifier";

    fn verifier() -> CredentialVerifier {
        CredentialVerifier::new(Arc::new(UniversalResolver::default()))
    }

    fn issuer() -> CredentialIssuer {
        CredentialIssuer::new(Arc::new(KeyDidSigner::from_seed(&[9u8; 32]).unwrap()))
    }

    fn claims(value: serde_json::Value) -> ClaimSet {
        value.as_object().cloned().unwrap()
    }

    fn verification_error(result: Result<DecodedToken, VerifyError>) -> VerificationError {
        match result {
            Err(VerifyError::Verification(e)) => e,
            other => panic!("expected aggregated verification error, got {:?}", other),
        }
    }

    fn tamper(credential: &mut Credential) {
        // swap the signature for one over different content
        let other = issuer()
            .issue(claims(json!({"name": "Mallory"})), &credential.subject_id, &[])
            .unwrap();
        let signature = other.proof.rsplit('.').next().unwrap().to_string();
        let (signing_input, _) = credential.proof.rsplit_once('.').unwrap();
        credential.proof = format!("{}.{}", signing_input, signature);
    }

    #[test]
    fn test_issued_credential_round_trips() {
        let issuer = issuer();
        let subject_claims = claims(json!({
            "name": "Lo, Morten",
            "address": {"country": "NO", "postalCode": "0150"},
            "age": 82
        }));
        let credential = issuer
            .issue(subject_claims.clone(), "did:example:subject", &[PERSON_CREDENTIAL])
            .unwrap();

        let options = VerifyOptions::default()
            .subject("did:example:subject")
            .issuer(issuer.issuer_id());
        let decoded = verifier().decode_and_verify(&credential.proof, &options).unwrap();

        assert_eq!(decoded.payload.credential_subject(), Some(&subject_claims));
        assert_eq!(decoded.issuer, issuer.issuer_id());
    }

    #[test]
    fn test_verifying_twice_yields_identical_payloads() {
        let credential = issuer()
            .issue(claims(json!({"b": [1, 2], "a": "x"})), "did:example:subject", &[])
            .unwrap();
        let verifier = verifier();
        let options = VerifyOptions::default();

        let first = verifier.decode_and_verify(&credential.proof, &options).unwrap();
        let second = verifier.decode_and_verify(&credential.proof, &options).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_vec(first.payload.credential_subject().unwrap()).unwrap(),
            serde_json::to_vec(second.payload.credential_subject().unwrap()).unwrap()
        );
    }

    #[test]
    fn test_audience_enforcement() {
        let signer = EthrSigner::random();
        let token = create_jwt(
            &signer,
            &JwtPayload {
                iss: Some(signer.did().to_string()),
                aud: Some(Audience::Single("X".into())),
                ..Default::default()
            },
        )
        .unwrap();
        let verifier = verifier();

        let err = verification_error(verifier.decode_and_verify(&token, &VerifyOptions::default().audience("Y")));
        assert_eq!(err.messages.len(), 1);
        assert!(err.messages[0].contains("audience mismatch"));
        assert!(verifier
            .decode_and_verify(&token, &VerifyOptions::default().audience("X"))
            .is_ok());
    }

    #[test]
    fn test_audience_set_contains_expected() {
        let signer = EthrSigner::random();
        let token = create_jwt(
            &signer,
            &JwtPayload {
                iss: Some(signer.did().to_string()),
                aud: Some(Audience::Multiple(vec!["W".into(), "X".into()])),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(verifier()
            .decode_and_verify(&token, &VerifyOptions::default().audience("X"))
            .is_ok());
        assert!(verifier()
            .decode_and_verify(&token, &VerifyOptions::default().audience("Y"))
            .is_err());
    }

    #[test]
    fn test_issuer_set_membership() {
        let issuer = issuer();
        let credential = issuer.issue(ClaimSet::new(), "did:example:s", &[]).unwrap();
        let verifier = verifier();

        let accepted = VerifyOptions::default().any_issuer_of(vec![
            "did:example:other".into(),
            issuer.issuer_id().to_string(),
        ]);
        assert!(verifier.decode_and_verify(&credential.proof, &accepted).is_ok());

        let rejected = VerifyOptions::default().any_issuer_of(vec!["did:example:other".into()]);
        let err = verification_error(verifier.decode_and_verify(&credential.proof, &rejected));
        assert!(err.to_string().contains("issuer mismatch"));
    }

    #[test]
    fn test_all_violations_are_reported_together() {
        let credential = issuer().issue(ClaimSet::new(), "did:example:s", &[]).unwrap();
        let options = VerifyOptions::default()
            .audience(VERIFIER)
            .issuer("did:example:other")
            .subject("did:example:someone-else")
            .require_verifiable_presentation(true);

        let err = verification_error(verifier().decode_and_verify(&credential.proof, &options));
        assert_eq!(err.messages.len(), 4);
        assert!(err.messages[0].contains("VerifiablePresentation"));
        assert!(err.messages[1].contains("audience"));
        assert!(err.messages[2].contains("issuer"));
        assert!(err.messages[3].contains("subject"));
        assert_eq!(err.to_string(), err.messages.join("\n"));
        assert_eq!(err.decoded.payload.sub.as_deref(), Some("did:example:s"));
    }

    #[test]
    fn test_presentation_with_valid_credentials_decodes_in_order() {
        let holder = EthrSigner::random();
        let issuer = issuer();
        let first = issuer.issue(claims(json!({"n": 1})), holder.did(), &[]).unwrap();
        let second = issuer.issue(claims(json!({"n": 2})), holder.did(), &[]).unwrap();
        let presentation =
            CredentialIssuer::present(&holder, &[VERIFIER.to_string()], &[first, second]).unwrap();

        let options = VerifyOptions::default()
            .audience(VERIFIER)
            .decode_credentials(true)
            .require_verifiable_presentation(true);
        let decoded = verifier().decode_and_verify(&presentation.proof, &options).unwrap();

        let subjects: Vec<_> = decoded
            .decoded_credentials()
            .iter()
            .map(|c| c.payload.credential_subject().unwrap()["n"].clone())
            .collect();
        assert_eq!(subjects, vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_expired_embedded_credential_is_aggregated() {
        let holder = EthrSigner::random();
        let issuer = issuer().with_validity(Duration::hours(1));
        let expired = issuer
            .issue_at(claims(json!({"n": "expired"})), holder.did(), &[], Utc::now() - Duration::days(2))
            .unwrap();
        let valid = issuer.issue(claims(json!({"n": "valid"})), holder.did(), &[]).unwrap();
        let presentation =
            CredentialIssuer::present(&holder, &[VERIFIER.to_string()], &[expired, valid]).unwrap();

        let options = VerifyOptions::default().audience(VERIFIER).decode_credentials(true);
        let err = verification_error(verifier().decode_and_verify(&presentation.proof, &options));

        assert_eq!(err.messages.len(), 1);
        assert!(err.messages[0].contains("embedded credential #0"));
        assert!(err.messages[0].contains("expired"));

        let survivors = err.decoded.decoded_credentials();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].payload.credential_subject().unwrap()["n"], "valid");
    }

    #[test]
    fn test_tampered_embedded_credential_does_not_abort_siblings() {
        let holder = EthrSigner::random();
        let issuer = issuer();
        let first = issuer.issue(claims(json!({"n": 1})), holder.did(), &[]).unwrap();
        let mut tampered = issuer.issue(claims(json!({"n": 2})), holder.did(), &[]).unwrap();
        tamper(&mut tampered);
        let third = issuer.issue(claims(json!({"n": 3})), holder.did(), &[]).unwrap();
        let presentation =
            CredentialIssuer::present(&holder, &[VERIFIER.to_string()], &[first, tampered, third]).unwrap();

        let options = VerifyOptions::default().decode_credentials(true);
        let err = verification_error(verifier().decode_and_verify(&presentation.proof, &options));

        assert_eq!(err.messages.len(), 1);
        assert!(err.messages[0].contains("embedded credential #1"));
        assert!(err.messages[0].contains("invalid signature"));

        let survivors: Vec<_> = err
            .decoded
            .decoded_credentials()
            .iter()
            .map(|c| c.payload.credential_subject().unwrap()["n"].clone())
            .collect();
        assert_eq!(survivors, vec![json!(1), json!(3)]);
    }

    #[test]
    fn test_embedded_credential_must_be_about_the_holder() {
        let holder = EthrSigner::random();
        let stranger = EthrSigner::random();
        let credential = issuer().issue(ClaimSet::new(), stranger.did(), &[]).unwrap();
        let presentation = CredentialIssuer::present(&holder, &[], &[credential]).unwrap();

        let options = VerifyOptions::default().decode_credentials(true);
        let err = verification_error(verifier().decode_and_verify(&presentation.proof, &options));
        assert!(err.messages[0].contains("subject mismatch"));
        assert!(err.decoded.decoded_credentials().is_empty());
    }

    #[test]
    fn test_embedded_credentials_are_not_decoded_unless_requested() {
        let holder = EthrSigner::random();
        let credential = issuer().issue(ClaimSet::new(), holder.did(), &[]).unwrap();
        let presentation = CredentialIssuer::present(&holder, &[], &[credential]).unwrap();

        let decoded = verifier()
            .decode_and_verify(&presentation.proof, &VerifyOptions::default())
            .unwrap();
        assert!(decoded.decoded_credentials().is_empty());
        assert_eq!(decoded.payload.vp.unwrap().verifiable_credential.len(), 1);
    }

    #[test]
    fn test_embedded_presentation_is_not_expanded() {
        let holder = EthrSigner::random();
        let credential = issuer().issue(ClaimSet::new(), holder.did(), &[]).unwrap();
        let inner = CredentialIssuer::present(&holder, &[], &[credential]).unwrap();
        // a presentation smuggled in as an embedded credential
        let outer = CredentialIssuer::present(
            &holder,
            &[],
            &[Credential {
                proof: inner.proof.clone(),
                ..inner.credentials[0].clone()
            }],
        )
        .unwrap();

        let options = VerifyOptions::default().decode_credentials(true);
        let err = verification_error(verifier().decode_and_verify(&outer.proof, &options));
        // the inner presentation has no sub, so the holder subject check fails
        assert!(err.messages[0].contains("subject mismatch"));
        assert!(err.decoded.decoded_credentials().is_empty());
    }

    #[test]
    fn test_decode_credentials_is_ignored_at_max_depth() {
        let holder = EthrSigner::random();
        let credential = issuer().issue(ClaimSet::new(), holder.did(), &[]).unwrap();
        let presentation = CredentialIssuer::present(&holder, &[], &[credential]).unwrap();
        let options = VerifyOptions::default().decode_credentials(true);
        let verifier = verifier();

        let top = verifier
            .decode_at_depth(&presentation.proof, &options, Utc::now().timestamp(), 0)
            .unwrap();
        assert_eq!(top.decoded_credentials().len(), 1);

        let deepest = verifier
            .decode_at_depth(&presentation.proof, &options, Utc::now().timestamp(), MAX_DECODE_DEPTH)
            .unwrap();
        assert!(deepest.decoded_credentials().is_empty());
    }

    #[test]
    fn test_outer_forgery_is_fatal() {
        let mut credential = issuer().issue(ClaimSet::new(), "did:example:s", &[]).unwrap();
        tamper(&mut credential);

        let result = verifier().decode_and_verify(&credential.proof, &VerifyOptions::default().audience(VERIFIER));
        assert!(matches!(
            result,
            Err(VerifyError::MalformedToken(TokenError::InvalidSignature(_)))
        ));
        assert!(matches!(
            verifier().decode_and_verify("garbage", &VerifyOptions::default()),
            Err(VerifyError::MalformedToken(TokenError::Malformed(_)))
        ));
    }

    #[test]
    fn test_verify_credential_reports_authenticity() {
        let issuer = issuer();
        let mut credential = issuer.issue(ClaimSet::new(), "did:example:s", &[]).unwrap();
        assert!(verifier().verify_credential(&credential.proof));
        tamper(&mut credential);
        assert!(!verifier().verify_credential(&credential.proof));
    }

    #[test]
    fn test_decode_at_fixed_clock() {
        let issuer = issuer().with_validity(Duration::hours(1));
        let at = Utc.with_ymd_and_hms(2030, 5, 1, 0, 0, 0).unwrap();
        let credential = issuer.issue_at(ClaimSet::new(), "did:example:s", &[], at).unwrap();
        let verifier = verifier().with_clock_skew(0);

        assert!(verifier
            .decode_and_verify_at(&credential.proof, &VerifyOptions::default(), at.timestamp() + 60)
            .is_ok());
        assert!(matches!(
            verifier.decode_and_verify_at(&credential.proof, &VerifyOptions::default(), at.timestamp() + 7200),
            Err(VerifyError::MalformedToken(TokenError::Expired { .. }))
        ));
    }
}
