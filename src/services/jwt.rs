// src/services/jwt.rs
//! Compact JWS encoding and authenticity checks for signed tokens.
//!
//! A token is `base64url(header).base64url(payload).base64url(signature)`.
//! [`verify_jwt`] establishes authenticity only: structure, algorithm,
//! issuer key resolution, signature and validity window. Audience, issuer
//! and subject constraints belong to the credential verifier.

use crate::error::{SignerError, TokenError};
use crate::models::token::{DecodedToken, JwtHeader, JwtPayload};
use crate::utils::crypto::{address_from_verifying_key, sha256};
use crate::utils::serialization::{decode_bytes, decode_segment, encode_bytes, encode_segment};
use crate::wallet::key_management::{SignatureAlgorithm, Signer};
use crate::wallet::resolver::{DidResolver, VerificationKey};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use ring::signature::{UnparsedPublicKey, ED25519};

/// Default tolerance applied to `nbf`, `iat` and `exp`, in seconds.
pub const DEFAULT_CLOCK_SKEW_SECS: i64 = 300;

/// Signs `payload` as `signer`, producing a compact token.
pub fn create_jwt(signer: &dyn Signer, payload: &JwtPayload) -> Result<String, SignerError> {
    let header = JwtHeader {
        alg: signer.algorithm().as_str().to_string(),
        typ: Some("JWT".to_string()),
        kid: Some(signer.key_id()),
    };
    let signing_input = format!("{}.{}", encode_segment(&header)?, encode_segment(payload)?);
    let signature = signer.sign_bytes(signing_input.as_bytes())?;
    Ok(format!("{}.{}", signing_input, encode_bytes(&signature)))
}

/// The three segments of a token, decoded but not yet checked.
#[derive(Debug, Clone)]
pub struct UnverifiedToken<'a> {
    pub header: JwtHeader,
    pub payload: JwtPayload,
    pub signature: Vec<u8>,
    pub signing_input: &'a str,
}

/// Splits and decodes a token without checking its signature.
pub fn decode_unverified(token: &str) -> Result<UnverifiedToken<'_>, TokenError> {
    let (signing_input, signature) = token
        .rsplit_once('.')
        .ok_or_else(|| TokenError::Malformed("expected three dot-separated segments".into()))?;
    let (header, payload) = signing_input
        .split_once('.')
        .ok_or_else(|| TokenError::Malformed("expected three dot-separated segments".into()))?;
    if payload.contains('.') {
        return Err(TokenError::Malformed("expected three dot-separated segments".into()));
    }

    Ok(UnverifiedToken {
        header: decode_segment(header).map_err(|e| TokenError::Malformed(format!("header: {}", e)))?,
        payload: decode_segment(payload).map_err(|e| TokenError::Malformed(format!("payload: {}", e)))?,
        signature: decode_bytes(signature).map_err(|e| TokenError::Malformed(format!("signature: {}", e)))?,
        signing_input,
    })
}

/// Checks a token's authenticity at time `now` (unix seconds).
///
/// # Errors
/// - [`TokenError::Malformed`] for undecodable tokens or a missing `iss`
/// - [`TokenError::UnsupportedAlgorithm`] for unknown `alg` values
/// - [`TokenError::UnresolvableIssuer`] if the issuer DID yields no key
/// - [`TokenError::InvalidSignature`] if the signature does not match
/// - [`TokenError::NotYetValid`] / [`TokenError::Expired`] outside the
///   validity window widened by `clock_skew` seconds
pub fn verify_jwt(
    token: &str,
    resolver: &dyn DidResolver,
    now: i64,
    clock_skew: i64,
) -> Result<DecodedToken, TokenError> {
    let unverified = decode_unverified(token)?;
    let algorithm: SignatureAlgorithm = unverified
        .header
        .alg
        .parse()
        .map_err(TokenError::UnsupportedAlgorithm)?;
    let issuer = unverified
        .payload
        .iss
        .clone()
        .ok_or_else(|| TokenError::Malformed("missing iss claim".into()))?;

    let resolved = resolver
        .resolve(&issuer)
        .map_err(|e| TokenError::UnresolvableIssuer {
            issuer: issuer.clone(),
            reason: e.to_string(),
        })?;

    let valid = match (algorithm, &resolved.key) {
        (SignatureAlgorithm::Es256kR, VerificationKey::EthereumAddress(expected)) => {
            recover_es256k(unverified.signing_input.as_bytes(), &unverified.signature)
                .map(|key| address_from_verifying_key(&key) == *expected)
                .unwrap_or(false)
        }
        (SignatureAlgorithm::EdDsa, VerificationKey::Ed25519(public_key)) => {
            UnparsedPublicKey::new(&ED25519, public_key)
                .verify(unverified.signing_input.as_bytes(), &unverified.signature)
                .is_ok()
        }
        _ => false,
    };
    if !valid {
        return Err(TokenError::InvalidSignature(issuer));
    }

    check_validity_window(&unverified.payload, now, clock_skew)?;

    Ok(DecodedToken {
        header: unverified.header,
        payload: unverified.payload,
        issuer,
        signer_key_id: resolved.key_id,
        jwt: token.to_string(),
    })
}

fn recover_es256k(message: &[u8], signature: &[u8]) -> Option<VerifyingKey> {
    if signature.len() != 65 {
        return None;
    }
    let recovery_byte = match signature[64] {
        v @ 27..=28 => v - 27,
        v => v,
    };
    let recovery_id = RecoveryId::from_byte(recovery_byte)?;
    let signature = EcdsaSignature::from_slice(&signature[..64]).ok()?;
    VerifyingKey::recover_from_prehash(&sha256(message), &signature, recovery_id).ok()
}

fn check_validity_window(payload: &JwtPayload, now: i64, clock_skew: i64) -> Result<(), TokenError> {
    // nbf takes precedence over iat when both are present
    if let Some(nbf) = payload.nbf.or(payload.iat) {
        if nbf > now + clock_skew {
            return Err(TokenError::NotYetValid { nbf, now });
        }
    }
    if let Some(exp) = payload.exp {
        if exp <= now - clock_skew {
            return Err(TokenError::Expired { exp, now });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::key_management::{EthrSigner, KeyDidSigner};
    use crate::wallet::resolver::UniversalResolver;

    const NOW: i64 = 1_700_000_000;

    fn payload_for(signer: &dyn Signer) -> JwtPayload {
        JwtPayload {
            iat: Some(NOW),
            iss: Some(signer.did().to_string()),
            sub: Some("did:example:subject".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_ethr_token_verifies() {
        let signer = EthrSigner::random();
        let token = create_jwt(&signer, &payload_for(&signer)).unwrap();

        let decoded = verify_jwt(&token, &UniversalResolver::default(), NOW, 0).unwrap();
        assert_eq!(decoded.issuer, signer.did());
        assert_eq!(decoded.signer_key_id, signer.key_id());
        assert_eq!(decoded.header.alg, "ES256K-R");
        assert_eq!(decoded.payload.sub.as_deref(), Some("did:example:subject"));
    }

    #[test]
    fn test_key_did_token_verifies() {
        let signer = KeyDidSigner::generate().unwrap();
        let token = create_jwt(&signer, &payload_for(&signer)).unwrap();

        let decoded = verify_jwt(&token, &UniversalResolver::default(), NOW, 0).unwrap();
        assert_eq!(decoded.issuer, signer.did());
        assert_eq!(decoded.header.alg, "EdDSA");
    }

    #[test]
    fn test_token_claiming_other_issuer_is_rejected() {
        let signer = EthrSigner::random();
        let impostor = EthrSigner::random();
        let mut payload = payload_for(&signer);
        payload.iss = Some(impostor.did().to_string());
        let token = create_jwt(&signer, &payload).unwrap();

        let err = verify_jwt(&token, &UniversalResolver::default(), NOW, 0).unwrap_err();
        assert_eq!(err, TokenError::InvalidSignature(impostor.did().to_string()));
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let signer = KeyDidSigner::generate().unwrap();
        let token = create_jwt(&signer, &payload_for(&signer)).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let mut payload = payload_for(&signer);
        payload.sub = Some("did:example:mallory".into());
        let forged = format!("{}.{}.{}", parts[0], encode_segment(&payload).unwrap(), parts[2]);

        assert!(matches!(
            verify_jwt(&forged, &UniversalResolver::default(), NOW, 0),
            Err(TokenError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_structurally_invalid_tokens_are_malformed() {
        let resolver = UniversalResolver::default();
        for token in ["", "abc", "a.b", "a.b.c.d", "!!.??.**"] {
            assert!(
                matches!(verify_jwt(token, &resolver, NOW, 0), Err(TokenError::Malformed(_))),
                "token {:?} should be malformed",
                token
            );
        }
    }

    #[test]
    fn test_validity_window_with_skew() {
        let signer = EthrSigner::random();
        let resolver = UniversalResolver::default();
        let mut payload = payload_for(&signer);
        payload.exp = Some(NOW + 10);
        let token = create_jwt(&signer, &payload).unwrap();

        assert!(verify_jwt(&token, &resolver, NOW, 0).is_ok());
        assert!(matches!(
            verify_jwt(&token, &resolver, NOW + 10, 0),
            Err(TokenError::Expired { .. })
        ));
        assert!(verify_jwt(&token, &resolver, NOW + 10, DEFAULT_CLOCK_SKEW_SECS).is_ok());
        assert!(matches!(
            verify_jwt(&token, &resolver, NOW - 600, DEFAULT_CLOCK_SKEW_SECS),
            Err(TokenError::NotYetValid { .. })
        ));
    }

    #[test]
    fn test_unknown_algorithm_is_rejected() {
        let signer = EthrSigner::random();
        let header = JwtHeader {
            alg: "none".into(),
            typ: Some("JWT".into()),
            kid: None,
        };
        let token = format!(
            "{}.{}.",
            encode_segment(&header).unwrap(),
            encode_segment(&payload_for(&signer)).unwrap()
        );

        assert_eq!(
            verify_jwt(&token, &UniversalResolver::default(), NOW, 0).unwrap_err(),
            TokenError::UnsupportedAlgorithm("none".into())
        );
    }
}
