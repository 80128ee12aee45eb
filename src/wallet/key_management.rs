// src/wallet/key_management.rs
//! Signing key management for the service and for credential holders.
//!
//! A [`Signer`] owns one private key and the DID that key speaks for.
//! Two interchangeable backends are provided and selected at startup:
//!
//! - [`EthrSigner`]: secp256k1 (via `k256`), `ES256K-R` signatures,
//!   `did:ethr` identifiers
//! - [`KeyDidSigner`]: Ed25519 (via `ring`), `EdDSA` signatures,
//!   `did:key` identifiers

use crate::error::SignerError;
use crate::utils::crypto::{address_from_verifying_key, sha256};
use crate::wallet::resolver::{did_ethr, did_key_from_ed25519};
use ethers::types::Address;
use ethers::utils::hex;
use k256::ecdsa::SigningKey;
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// JWS algorithms understood by the token codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// secp256k1 over SHA-256 with a trailing recovery byte
    Es256kR,
    /// Ed25519
    EdDsa,
}

impl SignatureAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Es256kR => "ES256K-R",
            SignatureAlgorithm::EdDsa => "EdDSA",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = String;

    fn from_str(alg: &str) -> Result<Self, Self::Err> {
        match alg {
            "ES256K-R" => Ok(SignatureAlgorithm::Es256kR),
            "EdDSA" | "Ed25519" => Ok(SignatureAlgorithm::EdDsa),
            other => Err(other.to_string()),
        }
    }
}

/// Capability to sign token payloads on behalf of a DID.
pub trait Signer: Send + Sync {
    /// The identifier this signer issues tokens as.
    fn did(&self) -> &str;

    /// Key identifier placed in the token header.
    fn key_id(&self) -> String;

    fn algorithm(&self) -> SignatureAlgorithm;

    /// Signs the JWS signing input (`header.payload`) and returns the raw
    /// signature bytes.
    fn sign_bytes(&self, message: &[u8]) -> Result<Vec<u8>, SignerError>;
}

/// DID method used for the service's own signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerMethod {
    Ethr,
    Key,
}

fn decode_key_hex(private_key_hex: &str) -> Result<Vec<u8>, SignerError> {
    hex::decode(private_key_hex.trim().trim_start_matches("0x"))
        .map_err(|e| SignerError::InvalidKey(format!("private key is not hex: {}", e)))
}

/// Builds the configured signer backend from hex-encoded key material.
pub fn signer_from_hex(method: SignerMethod, private_key_hex: &str) -> Result<Arc<dyn Signer>, SignerError> {
    Ok(match method {
        SignerMethod::Ethr => Arc::new(EthrSigner::from_private_key_hex(private_key_hex)?),
        SignerMethod::Key => Arc::new(KeyDidSigner::from_seed_hex(private_key_hex)?),
    })
}

/// secp256k1 signer identified by `did:ethr:<address>`.
#[derive(Clone)]
pub struct EthrSigner {
    /// Securely stored private key (never exposed)
    signing_key: SigningKey,
    address: Address,
    did: String,
}

impl EthrSigner {
    pub fn new(signing_key: SigningKey) -> Self {
        let address = address_from_verifying_key(signing_key.verifying_key());
        EthrSigner {
            signing_key,
            address,
            did: did_ethr(address),
        }
    }

    /// Generates a signer with a fresh key from the system RNG.
    pub fn random() -> Self {
        Self::new(SigningKey::random(&mut rand::rngs::OsRng))
    }

    /// Loads a 32-byte hex private key, with or without `0x` prefix.
    pub fn from_private_key_hex(private_key_hex: &str) -> Result<Self, SignerError> {
        let bytes = decode_key_hex(private_key_hex)?;
        let signing_key = SigningKey::from_slice(&bytes).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self::new(signing_key))
    }

    /// The account controlled by this key.
    pub fn address(&self) -> Address {
        self.address
    }
}

impl Signer for EthrSigner {
    fn did(&self) -> &str {
        &self.did
    }

    fn key_id(&self) -> String {
        format!("{}#controller", self.did)
    }

    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Es256kR
    }

    /// Signs with deterministic ECDSA (RFC 6979) over the SHA-256 prehash.
    ///
    /// Output is 65 bytes, `r || s || recovery_id`.
    fn sign_bytes(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        let digest = sha256(message);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| SignerError::SigningFailed(e.to_string()))?;

        let mut bytes = signature.to_bytes().to_vec();
        bytes.push(recovery_id.to_byte());
        Ok(bytes)
    }
}

/// Ed25519 signer identified by `did:key:z6Mk...`.
pub struct KeyDidSigner {
    key_pair: Ed25519KeyPair,
    did: String,
}

impl KeyDidSigner {
    /// Creates a signer from a 32-byte Ed25519 seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self, SignerError> {
        let key_pair =
            Ed25519KeyPair::from_seed_unchecked(seed).map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        let did = did_key_from_ed25519(key_pair.public_key().as_ref());
        Ok(KeyDidSigner { key_pair, did })
    }

    pub fn from_seed_hex(seed_hex: &str) -> Result<Self, SignerError> {
        Self::from_seed(&decode_key_hex(seed_hex)?)
    }

    /// Generates a signer with a fresh seed from the system RNG.
    pub fn generate() -> Result<Self, SignerError> {
        let mut seed = [0u8; 32];
        SystemRandom::new()
            .fill(&mut seed)
            .map_err(|_| SignerError::InvalidKey("system RNG failure".into()))?;
        Self::from_seed(&seed)
    }
}

impl Signer for KeyDidSigner {
    fn did(&self) -> &str {
        &self.did
    }

    fn key_id(&self) -> String {
        let fingerprint = self.did.trim_start_matches("did:key:");
        format!("{}#{}", self.did, fingerprint)
    }

    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::EdDsa
    }

    fn sign_bytes(&self, message: &[u8]) -> Result<Vec<u8>, SignerError> {
        Ok(self.key_pair.sign(message).as_ref().to_vec())
    }
}
