// src/wallet/resolver.rs
//! Resolution of issuer identifiers to verification keys.
//!
//! Both supported DID methods are self-certifying: the key material (or the
//! Ethereum address controlling it) is encoded in the identifier itself, so
//! resolution never leaves the process.
//!
//! - `did:ethr:[<network>:]<0x-address | 0x-public-key>`
//! - `did:key:z<base58btc(0xed 0x01 || ed25519-public-key)>`

use crate::error::ResolverError;
use crate::utils::crypto::{address_from_verifying_key, format_address};
use ethers::types::Address;
use ethers::utils::hex;
use k256::ecdsa::VerifyingKey;

/// Multicodec prefix of an Ed25519 public key.
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

pub const DID_ETHR_PREFIX: &str = "did:ethr:";
pub const DID_KEY_PREFIX: &str = "did:key:";

/// Key material a token signature is checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationKey {
    /// Signatures must recover to this secp256k1 account
    EthereumAddress(Address),
    /// Raw 32-byte Ed25519 public key
    Ed25519([u8; 32]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub key_id: String,
    pub key: VerificationKey,
}

/// Resolves a DID to the key that is allowed to sign on its behalf.
pub trait DidResolver: Send + Sync {
    fn resolve(&self, did: &str) -> Result<ResolvedKey, ResolverError>;
}

/// Builds a `did:ethr` identifier for an account.
pub fn did_ethr(address: Address) -> String {
    format!("{}{}", DID_ETHR_PREFIX, format_address(address))
}

/// Extracts the controlling account from a `did:ethr` identifier.
///
/// The method specific id may be an address or a secp256k1 public key
/// (compressed or uncompressed), optionally preceded by a network name.
pub fn ethr_address(did: &str) -> Result<Address, ResolverError> {
    let invalid = |reason: &str| ResolverError::InvalidDid {
        did: did.to_string(),
        reason: reason.to_string(),
    };

    let rest = did
        .strip_prefix(DID_ETHR_PREFIX)
        .ok_or_else(|| ResolverError::UnsupportedMethod(did.to_string()))?;
    let id = rest.rsplit(':').next().unwrap_or(rest);
    let bytes = hex::decode(id.trim_start_matches("0x")).map_err(|_| invalid("identifier is not hex"))?;

    match bytes.len() {
        20 => Ok(Address::from_slice(&bytes)),
        33 | 65 => {
            let key = VerifyingKey::from_sec1_bytes(&bytes).map_err(|_| invalid("not a secp256k1 public key"))?;
            Ok(address_from_verifying_key(&key))
        }
        _ => Err(invalid("expected an address or a public key")),
    }
}

/// Builds a `did:key` identifier for an Ed25519 public key.
pub fn did_key_from_ed25519(public_key: &[u8]) -> String {
    let mut multicodec = ED25519_MULTICODEC.to_vec();
    multicodec.extend_from_slice(public_key);
    format!("{}z{}", DID_KEY_PREFIX, bs58::encode(multicodec).into_string())
}

/// Resolver for `did:ethr` identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct EthrResolver;

impl DidResolver for EthrResolver {
    fn resolve(&self, did: &str) -> Result<ResolvedKey, ResolverError> {
        let address = ethr_address(did)?;
        Ok(ResolvedKey {
            key_id: format!("{}#controller", did),
            key: VerificationKey::EthereumAddress(address),
        })
    }
}

/// Resolver for Ed25519 `did:key` identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyDidResolver;

impl DidResolver for KeyDidResolver {
    fn resolve(&self, did: &str) -> Result<ResolvedKey, ResolverError> {
        let invalid = |reason: &str| ResolverError::InvalidDid {
            did: did.to_string(),
            reason: reason.to_string(),
        };

        let fingerprint = did
            .strip_prefix(DID_KEY_PREFIX)
            .ok_or_else(|| ResolverError::UnsupportedMethod(did.to_string()))?;
        let encoded = fingerprint
            .strip_prefix('z')
            .ok_or_else(|| invalid("only base58btc multibase is supported"))?;
        let decoded = bs58::decode(encoded)
            .into_vec()
            .map_err(|_| invalid("invalid base58btc encoding"))?;

        if decoded.len() != 34 || decoded[..2] != ED25519_MULTICODEC {
            return Err(invalid("not an Ed25519 key"));
        }
        let mut public_key = [0u8; 32];
        public_key.copy_from_slice(&decoded[2..]);

        Ok(ResolvedKey {
            key_id: format!("{}#{}", did, fingerprint),
            key: VerificationKey::Ed25519(public_key),
        })
    }
}

/// Dispatches on the DID method to the matching resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniversalResolver {
    ethr: EthrResolver,
    key: KeyDidResolver,
}

impl DidResolver for UniversalResolver {
    fn resolve(&self, did: &str) -> Result<ResolvedKey, ResolverError> {
        if did.starts_with(DID_ETHR_PREFIX) {
            self.ethr.resolve(did)
        } else if did.starts_with(DID_KEY_PREFIX) {
            self.key.resolve(did)
        } else {
            Err(ResolverError::UnsupportedMethod(did.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::signers::{LocalWallet, Signer};

    #[test]
    fn test_ethr_did_round_trips_address() {
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let did = did_ethr(wallet.address());
        assert!(did.starts_with("did:ethr:0x"));
        assert_eq!(ethr_address(&did).unwrap(), wallet.address());
    }

    #[test]
    fn test_ethr_did_with_network_and_public_key() {
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let sec1 = wallet.signer().verifying_key().to_sec1_bytes();
        let did = format!("did:ethr:brok:0x{}", hex::encode(sec1));

        let resolved = EthrResolver.resolve(&did).unwrap();
        assert_eq!(resolved.key, VerificationKey::EthereumAddress(wallet.address()));
        assert_eq!(resolved.key_id, format!("{}#controller", did));
    }

    #[test]
    fn test_ethr_did_rejects_garbage() {
        assert!(matches!(
            ethr_address("did:ethr:0x1234"),
            Err(ResolverError::InvalidDid { .. })
        ));
        assert!(matches!(
            ethr_address("did:web:example.com"),
            Err(ResolverError::UnsupportedMethod(_))
        ));
    }

    #[test]
    fn test_key_did_round_trips_public_key() {
        let public_key = [7u8; 32];
        let did = did_key_from_ed25519(&public_key);
        assert!(did.starts_with("did:key:z6Mk"));

        let resolved = KeyDidResolver.resolve(&did).unwrap();
        assert_eq!(resolved.key, VerificationKey::Ed25519(public_key));
    }

    #[test]
    fn test_universal_resolver_dispatches_on_method() {
        let resolver = UniversalResolver::default();
        let key_did = did_key_from_ed25519(&[1u8; 32]);
        let ethr_did = did_ethr(Address::repeat_byte(0x11));

        assert!(matches!(resolver.resolve(&key_did).unwrap().key, VerificationKey::Ed25519(_)));
        assert!(matches!(
            resolver.resolve(&ethr_did).unwrap().key,
            VerificationKey::EthereumAddress(_)
        ));
        assert!(resolver.resolve("did:web:example.com").is_err());
    }
}
