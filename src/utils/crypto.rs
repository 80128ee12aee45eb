// src/utils/crypto.rs
//! Cryptographic utilities optimized for blockchain compatibility.
//!
//! Keccak-256 is used wherever an Ethereum-compatible digest is required
//! (addresses, binding signatures); SHA-256 is the digest of the `ES256K-R`
//! token signing input.

use ethers::types::{Address, Signature, SignatureError};
use ethers::utils::keccak256;
use k256::ecdsa::VerifyingKey;
use sha2::{Digest, Sha256};
use std::str::FromStr;

/// Computes a Keccak-256 hash of the input data (Ethereum-compatible).
///
/// # Arguments
/// * `data` - Binary data to hash (as bytes slice)
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    keccak256(data)
}

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Derives the Ethereum address controlled by a secp256k1 public key.
///
/// The address is the last 20 bytes of the Keccak-256 hash of the
/// uncompressed public key without its `0x04` prefix.
pub fn address_from_verifying_key(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Formats an address as a lowercase hex string with 0x prefix.
pub fn format_address(addr: Address) -> String {
    format!("0x{:x}", addr)
}

/// Recovers the account that produced an Ethereum personal-sign signature
/// over `hash(token)`.
///
/// The token bytes are hashed with Keccak-256, the 32-byte hash is wrapped in
/// the `"\x19Ethereum Signed Message:\n32"` envelope and the signer is
/// recovered from it.
///
/// # Errors
/// Returns [`SignatureError`] if the signature is not 65 hex-encoded bytes or
/// does not correspond to a recoverable public key.
pub fn recover_binding_address(token: &[u8], signature_hex: &str) -> Result<Address, SignatureError> {
    let signature = Signature::from_str(signature_hex.trim())?;
    let token_hash = hash_data(token);
    signature.recover(token_hash.to_vec())
}
