// src/utils/serialization.rs
//! Serialization utilities for compact signed tokens.
//!
//! Token segments are base64url encoded without padding; header and payload
//! segments carry JSON.

use serde::{de::DeserializeOwned, Serialize};

/// Encodes raw bytes as an unpadded base64url segment.
pub fn encode_bytes(data: &[u8]) -> String {
    base64::encode_config(data, base64::URL_SAFE_NO_PAD)
}

/// Decodes an unpadded base64url segment.
///
/// # Errors
/// Returns a description of the failure if the segment is not valid base64url.
pub fn decode_bytes(segment: &str) -> Result<Vec<u8>, String> {
    base64::decode_config(segment, base64::URL_SAFE_NO_PAD)
        .map_err(|e| format!("Base64 decoding failed: {}", e))
}

/// Serializes a value to JSON and encodes it as a token segment.
pub fn encode_segment<T: Serialize>(data: &T) -> Result<String, serde_json::Error> {
    Ok(encode_bytes(&serde_json::to_vec(data)?))
}

/// Decodes a token segment and deserializes the JSON it carries.
pub fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, String> {
    let bytes = decode_bytes(segment)?;
    serde_json::from_slice(&bytes).map_err(|e| format!("Deserialization failed: {}", e))
}
