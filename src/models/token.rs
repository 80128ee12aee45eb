// src/models/token.rs
//! Signed token header and payload structures.

use crate::models::credential::{ClaimSet, CredentialEnvelope, PresentationEnvelope};
use serde::{Deserialize, Serialize};

/// JOSE header of a compact signed token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JwtHeader {
    pub alg: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    /// Key identifier, `<did>#<fragment>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// The `aud` claim, which may be a single identifier or a set of them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == audience,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == audience),
        }
    }

    /// Builds the most compact representation for a list of audiences.
    pub fn from_list(mut auds: Vec<String>) -> Option<Self> {
        match auds.len() {
            0 => None,
            1 => auds.pop().map(Audience::Single),
            _ => Some(Audience::Multiple(auds)),
        }
    }
}

/// Payload of a signed token.
///
/// Registered claims are typed, the credential and presentation envelopes
/// are typed, everything else is preserved in `extra`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct JwtPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vc: Option<CredentialEnvelope>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vp: Option<PresentationEnvelope>,

    #[serde(flatten)]
    pub extra: ClaimSet,
}

impl JwtPayload {
    /// Subject claims of a credential payload, if this is one.
    pub fn credential_subject(&self) -> Option<&ClaimSet> {
        self.vc.as_ref().map(|vc| &vc.credential_subject)
    }
}

/// A token whose signature and validity window have been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedToken {
    pub header: JwtHeader,
    pub payload: JwtPayload,

    /// Issuer whose key verified the signature
    pub issuer: String,

    /// Key id of the verifying key
    pub signer_key_id: String,

    /// The raw compact token
    pub jwt: String,
}

impl DecodedToken {
    /// Successfully decoded embedded credentials, empty unless this token is
    /// a presentation decoded with sub-decoding enabled.
    pub fn decoded_credentials(&self) -> &[DecodedToken] {
        self.payload
            .vp
            .as_ref()
            .map(|vp| vp.decoded_credentials.as_slice())
            .unwrap_or(&[])
    }
}
