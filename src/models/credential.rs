// src/models/credential.rs
//! Verifiable Credential and Verifiable Presentation data model.
//!
//! Follows the JWT encoding of the
//! [W3C Verifiable Credentials Data Model](https://www.w3.org/TR/vc-data-model/):
//! the credential body travels in the `vc` member of a signed token and a
//! presentation body in the `vp` member.

use crate::models::token::DecodedToken;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Base JSON-LD context carried by every credential and presentation.
pub const W3C_CREDENTIALS_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";

/// Type tag present on every credential envelope.
pub const VERIFIABLE_CREDENTIAL: &str = "VerifiableCredential";

/// Type tag that marks a payload as a presentation.
pub const VERIFIABLE_PRESENTATION: &str = "VerifiablePresentation";

/// Type tag of the person credentials issued after authentication.
pub const PERSON_CREDENTIAL: &str = "PersonCredential";

/// Unordered attribute name to value mapping describing a credential subject.
pub type ClaimSet = Map<String, Value>;

/// The `vc` member of a credential token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialEnvelope {
    #[serde(rename = "@context", default)]
    pub context: Vec<String>,

    #[serde(rename = "type", default)]
    pub types: Vec<String>,

    /// Subject claims. The subject identifier itself lives in the token's
    /// `sub` claim, not in here.
    #[serde(default)]
    pub credential_subject: ClaimSet,
}

/// The `vp` member of a presentation token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PresentationEnvelope {
    #[serde(rename = "@context", default)]
    pub context: Vec<String>,

    #[serde(rename = "type", default)]
    pub types: Vec<String>,

    /// Embedded credential tokens, in the order the holder bundled them.
    #[serde(default)]
    pub verifiable_credential: Vec<String>,

    /// Embedded credentials that decoded and verified successfully, in input
    /// order. Only populated by the verifier when sub-decoding is requested.
    #[serde(skip)]
    pub decoded_credentials: Vec<DecodedToken>,
}

impl PresentationEnvelope {
    pub fn is_verifiable_presentation(&self) -> bool {
        self.types.iter().any(|t| t == VERIFIABLE_PRESENTATION)
    }
}

/// An issued credential.
///
/// Never mutated after creation: `proof` commits to the claims, subject,
/// issuer, types and issuance time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub subject_claims: ClaimSet,

    /// Identifier of the credential subject
    /// Example: "did:ethr:0x8ba1f109551bd432803012645ac136ddd64dba72"
    pub subject_id: String,

    /// Identifier of the issuer (the signer of `proof`)
    pub issuer_id: String,

    /// Type tags, always beginning with `VerifiableCredential`
    pub types: Vec<String>,

    /// Compact signed token
    pub proof: String,
}

/// A holder-signed bundle of credentials addressed to one or more verifiers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Presentation {
    /// Identifier of the holder, which is always the presentation issuer
    pub holder_id: String,

    /// Intended audiences
    pub verifier_ids: Vec<String>,

    pub credentials: Vec<Credential>,

    /// Compact signed token wrapping the credential tokens
    pub proof: String,
}
