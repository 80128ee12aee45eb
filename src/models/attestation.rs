// src/models/attestation.rs
//! Claims carried by a BankID attestation token.
//!
//! The token is issued by the external identity broker after a user has
//! authenticated with BankID. Only the attributes used for credential
//! issuance are typed; everything else is kept in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Date format of the `dateofbirth` claim.
pub const DATE_OF_BIRTH_FORMAT: &str = "%Y%m%d";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct BankIdClaims {
    #[serde(default)]
    pub iss: Option<String>,

    #[serde(default)]
    pub sub: Option<String>,

    /// Full legal name, "Family, Given"
    /// Example: "Lo, Morten"
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub given_name: Option<String>,

    #[serde(default)]
    pub family_name: Option<String>,

    /// Date of birth in `yyyyMMdd`
    /// Example: "19411021"
    #[serde(default)]
    pub dateofbirth: Option<String>,

    /// National identity number
    /// Example: "14102123973"
    #[serde(default)]
    pub socialno: Option<String>,

    #[serde(default)]
    pub country: Option<String>,

    #[serde(default)]
    pub issuingbank: Option<String>,

    #[serde(default)]
    pub iat: Option<i64>,

    #[serde(default)]
    pub exp: Option<i64>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
