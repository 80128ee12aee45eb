// src/models/mod.rs
//! Data structures shared by the issuer, verifier and authentication flow.

pub mod attestation;
pub mod credential;
pub mod token;
