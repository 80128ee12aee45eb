// src/wallet/mod.rs
//! Signing keys and DID resolution.

pub mod key_management;
pub mod resolver;
