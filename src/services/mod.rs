// src/services/mod.rs
//! Business logic and API.

pub mod api_server;
pub mod auth_orchestrator;
pub mod credential_issuer;
pub mod external_validator;
pub mod jwt;
pub mod verifier;
