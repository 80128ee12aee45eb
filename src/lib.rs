// src/lib.rs

//! # Authentication Provider
//!
//! Authenticates users from a BankID attestation bound to an Ethereum
//! account and issues them signed person credentials.
//!
//! ## Architecture Overview
//! 1. **Wallet Layer**: service and holder signers, DID resolution
//! 2. **Services Layer**: token codec, credential issuance and verification,
//!    the authentication flow and the HTTP API
//! 3. **Blockchain Layer**: authentication records and account funding
//! 4. **Models**: credentials, presentations, token payloads, attestations

// Module declarations (organized by functional domain)
pub mod blockchain; // Ledger access
pub mod config;     // Typed settings from the environment
pub mod context;    // Long-lived shared state
pub mod error;      // Error taxonomy
pub mod models;     // Data structures
pub mod services;   // Business logic and API
pub mod utils;      // Helper functions
pub mod wallet;     // Cryptographic key operations
