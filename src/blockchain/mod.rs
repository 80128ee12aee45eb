// src/blockchain/mod.rs
//! Ledger access: on-chain authentication records and account funding.

pub mod ethereum_client;
pub mod in_memory;
pub mod ledger;
