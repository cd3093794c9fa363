//! Shortener - deterministic URL shortener core
//!
//! A long URL always maps to the same short key (an MD5 prefix). The
//! mapping lives in one of three interchangeable stores, visitors are
//! identified by short-lived signed tokens, and deletions are applied
//! asynchronously in small batches.
//!
//! # Architecture
//! - `codec`: short key derivation
//! - `storage`: the `Store` contract and its memory, file and database backends
//! - `services`: `ShorteningService`, the entry point for boundary layers
//! - `deletion`: bounded queue and workers applying soft deletes
//! - `identity`: visitor token issue and validation
//! - `config`: configuration loading
//! - `system`: logging and application lifecycle
//! - `interfaces`: command-line front end

pub mod cli;
pub mod codec;
pub mod config;
pub mod deletion;
pub mod errors;
pub mod identity;
pub mod interfaces;
pub mod services;
pub mod storage;
pub mod system;
pub mod utils;
