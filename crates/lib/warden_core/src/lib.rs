//! # warden_core
//!
//! Core domain logic for Warden: the OAuth 2.0 authorize, token and
//! introspection engines together with the storage contract they run on.

pub mod authorize;
pub mod client;
pub mod config;
pub mod error;
pub mod introspect;
pub mod maintenance;
pub mod migrate;
pub mod models;
pub mod owner;
pub mod scope;
pub mod storage;
pub mod token;
pub mod tokens;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
