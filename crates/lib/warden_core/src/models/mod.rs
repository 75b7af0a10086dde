//! Domain models shared by storage and the engines.
//!
//! These are internal records, distinct from the wire types produced by the
//! engines (token responses, introspection results).

pub mod grant;
pub mod owner;

pub use grant::{AccessToken, Approval, AuthorizationCode};
pub use owner::ResourceOwner;
