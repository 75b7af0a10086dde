//! Request handlers for the Warden API.

pub mod authorizations;
pub mod authorize;
pub mod clients;
pub mod introspect;
pub mod token;
