//! Middleware for the Warden API.

pub mod auth;
