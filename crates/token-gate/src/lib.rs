//! Token gate library.
//!
//! Verifies bearer tokens against an issuer's published key set and turns
//! the outcome into an allow/deny decision for an API gateway.
//!
//! - `auth`: pipeline components (key set, verifier, claims, decision)
//! - `gate`: the orchestrating entry point
//! - `routes`/`handlers`/`middleware`: the HTTP host

pub mod auth;
pub mod config;
pub mod errors;
pub mod gate;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
