//! Observability module for the token gate.
//!
//! Provides metrics definitions. HTTP metrics middleware lives in
//! `crate::middleware`.

pub mod metrics;
