//! # Gate Test Utilities
//!
//! Shared test utilities for the token gate.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (Ed25519 from seeds, fixed RSA and P-256 keys)
//! - Test data builders (TestTokenBuilder)
//! - A wiremock-backed key-set endpoint (TestJwksServer)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gate_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let key = TestSigningKey::rsa("key-1")?;
//!     let server = TestJwksServer::start(&[&key]).await;
//!
//!     let token = key.sign(&TestTokenBuilder::new().for_user("alice").build());
//!     // point the gate at server.jwks_url() and authorize `token`
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_server;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use jwks_server::*;
pub use token_builders::*;
