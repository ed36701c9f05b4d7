//! Token verification components.
//!
//! - `jwks`: key-set fetching and caching
//! - `keys`: key-set parsing and kid resolution
//! - `verify`: algorithm pinning and signature verification
//! - `claims`: expiration and audience checks
//! - `decision`: allow/deny decision artifacts

pub mod claims;
pub mod decision;
pub mod jwks;
pub mod keys;
pub mod verify;
