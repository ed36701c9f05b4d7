//! Common utilities and types shared across Token Gate components.

#![warn(clippy::pedantic)]

/// Module for compact-token utilities (size limit, segment splitting, unverified header)
pub mod jwt;
