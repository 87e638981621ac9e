//! Authentication primitives.
//!
//! - [`jwt`] -- JWT access-token validation (and minting for tests and local tooling).

pub mod jwt;
