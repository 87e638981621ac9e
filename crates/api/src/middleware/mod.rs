//! Authentication and authorization middleware extractors.
//!
//! - [`auth::AuthUser`] -- Extracts the authenticated user from a JWT Bearer token.
//! - [`rbac::RequireCapture`] -- Requires `field_worker` or `admin` role.
//! - [`rbac::RequireReviewer`] -- Requires `reviewer` or `admin` role.

pub mod auth;
pub mod rbac;
