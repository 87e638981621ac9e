//! Well-known role name constants.
//!
//! These must match the `role` claim issued by the identity provider.

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_FIELD_WORKER: &str = "field_worker";
pub const ROLE_REVIEWER: &str = "reviewer";

/// All roles the API recognises.
pub const VALID_ROLES: &[&str] = &[ROLE_ADMIN, ROLE_FIELD_WORKER, ROLE_REVIEWER];

/// Whether the role may upload and process images.
pub fn can_capture(role: &str) -> bool {
    role == ROLE_ADMIN || role == ROLE_FIELD_WORKER
}

/// Whether the role may review and allocate detection results.
pub fn can_review(role: &str) -> bool {
    role == ROLE_ADMIN || role == ROLE_REVIEWER
}

/// Whether the role sees every upload rather than only its own.
pub fn sees_all_images(role: &str) -> bool {
    can_review(role)
}
