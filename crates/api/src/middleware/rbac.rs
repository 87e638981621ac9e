//! Role-based access control (RBAC) extractors.
//!
//! Each extractor wraps [`AuthUser`] and rejects requests whose role does not
//! meet the requirement.

use avicast_core::error::CoreError;
use avicast_core::roles::{can_capture, can_review};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Requires `field_worker` or `admin` role. Rejects with 403 Forbidden otherwise.
///
/// ```ignore
/// async fn upload(RequireCapture(user): RequireCapture) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
pub struct RequireCapture(pub AuthUser);

impl FromRequestParts<AppState> for RequireCapture {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !can_capture(&user.role) {
            return Err(AppError::Core(CoreError::Forbidden(
                "Field worker or Admin role required".into(),
            )));
        }
        Ok(RequireCapture(user))
    }
}

/// Requires `reviewer` or `admin` role. Rejects with 403 Forbidden otherwise.
pub struct RequireReviewer(pub AuthUser);

impl FromRequestParts<AppState> for RequireReviewer {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !can_review(&user.role) {
            return Err(AppError::Core(CoreError::Forbidden(
                "Reviewer or Admin role required".into(),
            )));
        }
        Ok(RequireReviewer(user))
    }
}
