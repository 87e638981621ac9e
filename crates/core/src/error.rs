use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// An action was attempted on a record that is not in the required state,
    /// or another request changed the record first.
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    /// The detection model could not be run. The image stays retryable.
    #[error("Detection unavailable: {0}")]
    DetectionUnavailable(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let codes: Vec<&str> = errs.iter().map(|e| e.code.as_ref()).collect();
                format!("{field} ({})", codes.join(", "))
            })
            .collect();
        fields.sort();
        CoreError::Validation(format!("Invalid fields: {}", fields.join("; ")))
    }
}
