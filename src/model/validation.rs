use std::fmt;

/// Schema violations for Farm and Animal documents
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Request body was not a JSON object
    NotAnObject,
    /// Body failed to decode into the record shape (missing field, wrong type, unknown status)
    Malformed(String),
    EmptyField(&'static str),
    NonPositive { field: &'static str, value: f64 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NotAnObject => write!(f, "request body must be a JSON object"),
            ValidationError::Malformed(msg) => write!(f, "invalid document: {}", msg),
            ValidationError::EmptyField(field) => write!(f, "{} must not be empty", field),
            ValidationError::NonPositive { field, value } => {
                write!(f, "{} must be positive, got {}", field, value)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<serde_json::Error> for ValidationError {
    fn from(e: serde_json::Error) -> Self {
        ValidationError::Malformed(e.to_string())
    }
}

/// Rejects empty or whitespace-only text for a required field.
pub(crate) fn require_text(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(())
}

/// Rejects zero, negative and non-finite numbers.
pub(crate) fn require_positive(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::NonPositive { field, value });
    }
    Ok(())
}
