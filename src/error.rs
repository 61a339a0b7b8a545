use thiserror::Error;

/// Failures surfaced by the gateway, the forms and the screens.
///
/// None of these are fatal to the process: the screen that hit one reports it
/// through its notifier and stays usable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LmsError {
    #[error("Please fill in the {field} field")]
    MissingRequiredField { field: String },

    #[error("{field} must be a whole number, got {value:?}")]
    InvalidNumericInput { field: String, value: String },

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Record {id} no longer exists in {collection}")]
    NotFound { collection: String, id: String },

    #[error("Rejected by backend: {0}")]
    ValidationRejected(String),

    #[error("{collection} is append-only")]
    ReadOnlyCollection { collection: String },

    #[error("Attachment error: {0}")]
    Attachment(String),
}

impl LmsError {
    /// Transient faults are worth re-triggering by hand; everything else needs
    /// the input or the target fixed first.
    pub fn is_transient(&self) -> bool {
        matches!(self, LmsError::BackendUnavailable(_))
    }

    pub fn missing(field: &str) -> Self {
        LmsError::MissingRequiredField {
            field: field.to_string(),
        }
    }

    pub fn not_found(collection: &str, id: &str) -> Self {
        LmsError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<reqwest::Error> for LmsError {
    fn from(err: reqwest::Error) -> Self {
        LmsError::BackendUnavailable(err.to_string())
    }
}

pub type LmsResult<T> = std::result::Result<T, LmsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_backend_faults_are_transient() {
        assert!(LmsError::BackendUnavailable("timeout".into()).is_transient());
        assert!(!LmsError::InvalidCredentials.is_transient());
        assert!(!LmsError::not_found("students", "abc").is_transient());
    }

    #[test]
    fn test_messages_name_the_field() {
        let err = LmsError::missing("Student ID");
        assert_eq!(err.to_string(), "Please fill in the Student ID field");

        let err = LmsError::InvalidNumericInput {
            field: "Marks".into(),
            value: "abc".into(),
        };
        assert_eq!(err.to_string(), "Marks must be a whole number, got \"abc\"");
    }
}
