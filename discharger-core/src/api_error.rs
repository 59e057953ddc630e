use serde::{Deserialize, Serialize};

/// JSON error envelope returned by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<FieldIssue>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    Invalid,
    Conflict,
    Internal,
}

/// Field-level validation detail
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl ErrorBody {
    pub fn new(error: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
            issues: Vec::new(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    /// Create a not found error
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::new(ErrorKind::NotFound, format!("{} not found: {}", entity, id))
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Generic server failure; the cause is logged, never returned
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Attach a field-level issue
    pub fn with_issue(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.issues.push(FieldIssue {
            field: field.into(),
            message: message.into(),
        });
        self
    }
}
