use thiserror::Error;
use warp::http::StatusCode;

/// Custom error types for the poll server
#[derive(Debug, Error)]
pub enum PollError {
    /// Room and participant errors
    #[error("Room {0} not found")]
    RoomNotFound(String),

    #[error("Student name {0} already taken")]
    StudentNameTaken(String),

    /// Request errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Malformed message: {0}")]
    MalformedMessage(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Generic errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using PollError
pub type Result<T> = std::result::Result<T, PollError>;

impl PollError {
    /// Helper to create Internal errors with context
    pub fn internal(msg: impl Into<String>) -> Self {
        PollError::Internal(msg.into())
    }

    /// Helper to create InvalidInput errors
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        PollError::InvalidInput(msg.into())
    }

    /// HTTP status used when this error crosses the request/response boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            PollError::RoomNotFound(_) => StatusCode::NOT_FOUND,
            PollError::StudentNameTaken(_) => StatusCode::CONFLICT,
            PollError::InvalidInput(_) | PollError::MalformedMessage(_) => StatusCode::BAD_REQUEST,
            PollError::InvalidConfiguration(_) | PollError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PollError::RoomNotFound("ABC123".to_string());
        assert_eq!(err.to_string(), "Room ABC123 not found");
    }

    #[test]
    fn test_error_helpers() {
        let err = PollError::internal("Something went wrong");
        assert!(matches!(err, PollError::Internal(_)));

        let err = PollError::invalid_input("Admin name required");
        assert_eq!(err.to_string(), "Invalid input: Admin name required");
    }

    #[test]
    fn test_malformed_from_serde() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: PollError = parse_err.into();
        assert!(matches!(err, PollError::MalformedMessage(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            PollError::RoomNotFound("X".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            PollError::StudentNameTaken("bob".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            PollError::internal("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
