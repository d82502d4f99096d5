//! Error types for courseqa core.

use std::{error::Error, fmt, io};

/// Error type for courseqa core operations.
#[derive(Debug)]
pub enum CourseQaError {
    /// An underlying I/O error.
    Io(io::Error),
    /// The course archive could not be read or written.
    Archive(String),
    /// JSON encoding or decoding failed.
    Json(serde_json::Error),
    /// A domain precondition was not met (nothing to scan, nothing to fix).
    Precondition(String),
    /// A referenced record or artifact does not exist.
    NotFound(String),
    /// The accessibility engine could not be started at all.
    EngineUnavailable(String),
    /// The storage backend rejected an operation.
    Store(String),
    /// An external capability returned an unusable response.
    External(String),
    /// A catch-all error with a message.
    Other(String),
}

impl CourseQaError {
    /// Whether the error was caused by the caller rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Precondition(_) | Self::NotFound(_))
    }
}

impl fmt::Display for CourseQaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Archive(message) => write!(f, "archive error: {message}"),
            Self::Json(err) => write!(f, "json error: {err}"),
            Self::Precondition(message) => write!(f, "{message}"),
            Self::NotFound(message) => write!(f, "{message}"),
            Self::EngineUnavailable(message) => {
                write!(f, "accessibility engine unavailable: {message}")
            }
            Self::Store(message) => write!(f, "store error: {message}"),
            Self::External(message) => write!(f, "external service error: {message}"),
            Self::Other(message) => write!(f, "{message}"),
        }
    }
}

impl Error for CourseQaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CourseQaError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for CourseQaError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<zip::result::ZipError> for CourseQaError {
    fn from(value: zip::result::ZipError) -> Self {
        Self::Archive(value.to_string())
    }
}

impl From<reqwest::Error> for CourseQaError {
    fn from(value: reqwest::Error) -> Self {
        Self::External(value.to_string())
    }
}

/// Convenience result type for courseqa core.
pub type Result<T> = std::result::Result<T, CourseQaError>;

#[cfg(test)]
mod tests {
    use super::CourseQaError;
    use std::io;

    #[test]
    fn io_error_formats_message() {
        let error = CourseQaError::Io(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(format!("{error}"), "io error: boom");
    }

    #[test]
    fn precondition_error_formats_message_verbatim() {
        let error = CourseQaError::Precondition("No zip asset found to fix".to_string());
        assert_eq!(format!("{error}"), "No zip asset found to fix");
        assert!(error.is_client_error());
    }

    #[test]
    fn infrastructure_errors_are_not_client_errors() {
        assert!(!CourseQaError::Archive("corrupt".to_string()).is_client_error());
        assert!(!CourseQaError::Store("locked".to_string()).is_client_error());
        assert!(CourseQaError::NotFound("Project not found".to_string()).is_client_error());
    }

    #[test]
    fn from_io_error_maps_variant() {
        let error: CourseQaError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        match error {
            CourseQaError::Io(inner) => {
                assert_eq!(inner.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected Io variant, got {other:?}"),
        }
    }
}
