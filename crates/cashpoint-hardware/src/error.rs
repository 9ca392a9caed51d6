//! Error types for XFS manager and service provider operations.
//!
//! Every variant maps onto exactly one [`ResultCode`], so callers that only
//! care about the integer contract can use [`XfsError::code`] or
//! [`result_code`], while the `Display` output carries the error context.

use cashpoint_core::ResultCode;

/// Result type alias for XFS operations.
pub type Result<T> = std::result::Result<T, XfsError>;

/// Errors returned by the service manager and the device providers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XfsError {
    /// `startup` called while the manager is running.
    #[error("XFS manager already started")]
    AlreadyStarted,

    /// `cleanup` called while the manager is stopped.
    #[error("XFS manager not started")]
    NotStarted,

    /// Unknown logical name, unknown handle or closed handle.
    #[error("Invalid service: {reason}")]
    InvalidService { reason: String },

    /// Command or information category not recognized by the provider.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },

    /// Device precondition violated or simulated physical fault.
    #[error("Hardware error: {message}")]
    Hardware { message: String },

    /// Operation requires customer input that has not been supplied.
    #[error("User error: {message}")]
    User { message: String },

    /// Operation timed out after specified duration.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Command payload does not match the command.
    #[error("Invalid payload: {message}")]
    InvalidPayload { message: String },

    /// Manager configuration rejected at startup.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Unanticipated fault, including a provider panic.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl XfsError {
    /// Create a new invalid service error.
    pub fn invalid_service(reason: impl Into<String>) -> Self {
        Self::InvalidService {
            reason: reason.into(),
        }
    }

    /// Create a new unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create a new hardware error.
    pub fn hardware(message: impl Into<String>) -> Self {
        Self::Hardware {
            message: message.into(),
        }
    }

    /// Create a new user error.
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a new invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The XFS result code reported for this error.
    #[must_use]
    pub fn code(&self) -> ResultCode {
        match self {
            Self::AlreadyStarted => ResultCode::AlreadyStarted,
            Self::NotStarted => ResultCode::NotStarted,
            Self::InvalidService { .. } => ResultCode::InvalidService,
            Self::Unsupported { .. } => ResultCode::UnsupportedCommand,
            Self::Hardware { .. } => ResultCode::HardwareError,
            Self::User { .. } => ResultCode::UserError,
            Self::Timeout { .. } => ResultCode::Timeout,
            Self::InvalidPayload { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                ResultCode::InternalError
            }
        }
    }
}

impl From<cashpoint_core::Error> for XfsError {
    fn from(error: cashpoint_core::Error) -> Self {
        match error {
            cashpoint_core::Error::Config(message) => Self::configuration(message),
            other => Self::configuration(other.to_string()),
        }
    }
}

/// Flatten an operation result into its XFS result code.
///
/// # Examples
///
/// ```
/// use cashpoint_core::ResultCode;
/// use cashpoint_hardware::error::{XfsError, result_code};
///
/// let ok: Result<(), XfsError> = Ok(());
/// assert_eq!(result_code(&ok), ResultCode::Success);
///
/// let failed: Result<(), XfsError> = Err(XfsError::hardware("no card"));
/// assert_eq!(result_code(&failed), ResultCode::HardwareError);
/// ```
pub fn result_code<T>(result: &Result<T>) -> ResultCode {
    match result {
        Ok(_) => ResultCode::Success,
        Err(error) => error.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_errors() {
        assert_eq!(XfsError::AlreadyStarted.code(), ResultCode::AlreadyStarted);
        assert_eq!(XfsError::NotStarted.code(), ResultCode::NotStarted);
        assert_eq!(
            XfsError::AlreadyStarted.to_string(),
            "XFS manager already started"
        );
    }

    #[test]
    fn test_invalid_service_error() {
        let error = XfsError::invalid_service("handle 1042 is not open");
        assert_eq!(error.code(), ResultCode::InvalidService);
        assert_eq!(error.to_string(), "Invalid service: handle 1042 is not open");
    }

    #[test]
    fn test_timeout_error() {
        let error = XfsError::timeout(3000);
        assert!(matches!(error, XfsError::Timeout { .. }));
        assert_eq!(error.code(), ResultCode::Timeout);
        assert_eq!(error.to_string(), "Operation timeout after 3000ms");
    }

    #[test]
    fn test_device_errors() {
        assert_eq!(
            XfsError::hardware("no card").code(),
            ResultCode::HardwareError
        );
        assert_eq!(XfsError::user("no PIN").code(), ResultCode::UserError);
        assert_eq!(
            XfsError::unsupported("command 999").code(),
            ResultCode::UnsupportedCommand
        );
    }

    #[test]
    fn test_internal_class_errors() {
        let errors = vec![
            XfsError::internal("provider panicked"),
            XfsError::invalid_payload("expected amount"),
            XfsError::configuration("zero denomination"),
        ];

        for error in errors {
            assert_eq!(error.code(), ResultCode::InternalError);
        }
    }

    #[test]
    fn test_from_core_error() {
        let error: XfsError = cashpoint_core::Error::Config("bad pin".to_string()).into();
        assert!(matches!(error, XfsError::Configuration { .. }));
        assert_eq!(error.to_string(), "Configuration error: bad pin");
    }
}
