//! Notification Registry Error Types

use thiserror::Error;

use crate::platform::NotifyStatus;

/// Result type for registry operations
pub type NotifyResult<T> = Result<T, NotifyError>;

/// Errors that can occur in the notification registry
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Notification name failed validation before reaching the platform
    #[error("Invalid notification name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// State value is not a 64-bit signed integer
    #[error("state must be a 64-bit integer, got {value:?}")]
    InvalidStateValue { value: String },

    /// `add` called for a name that already has a live observer
    #[error("An observer is already observing {0}")]
    AlreadyObserving(String),

    /// `remove`/`suspend`/`resume` called for a name with no live observer
    #[error("No observer exists for {0}")]
    NoObserver(String),

    /// `set_state`/`get_state` called without a registration token for the name
    #[error("No registration token exists for {0}")]
    Unregistered(String),

    /// The platform already holds a registration for the name on this client
    #[error("Platform already has a registration for {0}")]
    AlreadyRegisteredAtPlatform(String),

    /// A platform call returned a non-success status
    #[error("Platform {operation} failed: {status}")]
    Platform {
        operation: String,
        status: NotifyStatus,
    },

    /// The requested transport is not available on this target
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The dispatcher thread could not be started or joined
    #[error("Dispatcher error: {0}")]
    Dispatcher(String),

    /// The registry has been shut down
    #[error("Notification registry is shut down")]
    Shutdown,
}

impl NotifyError {
    /// Create an invalid name error
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid state value error
    pub fn invalid_state_value(value: impl Into<String>) -> Self {
        Self::InvalidStateValue { value: value.into() }
    }

    /// Create a platform failure error
    pub fn platform(operation: impl Into<String>, status: NotifyStatus) -> Self {
        Self::Platform {
            operation: operation.into(),
            status,
        }
    }

    /// Whether this is a validation error (raised before any platform call)
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidName { .. } | Self::InvalidStateValue { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_messages() {
        let error = NotifyError::AlreadyObserving("com.example.test.key".to_string());
        assert_eq!(error.to_string(), "An observer is already observing com.example.test.key");

        let error = NotifyError::NoObserver("com.example.test.key".to_string());
        assert_eq!(error.to_string(), "No observer exists for com.example.test.key");

        let error = NotifyError::Unregistered("com.example.state.key".to_string());
        assert_eq!(error.to_string(), "No registration token exists for com.example.state.key");
    }

    #[test]
    fn test_platform_error_includes_status() {
        let error = NotifyError::platform("suspend", NotifyStatus::InvalidToken);
        assert_eq!(error.to_string(), "Platform suspend failed: invalid token (2)");
        assert!(!error.is_validation());
    }

    #[test]
    fn test_validation_classification() {
        assert!(NotifyError::invalid_name("", "empty").is_validation());
        assert!(NotifyError::invalid_state_value("abc").is_validation());
        assert!(!NotifyError::Shutdown.is_validation());
    }
}
