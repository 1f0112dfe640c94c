use thiserror::Error;

/// Errors raised while declaring or wiring controllers and serializers.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Descriptor of kind '{descriptor}' cannot be registered as '{kind}'")]
    KindMismatch { kind: String, descriptor: String },

    #[error("Hook '{method}' cannot declare both 'only' and 'except'")]
    ConflictingHookFilter { method: String },

    #[error("Custom action '{0}' collides with a built-in action")]
    ReservedAction(String),

    #[error("Custom action '{name}' is declared twice on {target}")]
    DuplicateAction { target: String, name: String },

    #[error("Hook method '{method}' on {target} is not bound to an implementation")]
    UnboundHook { target: String, method: String },

    #[error("Invalid resource id: {0}")]
    InvalidId(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreError {
    pub fn kind_mismatch(kind: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self::KindMismatch {
            kind: kind.into(),
            descriptor: descriptor.into(),
        }
    }

    pub fn unbound_hook(target: impl Into<String>, method: impl Into<String>) -> Self {
        Self::UnboundHook {
            target: target.into(),
            method: method.into(),
        }
    }

    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId(id.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Check if this error is a client error (4xx category)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidId(_) | Self::JsonError(_))
    }

    /// Check if this error is a server error (5xx category)
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidId(_) => ErrorCategory::Validation,
            Self::JsonError(_) => ErrorCategory::Serialization,
            Self::KindMismatch { .. }
            | Self::ConflictingHookFilter { .. }
            | Self::ReservedAction(_)
            | Self::DuplicateAction { .. }
            | Self::UnboundHook { .. }
            | Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Serialization,
    Configuration,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Serialization => write!(f, "serialization"),
            Self::Configuration => write!(f, "configuration"),
        }
    }
}

/// Convenience result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_errors_are_configuration_errors() {
        let err = CoreError::ReservedAction("show".into());
        assert_eq!(err.to_string(), "Custom action 'show' collides with a built-in action");
        assert!(err.is_server_error());
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = CoreError::unbound_hook("ArticlesController", "setRecord");
        assert!(err.to_string().contains("setRecord"));
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn invalid_id_is_a_client_error() {
        let err = CoreError::invalid_id("abc");
        assert!(err.is_client_error());
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let err: CoreError = json_err.into();
        assert!(matches!(err, CoreError::JsonError(_)));
        assert_eq!(err.category(), ErrorCategory::Serialization);
    }

    #[test]
    fn categories_display() {
        assert_eq!(ErrorCategory::Validation.to_string(), "validation");
        assert_eq!(ErrorCategory::Configuration.to_string(), "configuration");
    }
}
