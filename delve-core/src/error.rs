//! Unified error handling system
//!
//! Structured error types with context, failure classification and recovery hints.
//! Research branches use the classification to decide whether a failure degrades
//! to an empty contribution or aborts the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type DelveResult<T> = Result<T, DelveError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for delve
#[derive(Error, Debug)]
pub enum DelveError {
    #[error("Rate limit exceeded: {message}")]
    RateLimit {
        message: String,
        retry_after_ms: Option<u64>,
        context: ErrorContext,
    },

    #[error("Authentication error: {message}")]
    Authentication {
        message: String,
        context: ErrorContext,
    },

    #[error("Resource not found: {resource}")]
    NotFound {
        resource: String,
        context: ErrorContext,
    },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Parse error: {message}")]
    Parse {
        message: String,
        context: ErrorContext,
    },

    #[error("Upstream error ({}): {message}", status_label(.status))]
    Upstream {
        message: String,
        status: Option<u16>,
        provider: Option<String>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Operation timeout: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

fn status_label(status: &Option<u16>) -> String {
    status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "no status".to_string())
}

impl DelveError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            DelveError::RateLimit { context, .. } => Some(context),
            DelveError::Authentication { context, .. } => Some(context),
            DelveError::NotFound { context, .. } => Some(context),
            DelveError::Network { context, .. } => Some(context),
            DelveError::Parse { context, .. } => Some(context),
            DelveError::Upstream { context, .. } => Some(context),
            DelveError::Config { context, .. } => Some(context),
            DelveError::Validation { context, .. } => Some(context),
            DelveError::Timeout { context, .. } => Some(context),
            DelveError::Internal { context, .. } => Some(context),
            DelveError::Io(_) | DelveError::Serialization(_) => None,
        }
    }

    /// Short classification label, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            DelveError::RateLimit { .. } => "rate_limited",
            DelveError::Authentication { .. } => "auth",
            DelveError::NotFound { .. } => "not_found",
            DelveError::Network { .. } => "network",
            DelveError::Parse { .. } => "parse",
            DelveError::Upstream { .. } => "upstream",
            DelveError::Config { .. } => "config",
            DelveError::Validation { .. } => "validation",
            DelveError::Timeout { .. } => "timeout",
            DelveError::Io(_) => "io",
            DelveError::Serialization(_) => "serialization",
            DelveError::Internal { .. } => "internal",
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DelveError::RateLimit { .. } | DelveError::Network { .. } | DelveError::Timeout { .. }
        )
    }

    /// Fatal errors abort a whole research run instead of degrading a branch
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DelveError::Authentication { .. } | DelveError::Config { .. }
        )
    }

    /// Get retry delay in milliseconds for recoverable errors
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            DelveError::Network { .. } => Some(1000),
            DelveError::Timeout { .. } => Some(2000),
            DelveError::RateLimit { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        let error_id = self.context().map(|c| c.error_id.as_str());
        match self {
            DelveError::Internal { .. } => {
                error!(error_id = ?error_id, error = %self, "Internal error occurred");
            }
            DelveError::Config { .. }
            | DelveError::Validation { .. }
            | DelveError::Authentication { .. } => {
                error!(
                    error_id = ?error_id,
                    kind = self.kind(),
                    error = %self,
                    "Configuration or credential error"
                );
            }
            DelveError::RateLimit { .. }
            | DelveError::Network { .. }
            | DelveError::Timeout { .. }
            | DelveError::NotFound { .. }
            | DelveError::Parse { .. } => {
                warn!(
                    error_id = ?error_id,
                    kind = self.kind(),
                    error = %self,
                    "Recoverable error"
                );
            }
            _ => {
                error!(error_id = ?error_id, kind = self.kind(), error = %self, "Error occurred");
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::DelveError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'delve config --init' to create default config"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::DelveError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}

#[macro_export]
macro_rules! not_found_error {
    ($resource:expr, $component:expr) => {
        $crate::DelveError::NotFound {
            resource: $resource.to_string(),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Verify the endpoint URL"),
        }
    };
}

#[macro_export]
macro_rules! parse_error {
    ($msg:expr, $component:expr) => {
        $crate::DelveError::Parse {
            message: $msg.to_string(),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("The model ignored the structured-output instruction"),
        }
    };
}

#[macro_export]
macro_rules! rate_limit_error {
    ($msg:expr, $component:expr) => {
        $crate::DelveError::RateLimit {
            message: $msg.to_string(),
            retry_after_ms: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $retry_after_ms:expr) => {
        $crate::DelveError::RateLimit {
            message: $msg.to_string(),
            retry_after_ms: $retry_after_ms,
            context: $crate::ErrorContext::new($component),
        }
    };
}
