//! Layered error definitions
//!
//! Categorized by source: config / handler construction / processing

use std::fmt;
use thiserror::Error;

/// Unified configuration and construction error
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Handler Errors =====
    /// A handler is missing a required parameter or got an unusable one
    #[error("handler '{handler}' parameter '{param}': {message}")]
    HandlerParam {
        handler: String,
        param: String,
        message: String,
    },

    /// Handler construction failed for another reason
    #[error("failed to create handler '{handler}': {message}")]
    HandlerCreation { handler: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create handler parameter error
    pub fn handler_param(
        handler: impl Into<String>,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::HandlerParam {
            handler: handler.into(),
            param: param.into(),
            message: message.into(),
        }
    }

    /// Create handler construction error
    pub fn handler_creation(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerCreation {
            handler: handler.into(),
            message: message.into(),
        }
    }
}

/// Why a processing attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessErrorKind {
    /// Network unreachable, timeout, connection reset
    Connectivity,
    /// Credential rejected by the remote side
    Authentication,
    /// Payload could not be interpreted or was refused as invalid
    MalformedInput,
    /// Local execution failed (spawn error, non-zero exit)
    Execution,
}

impl ProcessErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connectivity => "connectivity",
            Self::Authentication => "authentication",
            Self::MalformedInput => "malformed_input",
            Self::Execution => "execution",
        }
    }
}

impl fmt::Display for ProcessErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one processing attempt
#[derive(Debug, Clone, Error)]
#[error("{kind} failure: {message}")]
pub struct ProcessError {
    kind: ProcessErrorKind,
    message: String,
}

impl ProcessError {
    pub fn new(kind: ProcessErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::new(ProcessErrorKind::Connectivity, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProcessErrorKind::Authentication, message)
    }

    pub fn malformed_input(message: impl Into<String>) -> Self {
        Self::new(ProcessErrorKind::MalformedInput, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ProcessErrorKind::Execution, message)
    }

    pub fn kind(&self) -> ProcessErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
