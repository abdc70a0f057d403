//! # Error Handling
//!
//! Error types for the policy compiler using `thiserror`.
//!
//! Only pass-fatal conditions surface as [`Error`]: template/render
//! failures, unreadable tweak files, malformed compiler configuration.
//! Per-route data problems (bad secret, invalid duration, dangling ref)
//! are recorded into the affected route's policy instead, so one broken
//! route never blocks the rest of the pass.

/// Custom result type for compiler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the policy compiler
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Compiler configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Render failures (template model inconsistency, formatting)
    #[error("Render error: {0}")]
    Render(String),

    /// I/O errors (tweak dir snippets, bind NIC config)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Policy document serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Render model YAML errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Internal invariant violations
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new render error
    pub fn render<S: Into<String>>(message: S) -> Self {
        Self::Render(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

/// Per-route data errors.
///
/// These never abort a pass; they are stringified into the owning policy's
/// `err` field so the data plane can refuse that single route.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("invalid timeout value {value:?}: {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("timeout value {got} ms exceeds maximum allowed value {max} ms")]
    DurationOverflow { got: u64, max: u64 },

    #[error("invalid object reference {0:?}, expect namespace/name")]
    InvalidObjectKey(String),

    #[error("secret refs not found")]
    SecretNotFound,

    #[error("invalid secret content: {0}")]
    InvalidSecret(String),

    #[error("configmap {key} not found")]
    ConfigMapNotFound { key: String },

    #[error("configmap {key} has no section {section:?}")]
    SectionNotFound { key: String, section: String },
}
