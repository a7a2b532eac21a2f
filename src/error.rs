//! Error types for the SFC redirection engine
//!
//! Every public operation fails with one of the variants below. The message
//! shapes of `InvalidArgument` and `NotFound` are relied upon by existing
//! callers and must not change.

use thiserror::Error;

/// Remote operation performed against the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Get,
    List,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "Create"),
            Operation::Get => write!(f, "Get"),
            Operation::List => write!(f, "List"),
            Operation::Update => write!(f, "Update"),
            Operation::Delete => write!(f, "Delete"),
        }
    }
}

/// Unified error type for the redirection engine
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("null passed for {0} !")]
    InvalidArgument(String),

    #[error("Cannot find {kind} by id: {id}!")]
    NotFound { kind: String, id: String },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unsupported(String),

    // =========================================================================
    // Provider Errors
    // =========================================================================
    #[error("{operation} {kind} failed! Status {}: {reason}", .status.map_or_else(|| "n/a".to_string(), |s| s.to_string()))]
    ProviderCallFailure {
        operation: Operation,
        kind: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("{operation} {kind} failed! SDN Controller returned null {kind}!")]
    ProviderNullResult { operation: Operation, kind: String },

    #[error("Step '{step}' failed after earlier changes were applied: {source}")]
    PartialApply {
        step: String,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Ambient Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an error, as exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Conflict,
    ProviderCallFailure,
    Unsupported,
    Configuration,
    Internal,
}

impl Error {
    /// Build a `NotFound` error for a resource kind and id
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Wrap an error raised by one step of a multi-step operation
    pub fn partial(step: impl Into<String>, source: Error) -> Self {
        Error::PartialApply {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::ProviderCallFailure { .. }
            | Error::ProviderNullResult { .. }
            | Error::Http(_) => ErrorKind::ProviderCallFailure,
            Error::PartialApply { source, .. } => source.kind(),
            Error::Configuration(_) | Error::YamlParse(_) => ErrorKind::Configuration,
            Error::Internal(_) | Error::JsonParse(_) | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether re-invoking the whole operation may succeed.
    ///
    /// The engine never retries on its own; this is advice for the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ProviderCallFailure { status, .. } => match status {
                None => true,
                Some(code) => *code == 409 || *code >= 500,
            },
            Error::Http(_) => true,
            Error::PartialApply { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

/// Result type alias for the redirection engine
pub type Result<T> = std::result::Result<T, Error>;
