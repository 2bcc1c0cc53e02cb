//! Bifrost error types

use std::fmt;
use std::time::Duration;

/// The constraint that left selection with no feasible candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnmetConstraint {
    /// The catalog has no entries at all.
    EmptyCatalog,
    /// No catalog entry has strengths matching the task type.
    Capability { task_type: String },
    /// The request needs tool calling and no matching entry supports it.
    ToolCalling,
    /// Every matching entry was excluded by earlier failed attempts.
    Excluded,
    /// No matching entry fits the host's resources.
    Resources,
    /// Every matching provider is unhealthy and the last-resort rule is off.
    Health,
}

impl fmt::Display for UnmetConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCatalog => write!(f, "catalog is empty"),
            Self::Capability { task_type } => {
                write!(f, "no model has strengths for task '{task_type}'")
            }
            Self::ToolCalling => write!(f, "no tool-capable model"),
            Self::Excluded => write!(f, "all matching models were already tried"),
            Self::Resources => write!(f, "no model fits available system resources"),
            Self::Health => write!(f, "no healthy provider"),
        }
    }
}

/// Why a single attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptFailureKind {
    /// The attempt budget expired and the call was cancelled.
    Timeout,
    /// The collaborator returned an error (transport, API, decode...).
    Transport,
}

impl fmt::Display for AttemptFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Transport => write!(f, "transport error"),
        }
    }
}

/// Record of one failed attempt, kept for `AllProvidersFailed`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure {
    pub provider: String,
    pub model: String,
    pub kind: AttemptFailureKind,
    pub elapsed: Duration,
    pub message: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}: {} after {}ms ({})",
            self.provider,
            self.model,
            self.kind,
            self.elapsed.as_millis(),
            self.message
        )
    }
}

fn join_failures(attempts: &[AttemptFailure]) -> String {
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Bifrost error types
#[derive(Debug, thiserror::Error)]
pub enum BifrostError {
    // Routing errors
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no candidates: {constraint}")]
    NoCandidates { constraint: UnmetConstraint },

    #[error("attempt on {provider}/{model} timed out after {after:?}")]
    AttemptTimeout {
        provider: String,
        model: String,
        after: Duration,
    },

    #[error("attempt on {provider}/{model} failed: {message}")]
    AttemptTransport {
        provider: String,
        model: String,
        message: String,
    },

    #[error("all {} attempts failed: {}", .attempts.len(), join_failures(.attempts))]
    AllProvidersFailed { attempts: Vec<AttemptFailure> },

    #[error("routing cancelled by caller")]
    Cancelled,

    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("empty response from model")]
    EmptyResponse,

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("no provider configured")]
    NoProvider,

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl BifrostError {
    /// Shorthand for a [`BifrostError::Validation`].
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether a retry of the same call might succeed.
    ///
    /// Rate limits, 5xx responses, transport failures and timeouts are
    /// transient. Everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Http(_) | Self::AttemptTimeout { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BifrostError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            match status.as_u16() {
                401 | 403 => return BifrostError::AuthenticationFailed,
                429 => return BifrostError::RateLimited { retry_after: None },
                code => {
                    return BifrostError::Api {
                        status: code,
                        message: err.to_string(),
                    };
                }
            }
        }
        BifrostError::Http(err.to_string())
    }
}

/// Result type alias for Bifrost operations
pub type Result<T> = std::result::Result<T, BifrostError>;
