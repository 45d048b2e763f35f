//! Pipeline error types.

use thiserror::Error;

use crate::builder::BuildError;
use crate::catalog::CatalogError;
use crate::config::SettingsError;
use crate::filter::FilterError;
use crate::prefs::PrefsError;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failures reported by the external query or entity search service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The service could not be reached or dropped the connection.
    #[error("query service unavailable: {0}")]
    Unavailable(String),

    /// No response within the service's deadline.
    #[error("query timed out after {0} seconds")]
    Timeout(u64),

    /// The service understood the request and refused it.
    #[error("query rejected: {message} (code: {code})")]
    Rejected {
        /// Error code from the service.
        code: String,
        /// Error message from the service.
        message: String,
    },

    /// The response could not be read as result rows.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ExecutionError {
    /// Create a rejection from a service error response.
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Transient failures are worth another attempt; rejections are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Any failure of one pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Build(#[from] BuildError),

    /// Upstream failed on every attempt.
    #[error("upstream execution failed after {attempts} attempt(s): {source}")]
    UpstreamExecution {
        attempts: u32,
        #[source]
        source: ExecutionError,
    },

    #[error(transparent)]
    Prefs(#[from] PrefsError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// A required selection (provider, account) is absent.
    #[error("missing selection: {0}")]
    MissingSelection(&'static str),

    #[error("failed to compute cache key: {0}")]
    CacheKey(#[source] serde_json::Error),

    #[error("no entity lookup is configured")]
    NoEntityLookup,

    #[error("no {kind} options for {provider}")]
    UnsupportedOptions { kind: String, provider: String },
}

impl PipelineError {
    /// True when the run failed talking to the service rather than
    /// building its query.
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::UpstreamExecution { .. })
    }
}
