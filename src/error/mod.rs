use std::time::Duration;
use thiserror::Error;

use crate::models::provider::Modality;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Provider '{0}' is unavailable")]
    ProviderUnavailable(String),

    #[error("Provider '{0}' is rate limited")]
    RateLimited(String),

    #[error("Provider '{provider}' call failed: {cause}")]
    ProviderCallFailed {
        provider: String,
        #[source]
        cause: ProviderError,
    },

    #[error("No providers available for modality {0}")]
    NoProvidersAvailable(Modality),

    #[error("All providers failed, last error: {last_error}")]
    AllProvidersFailed {
        #[source]
        last_error: Box<Error>,
    },

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Validation error: {0}")]
    Validation(String),

}

impl Error {
    pub fn platform(msg: impl Into<String>) -> Self {
        Error::Platform(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn call_failed(provider: impl Into<String>, cause: ProviderError) -> Self {
        Error::ProviderCallFailed {
            provider: provider.into(),
            cause,
        }
    }

    /// Underlying provider cause for call failures, looking through the aggregate wrapper.
    pub fn provider_cause(&self) -> Option<&ProviderError> {
        match self {
            Error::ProviderCallFailed { cause, .. } => Some(cause),
            Error::AllProvidersFailed { last_error } => last_error.provider_cause(),
            _ => None,
        }
    }
}

/// Failure reported by a single provider adapter.
///
/// Adapters classify their own transport and payload errors so the
/// orchestrator can log something meaningful without ever passing raw
/// provider payloads back to the end user.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("insufficient credit: {0}")]
    InsufficientCredit(String),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        ProviderError::MalformedResponse(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        ProviderError::Network(msg.into())
    }

    /// Classify a non-2xx response by status code and body text.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let lowered = body.to_lowercase();

        if status == 402
            || lowered.contains("insufficient credit")
            || lowered.contains("insufficient_quota")
            || lowered.contains("insufficient balance")
        {
            return ProviderError::InsufficientCredit(body);
        }
        if status == 429 {
            return ProviderError::RateLimited(body);
        }
        ProviderError::Status { status, body }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::MalformedResponse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}
