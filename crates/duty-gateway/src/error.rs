//! Error types for every stage of the gateway.
//!
//! Each component returns its own error enum so callers can decide whether a
//! failure is fatal (credentials, configuration), iteration-scoped (fetch,
//! mark) or user-visible (duty lookup). `ApiError` converts lookup failures
//! into HTTP responses.

use std::path::PathBuf;
use std::time::Duration;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::provider::MessageSummary;

/// Failure reported by a mail or calendar collaborator.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The remote call itself failed (transport, status, decoding)
    #[error("{operation} failed: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },

    /// The remote call succeeded but the response lacked a required field
    #[error("{operation} response is missing {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },
}

impl ProviderError {
    pub fn request(operation: &'static str, err: impl std::fmt::Display) -> Self {
        ProviderError::Request {
            operation,
            message: err.to_string(),
        }
    }
}

/// Problems with the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Failures while obtaining an authorized transport. All of these are fatal.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Unable to read client secret file {path}: {message}")]
    ClientSecret { path: PathBuf, message: String },

    #[error("Unable to determine credential cache path: {0}")]
    CachePath(String),

    #[error("Unable to read authorization code: {0}")]
    Prompt(String),

    #[error("Unable to exchange authorization code: {0}")]
    Exchange(String),

    #[error("Unable to build authorized client: {0}")]
    Transport(String),
}

/// Failure of a whole fetch cycle. Messages collected before the failure are
/// carried along so the caller can still hand them to workers.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Unable to retrieve messages: {source}")]
    List {
        partial: Vec<MessageSummary>,
        #[source]
        source: ProviderError,
    },

    #[error("Listing messages timed out after {timeout:?}")]
    Timeout {
        partial: Vec<MessageSummary>,
        timeout: Duration,
    },

    #[error("Fetch cancelled")]
    Cancelled { partial: Vec<MessageSummary> },
}

impl FetchError {
    /// Messages successfully fetched before the failure.
    pub fn partial(&self) -> &[MessageSummary] {
        match self {
            FetchError::List { partial, .. }
            | FetchError::Timeout { partial, .. }
            | FetchError::Cancelled { partial } => partial,
        }
    }

    pub fn into_partial(self) -> Vec<MessageSummary> {
        match self {
            FetchError::List { partial, .. }
            | FetchError::Timeout { partial, .. }
            | FetchError::Cancelled { partial } => partial,
        }
    }
}

#[derive(Debug, Error)]
pub enum MarkError {
    #[error("Failed to mark message {id} as read: {source}")]
    Provider {
        id: String,
        #[source]
        source: ProviderError,
    },

    #[error("Marking message {id} as read timed out after {timeout:?}")]
    Timeout { id: String, timeout: Duration },

    #[error("Marking message {id} cancelled")]
    Cancelled { id: String },
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("No events found")]
    NotFound,

    #[error("No on-call identifier found in event description")]
    NoIdentifier,

    #[error("Unable to retrieve event: {0}")]
    Provider(#[from] ProviderError),
}

/// Error returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!("Request failed: {}", self);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str) -> MessageSummary {
        MessageSummary {
            id: id.to_string(),
            date: String::new(),
            subject: String::new(),
        }
    }

    #[test]
    fn test_partial_results_survive_list_failure() {
        let err = FetchError::List {
            partial: vec![summary("a"), summary("b")],
            source: ProviderError::request("messages.list", "503 Service Unavailable"),
        };

        assert_eq!(err.partial().len(), 2);
        assert!(err.to_string().contains("503"));
        let ids: Vec<_> = err.into_partial().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_api_error_is_plain_text_500() {
        let response = ApiError::from(LookupError::NotFound).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }
}
