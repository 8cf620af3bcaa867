//! Fault and error types for the chat pipeline.
//!
//! [`StreamFault`] is the raw description of what went wrong inside one
//! attempt. It decides the retry policy and is logged verbatim.
//! [`ApiError`] is what leaves the crate: a category plus a fixed,
//! user-readable message. Raw provider bodies never end up in an `ApiError`.

use std::error::Error;
use std::fmt;

use crate::core::providers::ProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// The overall request deadline elapsed.
    Request,
    /// No valid delta arrived within the stall window.
    Stall,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFault {
    /// The provider requires an API key and none is configured.
    MissingApiKey,
    /// The provider rejected the credentials (401/403 or an auth error frame).
    Auth(String),
    /// Connection, DNS, TLS, proxy or body-read failure.
    Network(String),
    Timeout(TimeoutKind),
    /// The stream ended without any non-blank text.
    EmptyResponse,
    /// A frame that could not be decoded. Recovered locally by the decoders;
    /// only surfaces from a non-streaming body.
    Parse(String),
    /// Non-2xx status other than the auth statuses.
    ProviderHttp { status: u16, body: String },
    /// The provider reported an error inside the stream.
    Provider(String),
    /// The HTTP client or request could not be built.
    Setup(String),
}

impl StreamFault {
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            StreamFault::Timeout(TimeoutKind::Request)
        } else if err.is_builder() {
            StreamFault::Setup(err.to_string())
        } else if err.is_decode() {
            StreamFault::Parse(err.to_string())
        } else {
            StreamFault::Network(describe_reqwest_error(err))
        }
    }

    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => StreamFault::Auth(body),
            _ => StreamFault::ProviderHttp { status, body },
        }
    }

    /// Faults worth another attempt after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StreamFault::Network(_) | StreamFault::Timeout(_) | StreamFault::EmptyResponse
        )
    }

    /// Faults that may be caused by the transport itself, and so may succeed
    /// through a fallback transport.
    pub fn is_network(&self) -> bool {
        matches!(self, StreamFault::Network(_))
    }
}

fn describe_reqwest_error(err: &reqwest::Error) -> String {
    let mut description = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        description.push_str(": ");
        description.push_str(&inner.to_string());
        source = inner.source();
    }
    description
}

impl fmt::Display for StreamFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamFault::MissingApiKey => write!(f, "API key is not set"),
            StreamFault::Auth(body) => write!(f, "authentication failed: {body}"),
            StreamFault::Network(detail) => write!(f, "network failure: {detail}"),
            StreamFault::Timeout(TimeoutKind::Request) => write!(f, "request timeout"),
            StreamFault::Timeout(TimeoutKind::Stall) => write!(f, "data timeout"),
            StreamFault::EmptyResponse => write!(f, "empty response"),
            StreamFault::Parse(detail) => write!(f, "malformed response: {detail}"),
            StreamFault::ProviderHttp { status, body } => {
                write!(f, "HTTP {status}: {body}")
            }
            StreamFault::Provider(message) => write!(f, "provider error: {message}"),
            StreamFault::Setup(detail) => write!(f, "client setup failed: {detail}"),
        }
    }
}

impl Error for StreamFault {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingApiKey,
    Auth,
    Timeout,
    Network,
    EmptyResponse,
    NotFound,
    RateLimited,
    ProviderUnavailable,
    BadRequest,
    Other,
}

impl ErrorKind {
    /// Categorize a free-form fault description by the phrases providers and
    /// HTTP stacks use.
    pub fn from_description(description: &str) -> Self {
        let lower = description.to_ascii_lowercase();

        let auth_signals = [
            "api key",
            "api_key",
            "apikey",
            "unauthorized",
            "authentication",
            "invalid token",
        ];
        if auth_signals.iter().any(|signal| lower.contains(signal)) {
            return ErrorKind::Auth;
        }
        if lower.contains("timeout") || lower.contains("timed out") {
            return ErrorKind::Timeout;
        }
        if lower.contains("failed to fetch")
            || lower.contains("network")
            || lower.contains("connection")
        {
            return ErrorKind::Network;
        }
        if lower.contains("empty response") {
            return ErrorKind::EmptyResponse;
        }
        if lower.contains("rate limit") {
            return ErrorKind::RateLimited;
        }
        ErrorKind::Other
    }

    fn for_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => ErrorKind::Auth,
            404 => ErrorKind::NotFound,
            408 => ErrorKind::Timeout,
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::ProviderUnavailable,
            400..=499 => match ErrorKind::from_description(body) {
                ErrorKind::Other => ErrorKind::BadRequest,
                kind => kind,
            },
            _ => ErrorKind::Other,
        }
    }
}

/// A user-facing failure of a provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Translate a raw fault. Local providers get hints about the local
    /// service instead of API keys and proxies.
    pub fn from_fault(fault: &StreamFault, provider: ProviderKind) -> Self {
        let kind = match fault {
            StreamFault::MissingApiKey => ErrorKind::MissingApiKey,
            StreamFault::Auth(_) => ErrorKind::Auth,
            StreamFault::Network(_) => ErrorKind::Network,
            StreamFault::Timeout(_) => ErrorKind::Timeout,
            StreamFault::EmptyResponse => ErrorKind::EmptyResponse,
            StreamFault::ProviderHttp { status, body } => ErrorKind::for_status(*status, body),
            StreamFault::Provider(message) => ErrorKind::from_description(message),
            StreamFault::Parse(_) | StreamFault::Setup(_) => ErrorKind::Other,
        };
        Self::new(kind, user_message(kind, provider.is_local()))
    }

    /// Wrap a model-listing failure; the message names the listing operation.
    pub fn model_listing(fault: &StreamFault, provider: ProviderKind) -> Self {
        let translated = Self::from_fault(fault, provider);
        let detail = match fault {
            StreamFault::ProviderHttp { status, .. } => {
                format!("{} (HTTP {status})", translated.message)
            }
            _ => translated.message,
        };
        Self::new(
            translated.kind,
            format!("Failed to fetch model list: {detail}"),
        )
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

fn user_message(kind: ErrorKind, local: bool) -> &'static str {
    match (kind, local) {
        (ErrorKind::MissingApiKey, _) => {
            "API key is not set. Add an API key in the provider settings"
        }
        (ErrorKind::Auth, _) => "API key is invalid or expired. Update the API configuration",
        (ErrorKind::Timeout, true) => {
            "Request timed out. Check that the Ollama service is running"
        }
        (ErrorKind::Timeout, false) => {
            "Request timed out. Check your network connection and retry"
        }
        (ErrorKind::Network, true) => {
            "Network request failed. Check that the Ollama service is running"
        }
        (ErrorKind::Network, false) => {
            "Network request failed. Check your network connection or proxy settings"
        }
        (ErrorKind::EmptyResponse, _) => "No response data was received. Please retry",
        (ErrorKind::NotFound, _) => "The API endpoint or model was not found. Check the API URL",
        (ErrorKind::RateLimited, _) => "The provider is rate limiting requests. Wait and retry",
        (ErrorKind::ProviderUnavailable, _) => {
            "The provider is currently unavailable. Try again later"
        }
        (ErrorKind::BadRequest, _) => "The provider rejected the request. Check the model settings",
        (ErrorKind::Other, _) => "Request failed. Please try again later",
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ApiError {}
