//! Structured errors for API calls.

use std::fmt;

/// Error categories for API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Network unreachable, DNS failure, malformed URL, connection reset
    Transport,
    /// Connection timeout or request timeout
    Timeout,
    /// Request could not be built (bad header, unserializable body)
    InvalidRequest,
    /// Failed to parse a response body
    Parse,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchErrorKind::Transport => write!(f, "transport"),
            FetchErrorKind::Timeout => write!(f, "timeout"),
            FetchErrorKind::InvalidRequest => write!(f, "invalid_request"),
            FetchErrorKind::Parse => write!(f, "parse"),
        }
    }
}

/// Structured error from an API call with kind and details.
#[derive(Debug, Clone)]
pub struct FetchError {
    /// Error category
    pub kind: FetchErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., the underlying error chain)
    pub details: Option<String>,
}

impl FetchError {
    /// Creates a new fetch error.
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Attaches details to the error.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Creates an invalid-request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::InvalidRequest, message)
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Parse, message)
    }

    /// Returns true for timeouts and transport failures.
    pub fn is_network(&self) -> bool {
        matches!(
            self.kind,
            FetchErrorKind::Transport | FetchErrorKind::Timeout
        )
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        // Malformed URLs surface here as builder errors and count as transport failures.
        let kind = if err.is_timeout() {
            FetchErrorKind::Timeout
        } else {
            FetchErrorKind::Transport
        };
        let message = match err.url() {
            Some(url) => format!("Request to {url} failed"),
            None => "Request failed".to_string(),
        };
        Self::new(kind, message).with_details(err.to_string())
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(details) = &self.details {
            write!(f, ": {details}")?;
        }
        Ok(())
    }
}

impl std::error::Error for FetchError {}

/// Result type for API calls.
pub type FetchResult<T> = std::result::Result<T, FetchError>;
