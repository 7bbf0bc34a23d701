//! Error types for the measurement engine.
//!
//! Network failures never leave a probe: every probe turns a
//! [`ProbeError`] into its own sentinel value. The types here exist so
//! that the failure can be classified and logged on the way.

use std::error::Error;
use std::fmt;

/// Exit codes for the command line host.
pub mod exit_codes {
    /// Successful execution.
    pub const SUCCESS: i32 = 0;
    /// Runtime failure in the host itself (I/O on stdin/stdout, signals).
    pub const RUNTIME_ERROR: i32 = 1;
    /// Configuration error (invalid endpoint override, bad arguments).
    pub const CONFIG_ERROR: i32 = 3;
}

/// Categories of errors a timed network operation can end with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// DNS resolution failures.
    Dns,
    /// Connection refused, reset or unreachable.
    Connect,
    /// The operation did not finish within its timeout.
    Timeout,
    /// The server answered with a non-success status.
    Status,
    /// Reading or writing a body failed midway.
    Body,
    /// Malformed target URL or other invalid configuration.
    Config,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    /// Get a user-friendly description of this error kind.
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::Dns => "DNS resolution error",
            ErrorKind::Connect => "Connection error",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Status => "Unexpected response status",
            ErrorKind::Body => "Body transfer error",
            ErrorKind::Config => "Configuration error",
            ErrorKind::Unknown => "Unknown error",
        }
    }

    /// Whether this is a transient network failure that callers recover
    /// from locally with a sentinel value.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ErrorKind::Config)
    }
}

/// Error produced by a single timed network operation.
#[derive(Debug)]
pub struct ProbeError {
    /// The kind of error.
    pub kind: ErrorKind,
    /// Human readable message.
    pub message: String,
    /// The underlying error, if any.
    pub source: Option<Box<dyn Error + Send + Sync>>,
}

impl ProbeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), source: None }
    }

    /// Add the underlying error source.
    pub fn with_source(mut self, source: impl Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn status(status: http::StatusCode) -> Self {
        Self::new(ErrorKind::Status, format!("server responded {}", status))
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    /// Classify a reqwest error.
    ///
    /// reqwest does not expose DNS failures as their own category, so those
    /// are recognised from the connect error's message.
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            ErrorKind::Timeout
        } else if error.is_status() {
            ErrorKind::Status
        } else if error.is_builder() {
            ErrorKind::Config
        } else if error.is_connect() {
            match classify_error(&error) {
                ErrorKind::Dns => ErrorKind::Dns,
                _ => ErrorKind::Connect,
            }
        } else if error.is_body() || error.is_decode() {
            ErrorKind::Body
        } else {
            classify_error(&error)
        };

        Self::new(kind, error.to_string()).with_source(error)
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.description(), self.message)
    }
}

impl Error for ProbeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}

impl From<url::ParseError> for ProbeError {
    fn from(error: url::ParseError) -> Self {
        ProbeError::config(format!("invalid URL: {}", error)).with_source(error)
    }
}

/// Errors surfaced to the host bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The host asked for a method this engine does not know.
    NotImplemented(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::NotImplemented(method) => {
                write!(f, "method not implemented: {}", method)
            }
        }
    }
}

impl Error for BridgeError {}

/// Classify an error into an ErrorKind based on its message.
///
/// Walks the source chain, since hyper and the resolver bury the
/// interesting part a few levels down.
pub fn classify_error(error: &dyn Error) -> ErrorKind {
    let mut messages = vec![error.to_string().to_lowercase()];
    let mut source = error.source();
    while let Some(inner) = source {
        messages.push(inner.to_string().to_lowercase());
        source = inner.source();
    }
    let error_str = messages.join(" | ");

    if error_str.contains("dns")
        || error_str.contains("resolve")
        || error_str.contains("no such host")
        || error_str.contains("name or service not known")
    {
        return ErrorKind::Dns;
    }

    if error_str.contains("timeout")
        || error_str.contains("timed out")
        || error_str.contains("deadline")
    {
        return ErrorKind::Timeout;
    }

    if error_str.contains("connection refused")
        || error_str.contains("connection reset")
        || error_str.contains("network unreachable")
        || error_str.contains("host unreachable")
        || error_str.contains("no route")
        || error_str.contains("broken pipe")
    {
        return ErrorKind::Connect;
    }

    if error_str.contains("status: 4") || error_str.contains("status: 5") {
        return ErrorKind::Status;
    }

    ErrorKind::Unknown
}
