use crate::errors::ProbeError;
use futures::future::BoxFuture;
use http::Method;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub mod client;
#[cfg(test)]
pub(crate) mod mock;

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User agent sent with every probe request.
pub(crate) fn user_agent() -> String {
    format!("{}/{}", NAME, VERSION)
}

/// How much of the response body a request reads, and where its timing
/// stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Stop timing at the first body byte, then discard the rest.
    FirstByte,
    /// Time the whole body while counting and discarding it.
    Drain,
    /// Time the whole body and return it as text.
    Text,
}

/// Synthetic request body, generated in chunks while it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadBody {
    pub bytes: u64,
    pub chunk_size: usize,
    pub fill: u8,
}

/// One timed network operation to perform.
#[derive(Debug, Clone)]
pub struct TimedRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<UploadBody>,
    /// Longest the operation may go without progress before it fails with
    /// [`ErrorKind::Timeout`](crate::errors::ErrorKind::Timeout).
    pub timeout: Duration,
    pub read: ReadMode,
}

impl TimedRequest {
    pub fn get(url: Url, timeout: Duration, read: ReadMode) -> Self {
        Self { method: Method::GET, url, body: None, timeout, read }
    }

    pub fn head(url: Url, timeout: Duration) -> Self {
        Self {
            method: Method::HEAD,
            url,
            body: None,
            timeout,
            read: ReadMode::Drain,
        }
    }

    /// A POST whose timing covers writing `body` only.
    pub fn post(url: Url, body: UploadBody, timeout: Duration) -> Self {
        Self {
            method: Method::POST,
            url,
            body: Some(body),
            timeout,
            read: ReadMode::Drain,
        }
    }
}

/// Outcome of a successful timed operation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Timed {
    /// Wall-clock time covered by the measurement.
    pub elapsed: Duration,
    /// Bytes transferred inside the timed window (sent for uploads,
    /// received otherwise).
    pub bytes: u64,
    /// Response body, for [`ReadMode::Text`] requests.
    pub text: Option<String>,
}

/// A single latency sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub duration_ms: u64,
    pub succeeded: bool,
}

impl Sample {
    pub fn from_outcome(outcome: &Result<Timed, ProbeError>) -> Self {
        match outcome {
            Ok(timed) => Sample {
                duration_ms: timed.elapsed.as_millis() as u64,
                succeeded: true,
            },
            Err(_) => Sample { duration_ms: 0, succeeded: false },
        }
    }
}

/// Capability to run a timed HTTP operation.
///
/// Implementations must not panic on network failures: every failure,
/// including a timeout, comes back as a [`ProbeError`].
pub trait Transport: Send + Sync {
    fn execute(&self, request: TimedRequest) -> BoxFuture<'_, Result<Timed, ProbeError>>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn execute(&self, request: TimedRequest) -> BoxFuture<'_, Result<Timed, ProbeError>> {
        (**self).execute(request)
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(&self, request: TimedRequest) -> BoxFuture<'_, Result<Timed, ProbeError>> {
        (**self).execute(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_from_success() {
        let outcome = Ok(Timed {
            elapsed: Duration::from_micros(42_700),
            bytes: 1,
            text: None,
        });
        assert_eq!(
            Sample::from_outcome(&outcome),
            Sample { duration_ms: 42, succeeded: true }
        );
    }

    #[test]
    fn test_sample_from_failure() {
        let outcome = Err(ProbeError::timeout("sample"));
        assert!(!Sample::from_outcome(&outcome).succeeded);
    }

    #[test]
    fn test_post_request_carries_body() {
        let url = Url::parse("https://example.com/upload").unwrap();
        let body = UploadBody { bytes: 1_000_000, chunk_size: 65_536, fill: 1 };
        let request = TimedRequest::post(url, body, Duration::from_secs(8));
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.body, Some(body));
    }

    #[test]
    fn test_user_agent() {
        assert!(user_agent().starts_with("realtime-network/"));
    }
}
