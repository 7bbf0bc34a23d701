use crate::errors::{ErrorKind, ProbeError};
use crate::sync::lock;
use crate::transport::{user_agent, ReadMode, Timed, TimedRequest, Transport, UploadBody};
use futures::future::BoxFuture;
use futures::{stream, FutureExt};
use http::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONNECTION, CONTENT_LENGTH};
use log::debug;
use reqwest::{Body, Client as ReqwestClient, Response};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep_until, timeout, Instant};

/// Bound on establishing a connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(8);

/// Hard cap on a whole request, however steadily it makes progress.
const TRANSFER_CAP: Duration = Duration::from_secs(120);

/// [`Transport`] backed by reqwest.
///
/// Every request goes out on a fresh connection (`Connection: close`, no
/// idle pool), so each sample pays its own connection setup and nothing
/// stays open between measurement cycles.
///
/// [`TimedRequest::timeout`] bounds how long a request may go without
/// progress, not how long it may take: a slow link that keeps moving bytes
/// is measured instead of cut off.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: ReqwestClient,
}

impl HttpTransport {
    pub fn new() -> Result<Self, ProbeError> {
        let client = ReqwestClient::builder()
            .user_agent(user_agent())
            .default_headers(default_headers())
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(ProbeError::from_reqwest)?;

        Ok(HttpTransport { client })
    }

    async fn run(&self, request: TimedRequest) -> Result<Timed, ProbeError> {
        debug!("{} {} (idle timeout {:?})", request.method, request.url, request.timeout);

        match request.body {
            Some(body) => self.upload(&request, body).await,
            None => self.fetch(&request).await,
        }
    }

    async fn fetch(&self, request: &TimedRequest) -> Result<Timed, ProbeError> {
        let idle = request.timeout;
        let start = Instant::now();

        let send = self
            .client
            .request(request.method.clone(), request.url.clone())
            .timeout(TRANSFER_CAP)
            .send();
        let mut response = within(idle, "waiting for response", send).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::status(status));
        }

        match request.read {
            ReadMode::FirstByte => {
                let first = within(idle, "waiting for first byte", response.chunk()).await?;
                let elapsed = start.elapsed();
                let bytes = first.map_or(0, |chunk| chunk.len() as u64);

                if let Err(e) = drain(&mut response, idle).await {
                    debug!("discarding rest of {} failed: {}", request.url, e);
                }

                Ok(Timed { elapsed, bytes, text: None })
            }
            ReadMode::Drain => {
                let bytes = drain(&mut response, idle).await?;

                Ok(Timed { elapsed: start.elapsed(), bytes, text: None })
            }
            ReadMode::Text => {
                let mut body = Vec::new();
                while let Some(chunk) = within(idle, "reading body", response.chunk()).await? {
                    body.extend_from_slice(&chunk);
                }
                let elapsed = start.elapsed();
                let text = String::from_utf8(body).map_err(|e| {
                    ProbeError::new(ErrorKind::Body, format!("{} sent non UTF-8 text", request.url))
                        .with_source(e)
                })?;

                Ok(Timed { elapsed, bytes: text.len() as u64, text: Some(text) })
            }
        }
    }

    /// Time the transmission of `body`.
    ///
    /// The clock stops once the last chunk has been handed to the
    /// connection. The response is read afterwards and any failure there
    /// does not fail the measurement.
    async fn upload(&self, request: &TimedRequest, body: UploadBody) -> Result<Timed, ProbeError> {
        let idle = request.timeout;
        let start = Instant::now();
        let progress = Arc::new(Mutex::new(UploadProgress { last_activity: start, written: None }));

        let send = self
            .client
            .request(request.method.clone(), request.url.clone())
            .timeout(TRANSFER_CAP)
            .header(CONTENT_LENGTH, body.bytes)
            .body(chunked_body(body, progress.clone()))
            .send();

        let mut response = tokio::select! {
            response = send => response.map_err(ProbeError::from_reqwest)?,
            stalled = watch_upload(&progress, idle) => return Err(stalled),
        };

        let Some(written_at) = lock(&progress).written else {
            let status = response.status();
            return Err(ProbeError::new(
                ErrorKind::Body,
                format!("{} answered {} before the upload finished", request.url, status),
            ));
        };
        let elapsed = written_at.duration_since(start);

        if let Err(e) = drain(&mut response, idle).await {
            debug!("upload response from {} not read: {}", request.url, e);
        }

        Ok(Timed { elapsed, bytes: body.bytes, text: None })
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: TimedRequest) -> BoxFuture<'_, Result<Timed, ProbeError>> {
        self.run(request).boxed()
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();

    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    headers.insert(CONNECTION, HeaderValue::from_static("close"));

    headers
}

/// Await one network step, failing if it makes no progress within `idle`.
async fn within<T>(
    idle: Duration,
    step: &str,
    future: impl Future<Output = Result<T, reqwest::Error>>,
) -> Result<T, ProbeError> {
    match timeout(idle, future).await {
        Ok(result) => result.map_err(ProbeError::from_reqwest),
        Err(_) => Err(ProbeError::timeout(format!("no progress for {:?} {}", idle, step))),
    }
}

/// Read and discard the rest of a response body, returning its length.
async fn drain(response: &mut Response, idle: Duration) -> Result<u64, ProbeError> {
    let mut total = 0u64;

    while let Some(chunk) = within(idle, "reading body", response.chunk()).await? {
        total += chunk.len() as u64;
    }

    Ok(total)
}

#[derive(Debug)]
struct UploadProgress {
    /// When the connection last took a chunk.
    last_activity: Instant,
    /// When the final chunk was taken.
    written: Option<Instant>,
}

/// Resolves once the upload has made no progress for `idle`: no chunk
/// taken, or no response since the last one.
async fn watch_upload(progress: &Mutex<UploadProgress>, idle: Duration) -> ProbeError {
    loop {
        let deadline = lock(progress).last_activity + idle;
        if Instant::now() >= deadline {
            return ProbeError::timeout(format!("upload made no progress for {:?}", idle));
        }
        sleep_until(deadline).await;
    }
}

/// Stream `body` in chunks, recording progress as the connection takes
/// them. `written` is set once, when the final chunk is taken.
fn chunked_body(body: UploadBody, progress: Arc<Mutex<UploadProgress>>) -> Body {
    let chunk_size = body.chunk_size.max(1) as u64;

    let chunks = stream::unfold(0u64, move |sent| {
        let progress = progress.clone();
        async move {
            let now = Instant::now();
            let mut progress = lock(&progress);
            progress.last_activity = now;

            let len = chunk_size.min(body.bytes.saturating_sub(sent));
            if sent + len >= body.bytes {
                progress.written.get_or_insert(now);
            }
            if len == 0 {
                return None;
            }

            let chunk = vec![body.fill; len as usize];
            Some((Ok::<_, std::io::Error>(chunk), sent + len))
        }
    });

    Body::wrap_stream(chunks)
}
