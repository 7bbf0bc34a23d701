//! Scripted transport for unit tests.

use crate::config::EngineConfig;
use crate::errors::{ErrorKind, ProbeError};
use crate::transport::{Timed, TimedRequest, Transport};
use futures::future::BoxFuture;
use futures::FutureExt;
use http::Method;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub(crate) const LATENCY_URL: &str = "http://probe.test/latency";
pub(crate) const DOWNLOAD_URL: &str = "http://probe.test/download";
pub(crate) const UPLOAD_URL: &str = "http://probe.test/upload";
pub(crate) const IDENTITY_URL: &str = "http://probe.test/ip";

/// Engine config pointing at the scripted endpoints, with no pause between
/// latency samples.
pub(crate) fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default()
        .with_latency_url(LATENCY_URL)
        .unwrap()
        .with_download_url(DOWNLOAD_URL)
        .unwrap()
        .with_upload_url(UPLOAD_URL)
        .unwrap()
        .with_identity_url(IDENTITY_URL)
        .unwrap();
    config.latency.spacing = Duration::ZERO;
    config
}

/// One scripted answer.
#[derive(Debug, Clone)]
pub(crate) struct Reply {
    delay: Duration,
    result: Result<(u64, Option<String>), ErrorKind>,
}

impl Reply {
    pub(crate) fn ok(bytes: u64) -> Self {
        Self { delay: Duration::ZERO, result: Ok((bytes, None)) }
    }

    pub(crate) fn text(body: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok((body.len() as u64, Some(body.to_string()))),
        }
    }

    pub(crate) fn fail(kind: ErrorKind) -> Self {
        Self { delay: Duration::ZERO, result: Err(kind) }
    }

    /// Take `delay` of (tokio) time before answering.
    pub(crate) fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Answers requests from per-URL scripts. The last reply of a script
/// repeats; unknown URLs fail to connect. A reply slower than the request
/// timeout counts as a stall and times out.
#[derive(Debug, Default)]
pub(crate) struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(Method, String)>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(self, url: &str, replies: Vec<Reply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), replies.into_iter().collect());
        self
    }

    /// Every endpoint succeeds: 20ms pings, 10 MB down in 1s, 1 MB up in
    /// 500ms.
    pub(crate) fn healthy() -> Self {
        Self::new()
            .script(LATENCY_URL, vec![Reply::ok(1).after(Duration::from_millis(20))])
            .script(
                DOWNLOAD_URL,
                vec![Reply::ok(10_000_000).after(Duration::from_secs(1))],
            )
            .script(
                UPLOAD_URL,
                vec![Reply::ok(1_000_000).after(Duration::from_millis(500))],
            )
            .script(IDENTITY_URL, vec![Reply::text("203.0.113.7\n")])
    }

    pub(crate) fn calls(&self) -> Vec<(Method, String)> {
        self.calls.lock().unwrap().clone()
    }

    fn next_reply(&self, url: &str) -> Reply {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Reply::fail(ErrorKind::Connect),
        }
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: TimedRequest) -> BoxFuture<'_, Result<Timed, ProbeError>> {
        let url = request.url.as_str().to_string();
        let timeout = request.timeout;
        self.calls.lock().unwrap().push((request.method.clone(), url.clone()));
        let reply = self.next_reply(&url);

        async move {
            let start = Instant::now();
            if reply.delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(ProbeError::timeout(format!("{} stalled for {:?}", url, timeout)));
            }
            tokio::time::sleep(reply.delay).await;

            match reply.result {
                Ok((bytes, text)) => {
                    Ok(Timed { elapsed: start.elapsed(), bytes, text })
                }
                Err(kind) => {
                    Err(ProbeError::new(kind, format!("scripted failure for {}", url)))
                }
            }
        }
        .boxed()
    }
}
