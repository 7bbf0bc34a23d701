use crate::connectivity::{RawSignal, SignalSource};
use crate::errors::ErrorKind;
use crate::sync::lock;
use crate::transport::{TimedRequest, Transport};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use log::debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

/// Signal source fed by the host.
///
/// Platform network callbacks are forwarded with [`push`](Self::push). Only
/// the most recent subscriber receives them; subscribing again cuts off
/// the previous stream.
#[derive(Debug, Default)]
pub struct ManualSignalSource {
    subscriber: Mutex<Option<mpsc::UnboundedSender<RawSignal>>>,
}

impl ManualSignalSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver one raw signal. Dropped when nobody is subscribed.
    pub fn push(&self, signal: RawSignal) {
        let mut subscriber = lock(&self.subscriber);
        let delivered = subscriber
            .as_ref()
            .map(|tx| tx.send(signal).is_ok())
            .unwrap_or(false);

        if !delivered {
            debug!("No connectivity subscriber, dropping {:?}", signal);
            *subscriber = None;
        }
    }
}

impl SignalSource for ManualSignalSource {
    fn subscribe(&self) -> BoxStream<'static, RawSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.subscriber) = Some(tx);

        stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|signal| (signal, rx))
        })
        .boxed()
    }
}

/// Polls an endpoint with HEAD requests and reports every attempt.
///
/// Any HTTP answer counts as connected, even an error status: the server
/// was reached. Only transport failures report [`RawSignal::Lost`].
#[derive(Clone)]
pub struct ReachabilitySource {
    transport: Arc<dyn Transport>,
    url: Url,
    period: Duration,
    timeout: Duration,
}

impl ReachabilitySource {
    pub fn new(transport: Arc<dyn Transport>, url: Url, period: Duration) -> Self {
        Self { transport, url, period, timeout: Duration::from_secs(5) }
    }

    /// Longest a single check may stall before it counts as lost.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn probe(&self) -> RawSignal {
        let request = TimedRequest::head(self.url.clone(), self.timeout);
        match self.transport.execute(request).await {
            Ok(_) => RawSignal::Available,
            Err(e) if e.kind == ErrorKind::Status => RawSignal::Available,
            Err(e) => {
                debug!("Reachability check against {} failed: {}", self.url, e);
                RawSignal::Lost
            }
        }
    }
}

impl SignalSource for ReachabilitySource {
    fn subscribe(&self) -> BoxStream<'static, RawSignal> {
        let source = self.clone();

        stream::unfold((source, true), |(source, first)| async move {
            if !first {
                tokio::time::sleep(source.period).await;
            }
            let signal = source.probe().await;
            Some((signal, (source, false)))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{Reply, ScriptedTransport, LATENCY_URL};
    use tokio::time::Instant;

    fn reachability(transport: ScriptedTransport) -> (ReachabilitySource, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let source = ReachabilitySource::new(
            transport.clone(),
            Url::parse(LATENCY_URL).unwrap(),
            Duration::from_secs(2),
        );
        (source, transport)
    }

    #[tokio::test]
    async fn test_manual_source_forwards_pushes() {
        let source = ManualSignalSource::new();
        let mut signals = source.subscribe();

        source.push(RawSignal::Lost);
        source.push(RawSignal::Available);

        assert_eq!(signals.next().await, Some(RawSignal::Lost));
        assert_eq!(signals.next().await, Some(RawSignal::Available));
    }

    #[tokio::test]
    async fn test_manual_source_latest_subscriber_wins() {
        let source = ManualSignalSource::new();
        let mut old = source.subscribe();
        let mut new = source.subscribe();

        source.push(RawSignal::Available);

        assert_eq!(new.next().await, Some(RawSignal::Available));
        assert_eq!(old.next().await, None);
    }

    #[test]
    fn test_manual_source_push_without_subscriber() {
        let source = ManualSignalSource::new();
        source.push(RawSignal::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reachability_maps_outcomes() {
        let (source, transport) = reachability(ScriptedTransport::new().script(
            LATENCY_URL,
            vec![
                Reply::ok(0),
                Reply::fail(ErrorKind::Status),
                Reply::fail(ErrorKind::Timeout),
                Reply::fail(ErrorKind::Dns),
                Reply::ok(0),
            ],
        ));

        let signals: Vec<RawSignal> = source.subscribe().take(5).collect().await;

        assert_eq!(
            signals,
            vec![
                RawSignal::Available,
                RawSignal::Available,
                RawSignal::Lost,
                RawSignal::Lost,
                RawSignal::Available
            ]
        );
        assert!(transport
            .calls()
            .iter()
            .all(|(method, _)| *method == http::Method::HEAD));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reachability_polls_on_period() {
        let (source, _transport) =
            reachability(ScriptedTransport::new().script(LATENCY_URL, vec![Reply::ok(0)]));
        let start = Instant::now();

        let signals: Vec<RawSignal> = source.subscribe().take(3).collect().await;

        assert_eq!(signals.len(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reachability_check_stalling_past_timeout_is_lost() {
        let (source, _transport) = reachability(ScriptedTransport::new().script(
            LATENCY_URL,
            vec![Reply::ok(0).after(Duration::from_secs(2))],
        ));
        let source = source.with_timeout(Duration::from_secs(1));

        let signals: Vec<RawSignal> = source.subscribe().take(1).collect().await;

        assert_eq!(signals, vec![RawSignal::Lost]);
    }
}
