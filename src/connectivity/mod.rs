//! Debounced connectivity change detection.
//!
//! A [`SignalSource`] delivers raw platform callbacks, which are redundant
//! and may flap. The [`ConnectivityMonitor`] folds them into a connected /
//! disconnected state and emits [`Event::ConnectivityChanged`] only when that
//! state actually changes.

pub mod sources;

use crate::events::{Event, EventSink};
use crate::sync::lock;
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{debug, info};
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use sources::{ManualSignalSource, ReachabilitySource};

/// Raw callback from the platform network path monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawSignal {
    Available,
    Lost,
}

impl RawSignal {
    pub fn is_connected(self) -> bool {
        matches!(self, RawSignal::Available)
    }
}

/// Anything that can deliver raw connectivity signals.
pub trait SignalSource: Send + Sync {
    /// Subscribe to the signal stream. Dropping the stream unsubscribes.
    fn subscribe(&self) -> BoxStream<'static, RawSignal>;
}

/// Turns raw signals into state transitions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Debouncer {
    last_reported: Option<bool>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new state when `signal` changes it. The first signal
    /// after construction or [`reset`](Self::reset) always does.
    pub fn observe(&mut self, signal: RawSignal) -> Option<bool> {
        let connected = signal.is_connected();
        if self.last_reported == Some(connected) {
            return None;
        }
        self.last_reported = Some(connected);
        Some(connected)
    }

    pub fn reset(&mut self) {
        self.last_reported = None;
    }

    pub fn last_reported(&self) -> Option<bool> {
        self.last_reported
    }
}

/// Shared between the monitor and its listener task. A listener may only
/// emit while `generation` still matches the one it was started with.
#[derive(Debug, Default)]
struct MonitorState {
    generation: u64,
    active: bool,
    debouncer: Debouncer,
}

struct Listener {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Subscribes to a [`SignalSource`] and reports debounced transitions.
pub struct ConnectivityMonitor {
    source: Arc<dyn SignalSource>,
    sink: Arc<dyn EventSink>,
    runtime: Handle,
    state: Arc<Mutex<MonitorState>>,
    listener: Mutex<Option<Listener>>,
}

impl ConnectivityMonitor {
    pub fn new(source: Arc<dyn SignalSource>, sink: Arc<dyn EventSink>, runtime: Handle) -> Self {
        Self {
            source,
            sink,
            runtime,
            state: Arc::new(Mutex::new(MonitorState::default())),
            listener: Mutex::new(None),
        }
    }

    /// Start listening. The first signal received is always reported.
    /// Starting while already listening replaces the subscription.
    pub fn start(&self) {
        let mut listener = lock(&self.listener);
        self.retire(listener.take());

        // Subscribe here rather than in the task so that signals pushed
        // right after `start` returns are not missed.
        let signals = self.source.subscribe();
        let generation = {
            let mut state = lock(&self.state);
            state.active = true;
            state.generation
        };

        let cancel = CancellationToken::new();
        let handle = self.runtime.spawn(listen(
            signals,
            generation,
            self.state.clone(),
            self.sink.clone(),
            cancel.clone(),
        ));

        info!("Connectivity listening started");
        *listener = Some(Listener { cancel, handle });
    }

    /// Stop listening and forget the last reported state. Idempotent,
    /// callable from any thread.
    pub fn stop(&self) {
        let mut listener = lock(&self.listener);
        if listener.is_some() {
            self.retire(listener.take());
            info!("Connectivity listening stopped");
        }
    }

    pub fn is_listening(&self) -> bool {
        lock(&self.listener).is_some()
    }

    /// The state last sent to the sink, `None` before the first report.
    pub fn last_reported(&self) -> Option<bool> {
        lock(&self.state).debouncer.last_reported()
    }

    fn retire(&self, listener: Option<Listener>) {
        {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.active = false;
            state.debouncer.reset();
        }
        if let Some(listener) = listener {
            listener.cancel.cancel();
            listener.handle.abort();
        }
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn listen(
    mut signals: BoxStream<'static, RawSignal>,
    generation: u64,
    state: Arc<Mutex<MonitorState>>,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
) {
    loop {
        let signal = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            signal = signals.next() => match signal {
                Some(signal) => signal,
                None => {
                    debug!("Connectivity signal source closed");
                    break;
                }
            },
        };

        let mut guard = lock(&state);
        if !guard.active || guard.generation != generation {
            break;
        }
        match guard.debouncer.observe(signal) {
            Some(connected) => {
                info!("Connectivity changed: connected={}", connected);
                sink.emit(Event::ConnectivityChanged(connected));
            }
            None => debug!("Suppressed duplicate {:?} signal", signal),
        }
    }
}
