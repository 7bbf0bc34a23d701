//! Repeating measurement loop.
//!
//! At most one loop runs per scheduler, and a loop never has more than one
//! measurement cycle in flight. Emission is the cancellation boundary:
//! once [`PollingScheduler::stop`] returns, nothing more reaches the sink,
//! even from a cycle that was already running.

use crate::config::DEFAULT_MIN_INTERVAL;
use crate::events::{Event, EventSink};
use crate::probes::StatsAggregator;
use crate::sync::lock;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Lets exactly one party decide whether an emission still happens.
#[derive(Debug)]
struct EmissionGate {
    open: Mutex<bool>,
}

impl EmissionGate {
    fn new() -> Self {
        Self { open: Mutex::new(true) }
    }

    /// Run `emit` if the gate is still open. Closing waits for an
    /// emission in progress.
    fn emit_with(&self, emit: impl FnOnce()) -> bool {
        let open = lock(&self.open);
        if *open {
            emit();
        }
        *open
    }

    fn close(&self) {
        *lock(&self.open) = false;
    }
}

/// Handle on the loop that is currently running.
struct ActiveLoop {
    gate: Arc<EmissionGate>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveLoop {
    /// Close the gate first so that a cycle finishing right now cannot
    /// emit, then cancel and abort the task.
    fn retire(self) {
        self.gate.close();
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// Runs a [`StatsAggregator`] on a fixed interval and emits every
/// snapshot as [`Event::NetworkStats`].
pub struct PollingScheduler {
    aggregator: Arc<StatsAggregator>,
    sink: Arc<dyn EventSink>,
    runtime: Handle,
    min_interval: Duration,
    current: Mutex<Option<ActiveLoop>>,
}

impl PollingScheduler {
    pub fn new(
        aggregator: Arc<StatsAggregator>,
        sink: Arc<dyn EventSink>,
        runtime: Handle,
    ) -> Self {
        Self {
            aggregator,
            sink,
            runtime,
            min_interval: DEFAULT_MIN_INTERVAL,
            current: Mutex::new(None),
        }
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    /// Start polling every `interval`, with the first cycle right away.
    ///
    /// A loop that is already running is retired first; starting never
    /// stacks loops.
    pub fn start(&self, interval: Duration) {
        let interval = if interval < self.min_interval {
            warn!(
                "Polling interval {:?} is below the minimum, using {:?}",
                interval, self.min_interval
            );
            self.min_interval
        } else {
            interval
        };

        let mut current = lock(&self.current);
        if let Some(active) = current.take() {
            info!("Replacing running polling loop");
            active.retire();
        }

        let gate = Arc::new(EmissionGate::new());
        let cancel = CancellationToken::new();
        let handle = self.runtime.spawn(poll_loop(
            self.aggregator.clone(),
            self.sink.clone(),
            interval,
            gate.clone(),
            cancel.clone(),
        ));

        info!("Polling started, interval {:?}", interval);
        *current = Some(ActiveLoop { gate, cancel, handle });
    }

    /// Stop polling. Idempotent, callable from any thread.
    pub fn stop(&self) {
        if let Some(active) = lock(&self.current).take() {
            active.retire();
            info!("Polling stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.current).is_some()
    }

    /// Run one cycle outside the loop and hand the snapshot straight
    /// back.
    pub async fn run_once(&self) -> crate::snapshot::NetworkSnapshot {
        self.aggregator.collect().await
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Measure, emit, wait for the next tick, repeat.
///
/// The first tick fires immediately. A cycle that overruns its interval
/// is followed straight away by the next one, and later ticks are
/// re-based on that moment instead of bursting to catch up.
async fn poll_loop(
    aggregator: Arc<StatsAggregator>,
    sink: Arc<dyn EventSink>,
    interval: Duration,
    gate: Arc<EmissionGate>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let snapshot = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            snapshot = aggregator.collect() => snapshot,
        };

        let emitted = gate.emit_with(|| sink.emit(Event::NetworkStats(snapshot)));
        if !emitted {
            debug!("Polling loop retired during a cycle, snapshot dropped");
            break;
        }
    }

    debug!("Polling loop exited");
}
