//! Events pushed to the host and the sink interface that receives them.

use crate::snapshot::NetworkSnapshot;
use log::debug;
use serde::Serialize;
use tokio::sync::mpsc;

/// Asynchronous notifications for the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum Event {
    /// A polling cycle completed.
    #[serde(rename = "onNetworkStats")]
    NetworkStats(NetworkSnapshot),
    /// Connectivity changed; `true` means connected.
    #[serde(rename = "onConnectivityChanged")]
    ConnectivityChanged(bool),
}

impl Event {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Event::NetworkStats(_) => "onNetworkStats",
            Event::ConnectivityChanged(_) => "onConnectivityChanged",
        }
    }
}

/// Receiver of [`Event`]s.
///
/// Implementations must be non-blocking: the scheduler and the
/// connectivity monitor call `emit` while holding their emission lock.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Forwards events into a channel, so the host can drain them on whatever
/// thread it delivers callbacks on.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: Event) {
        if let Err(e) = self.tx.send(event) {
            debug!("Dropping {} event, host receiver is gone", e.0.name());
        }
    }
}
