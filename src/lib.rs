//! Live network quality measurement.
//!
//! Probes estimate latency, jitter, throughput and public identity over an
//! injected [`transport::Transport`]. A [`scheduler::PollingScheduler`]
//! repeats them on an interval, a [`connectivity::ConnectivityMonitor`]
//! reports debounced connectivity transitions, and [`bridge::NetworkPlugin`]
//! exposes both to a host.

pub mod bridge;
pub mod config;
pub mod connectivity;
pub mod errors;
pub mod events;
pub mod measurements;
pub mod probes;
pub mod scheduler;
pub mod snapshot;
pub mod stats;
mod sync;
pub mod transport;
