//! Measurement probes and their composition into a snapshot.

pub mod aggregator;
pub mod identity;
pub mod latency;
pub mod throughput;

pub use aggregator::StatsAggregator;
pub use identity::{CarrierLookup, FixedCarrier, IdentityLookup, UnknownCarrier};
pub use latency::LatencyProbe;
pub use throughput::ThroughputProbe;
