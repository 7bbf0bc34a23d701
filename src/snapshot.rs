//! The record handed to the host after every measurement cycle.

use crate::measurements::{LatencyResult, ThroughputResult};
use serde::{Deserialize, Serialize};

/// One complete measurement cycle.
///
/// Field names on the wire (`downloadSpeed`, `uploadSpeed`, `ping`,
/// `jitter`, `ip`, `isp`) are what hosts read and must not change.
/// Failed sub-measurements show up as `0.0`, `0`, `""` or `"Unknown"`;
/// a snapshot is never partially built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    /// Download throughput in Mbps
    #[serde(rename = "downloadSpeed")]
    pub download_speed_mbps: f64,
    /// Upload throughput in Mbps
    #[serde(rename = "uploadSpeed")]
    pub upload_speed_mbps: f64,
    /// Average round trip in milliseconds
    #[serde(rename = "ping")]
    pub ping_ms: u64,
    /// Mean difference between consecutive round trips in milliseconds
    #[serde(rename = "jitter")]
    pub jitter_ms: u64,
    /// Public IP, empty when the lookup failed
    #[serde(rename = "ip")]
    pub public_ip: String,
    /// Carrier / ISP name
    #[serde(rename = "isp")]
    pub isp_name: String,
}

impl NetworkSnapshot {
    pub fn new(
        latency: LatencyResult,
        download: ThroughputResult,
        upload: ThroughputResult,
        public_ip: String,
        isp_name: String,
    ) -> Self {
        Self {
            download_speed_mbps: download.mbps,
            upload_speed_mbps: upload.mbps,
            ping_ms: latency.average_ms,
            jitter_ms: latency.jitter_ms,
            public_ip,
            isp_name,
        }
    }
}
