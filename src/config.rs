//! Probe targets, sizes and timeouts.
//!
//! Every value has a reference default; the command line host may
//! override the endpoints.

use crate::errors::ProbeError;
use std::time::Duration;
use url::Url;

pub const DEFAULT_LATENCY_URL: &str = "http://speedtest.tele2.net/1KB.zip";
pub const DEFAULT_DOWNLOAD_URL: &str = "http://speedtest.tele2.net/10MB.zip";
pub const DEFAULT_UPLOAD_URL: &str = "https://nbg1-speed.hetzner.com/upload.php";
pub const DEFAULT_IDENTITY_URL: &str = "https://api.ipify.org";

/// Default polling interval in seconds when the host does not pass one.
pub const DEFAULT_INTERVAL_SECS: u64 = 10;

/// Shortest polling interval accepted; shorter requests are clamped.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Parse one of the built-in endpoint constants.
fn builtin(url: &str) -> Url {
    Url::parse(url).unwrap_or_else(|e| panic!("invalid built-in URL {url}: {e}"))
}

/// Latency probe settings.
#[derive(Debug, Clone)]
pub struct LatencyConfig {
    /// Small, low-latency target.
    pub url: Url,
    /// Number of sequential samples per run.
    /// Default: 4
    pub samples: usize,
    /// Pause between consecutive samples.
    /// Default: 200ms
    pub spacing: Duration,
    /// Longest a single sample may stall waiting on the network.
    /// Default: 5s
    pub timeout: Duration,
    /// Value recorded for a failed sample.
    /// Default: 1000ms
    pub penalty: Duration,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            url: builtin(DEFAULT_LATENCY_URL),
            samples: 4,
            spacing: Duration::from_millis(200),
            timeout: Duration::from_secs(5),
            penalty: Duration::from_millis(1000),
        }
    }
}

/// Download measurement settings.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Fixed-size payload to fetch.
    pub url: Url,
    /// Expected payload size. The bitrate is computed from the bytes
    /// actually received; a mismatch is only logged.
    /// Default: 10_000_000
    pub bytes: u64,
    /// Longest the transfer may stall without receiving anything. A slow
    /// but steady transfer is never cut off by it.
    /// Default: 10s
    pub timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            url: builtin(DEFAULT_DOWNLOAD_URL),
            bytes: 10_000_000,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Upload measurement settings.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub url: Url,
    /// Size of the synthetic payload.
    /// Default: 1_000_000
    pub bytes: u64,
    /// Size of each chunk handed to the connection.
    /// Default: 64 KiB
    pub chunk_size: usize,
    /// Longest the transfer may stall without sending anything.
    /// Default: 8s
    pub timeout: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            url: builtin(DEFAULT_UPLOAD_URL),
            bytes: 1_000_000,
            chunk_size: 64 * 1024,
            timeout: Duration::from_secs(8),
        }
    }
}

/// Public IP echo endpoint.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub url: Url,
    /// Default: 5s
    pub timeout: Duration,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { url: builtin(DEFAULT_IDENTITY_URL), timeout: Duration::from_secs(5) }
    }
}

/// Configuration for the whole engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub latency: LatencyConfig,
    pub download: DownloadConfig,
    pub upload: UploadConfig,
    pub identity: IdentityConfig,
    /// Polling interval used when the host does not specify one.
    /// Default: 10s
    pub default_interval: Duration,
    /// Shortest interval the scheduler accepts; shorter requests are clamped.
    /// Default: 1s
    pub min_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            latency: LatencyConfig::default(),
            download: DownloadConfig::default(),
            upload: UploadConfig::default(),
            identity: IdentityConfig::default(),
            default_interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

impl EngineConfig {
    pub fn with_latency_url(mut self, url: &str) -> Result<Self, ProbeError> {
        self.latency.url = parse_endpoint(url)?;
        Ok(self)
    }

    pub fn with_download_url(mut self, url: &str) -> Result<Self, ProbeError> {
        self.download.url = parse_endpoint(url)?;
        Ok(self)
    }

    pub fn with_upload_url(mut self, url: &str) -> Result<Self, ProbeError> {
        self.upload.url = parse_endpoint(url)?;
        Ok(self)
    }

    pub fn with_identity_url(mut self, url: &str) -> Result<Self, ProbeError> {
        self.identity.url = parse_endpoint(url)?;
        Ok(self)
    }
}

/// Parse and validate an endpoint override. Only http(s) URLs with a host
/// are accepted.
pub fn parse_endpoint(url: &str) -> Result<Url, ProbeError> {
    let parsed = Url::parse(url)?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ProbeError::config(format!(
            "unsupported scheme '{}' in {}",
            parsed.scheme(),
            url
        )));
    }

    if parsed.host_str().is_none() {
        return Err(ProbeError::config(format!("missing host in {}", url)));
    }

    Ok(parsed)
}
