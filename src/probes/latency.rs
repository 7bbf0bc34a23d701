use crate::config::LatencyConfig;
use crate::measurements::LatencyResult;
use crate::transport::{ReadMode, Sample, TimedRequest, Transport};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::time::sleep;

/// Round-trip latency and jitter from a short run of sequential requests.
pub struct LatencyProbe {
    transport: Arc<dyn Transport>,
    config: LatencyConfig,
}

impl LatencyProbe {
    pub fn new(transport: Arc<dyn Transport>, config: LatencyConfig) -> Self {
        Self { transport, config }
    }

    /// Take `config.samples` samples one after the other, pausing
    /// `config.spacing` between them so the target does not throttle or
    /// coalesce them.
    ///
    /// Never fails: a failed sample is recorded and later replaced by the
    /// penalty value.
    pub async fn run(&self) -> LatencyResult {
        let total = self.config.samples;
        let mut samples = Vec::with_capacity(total);

        for i in 0..total {
            if i > 0 && !self.config.spacing.is_zero() {
                sleep(self.config.spacing).await;
            }

            let request = TimedRequest::get(
                self.config.url.clone(),
                self.config.timeout,
                ReadMode::FirstByte,
            );
            let outcome = self.transport.execute(request).await;

            if let Err(ref e) = outcome {
                warn!("Latency sample {}/{} failed: {}", i + 1, total, e);
            }

            let sample = Sample::from_outcome(&outcome);
            debug!("Latency sample {}/{}: {:?}", i + 1, total, sample);
            samples.push(sample);
        }

        let result = LatencyResult::from_samples(&samples, self.config.penalty);
        info!(
            "Latency: {} ms, jitter: {} ms",
            result.average_ms, result.jitter_ms
        );

        result
    }
}
