use crate::config::EngineConfig;
use crate::probes::identity::{carrier_name, CarrierLookup, IdentityLookup};
use crate::probes::latency::LatencyProbe;
use crate::probes::throughput::ThroughputProbe;
use crate::snapshot::NetworkSnapshot;
use crate::transport::Transport;
use log::{debug, info};
use std::sync::Arc;

/// Runs every probe once and assembles a [`NetworkSnapshot`].
///
/// The probes never fail, they degrade to sentinel values, so one broken
/// endpoint cannot keep the others from being measured or reported.
pub struct StatsAggregator {
    latency: LatencyProbe,
    throughput: ThroughputProbe,
    identity: IdentityLookup,
    carrier: Arc<dyn CarrierLookup>,
}

impl StatsAggregator {
    pub fn new(
        transport: Arc<dyn Transport>,
        carrier: Arc<dyn CarrierLookup>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            latency: LatencyProbe::new(transport.clone(), config.latency.clone()),
            throughput: ThroughputProbe::new(
                transport.clone(),
                config.download.clone(),
                config.upload.clone(),
            ),
            identity: IdentityLookup::new(transport, config.identity.clone()),
            carrier,
        }
    }

    /// Run one complete measurement cycle.
    ///
    /// Latency goes first on an idle link, then download, then upload, so
    /// the transfers do not skew each other or the round trips.
    pub async fn collect(&self) -> NetworkSnapshot {
        debug!("Starting measurement cycle");

        let latency = self.latency.run().await;
        let download = self.throughput.download().await;
        let upload = self.throughput.upload().await;
        let public_ip = self.identity.public_ip().await;
        let isp_name = carrier_name(self.carrier.as_ref());

        let snapshot = NetworkSnapshot::new(latency, download, upload, public_ip, isp_name);
        info!(
            "Measurement cycle complete: down={:.2} Mbps, up={:.2} Mbps, ping={} ms",
            snapshot.download_speed_mbps, snapshot.upload_speed_mbps, snapshot.ping_ms
        );

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::probes::identity::{FixedCarrier, UnknownCarrier};
    use crate::transport::mock::{
        test_config, Reply, ScriptedTransport, DOWNLOAD_URL, IDENTITY_URL,
        LATENCY_URL, UPLOAD_URL,
    };
    use std::time::Duration;

    fn aggregator(
        transport: ScriptedTransport,
        carrier: Arc<dyn CarrierLookup>,
    ) -> StatsAggregator {
        StatsAggregator::new(Arc::new(transport), carrier, &test_config())
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_healthy() {
        let aggregator = aggregator(
            ScriptedTransport::healthy(),
            Arc::new(FixedCarrier(Some("Telia".into()))),
        );

        let snapshot = aggregator.collect().await;

        assert_eq!(
            snapshot,
            NetworkSnapshot {
                download_speed_mbps: 80.0,
                upload_speed_mbps: 16.0,
                ping_ms: 20,
                jitter_ms: 0,
                public_ip: "203.0.113.7".into(),
                isp_name: "Telia".into(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_identity_failure_does_not_affect_throughput() {
        let transport = ScriptedTransport::healthy().script(
            IDENTITY_URL,
            vec![Reply::fail(ErrorKind::Timeout).after(Duration::from_secs(5))],
        );
        let aggregator = aggregator(transport, Arc::new(UnknownCarrier));

        let snapshot = aggregator.collect().await;

        assert_eq!(snapshot.public_ip, "");
        assert_eq!(snapshot.download_speed_mbps, 80.0);
        assert_eq!(snapshot.isp_name, "Unknown");
    }

    #[tokio::test(start_paused = true)]
    async fn test_everything_failing_still_yields_snapshot() {
        let aggregator = aggregator(ScriptedTransport::new(), Arc::new(UnknownCarrier));

        let snapshot = aggregator.collect().await;

        assert_eq!(
            snapshot,
            NetworkSnapshot {
                download_speed_mbps: 0.0,
                upload_speed_mbps: 0.0,
                ping_ms: 1000,
                jitter_ms: 0,
                public_ip: String::new(),
                isp_name: "Unknown".into(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_probe_runs_despite_failures() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .script(LATENCY_URL, vec![Reply::fail(ErrorKind::Dns)])
                .script(DOWNLOAD_URL, vec![Reply::fail(ErrorKind::Status)])
                .script(UPLOAD_URL, vec![Reply::fail(ErrorKind::Connect)]),
        );
        let aggregator = StatsAggregator::new(
            transport.clone(),
            Arc::new(UnknownCarrier),
            &test_config(),
        );

        aggregator.collect().await;

        let urls: Vec<String> = transport.calls().into_iter().map(|(_, url)| url).collect();
        assert_eq!(
            urls,
            vec![
                LATENCY_URL,
                LATENCY_URL,
                LATENCY_URL,
                LATENCY_URL,
                DOWNLOAD_URL,
                UPLOAD_URL,
                IDENTITY_URL
            ]
        );
    }
}
