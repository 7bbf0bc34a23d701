use crate::config::{DownloadConfig, UploadConfig};
use crate::measurements::ThroughputResult;
use crate::transport::{ReadMode, TimedRequest, Transport, UploadBody};
use log::{info, warn};
use std::sync::Arc;

/// Byte the synthetic upload payload is filled with.
const UPLOAD_FILL: u8 = 1;

/// One download and one upload transfer, each turned into a bitrate.
pub struct ThroughputProbe {
    transport: Arc<dyn Transport>,
    download: DownloadConfig,
    upload: UploadConfig,
}

impl ThroughputProbe {
    pub fn new(
        transport: Arc<dyn Transport>,
        download: DownloadConfig,
        upload: UploadConfig,
    ) -> Self {
        Self { transport, download, upload }
    }

    /// Fetch the fixed-size payload, discarding the body, and time it.
    ///
    /// Any failure yields [`ThroughputResult::FAILED`].
    pub async fn download(&self) -> ThroughputResult {
        let request = TimedRequest::get(
            self.download.url.clone(),
            self.download.timeout,
            ReadMode::Drain,
        );

        match self.transport.execute(request).await {
            Ok(timed) => {
                if timed.bytes != self.download.bytes {
                    warn!(
                        "Download received {} bytes, expected {}",
                        timed.bytes, self.download.bytes
                    );
                }

                let result = ThroughputResult::from_transfer(timed.bytes, timed.elapsed);
                info!(
                    "Download: {:.2} Mbps ({} bytes in {:?})",
                    result.mbps, timed.bytes, timed.elapsed
                );
                result
            }
            Err(e) => {
                warn!("Download measurement failed: {}", e);
                ThroughputResult::FAILED
            }
        }
    }

    /// Push a synthetic payload and time its transmission.
    ///
    /// Any failure yields [`ThroughputResult::FAILED`].
    pub async fn upload(&self) -> ThroughputResult {
        let body = UploadBody {
            bytes: self.upload.bytes,
            chunk_size: self.upload.chunk_size,
            fill: UPLOAD_FILL,
        };
        let request = TimedRequest::post(self.upload.url.clone(), body, self.upload.timeout);

        match self.transport.execute(request).await {
            Ok(timed) => {
                let result = ThroughputResult::from_transfer(timed.bytes, timed.elapsed);
                info!(
                    "Upload: {:.2} Mbps ({} bytes in {:?})",
                    result.mbps, timed.bytes, timed.elapsed
                );
                result
            }
            Err(e) => {
                warn!("Upload measurement failed: {}", e);
                ThroughputResult::FAILED
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::transport::mock::{
        test_config, Reply, ScriptedTransport, DOWNLOAD_URL, UPLOAD_URL,
    };
    use std::time::Duration;

    fn probe(transport: ScriptedTransport) -> ThroughputProbe {
        let config = test_config();
        ThroughputProbe::new(Arc::new(transport), config.download, config.upload)
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_ten_megabytes_in_one_second() {
        let transport = ScriptedTransport::new().script(
            DOWNLOAD_URL,
            vec![Reply::ok(10_000_000).after(Duration::from_secs(1))],
        );

        assert_eq!(probe(transport).download().await.mbps, 80.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_download_failure_is_zero() {
        let transport = ScriptedTransport::new().script(
            DOWNLOAD_URL,
            vec![Reply::fail(ErrorKind::Timeout).after(Duration::from_secs(10))],
        );

        assert_eq!(probe(transport).download().await, ThroughputResult::FAILED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_instant_download_is_zero() {
        let transport = ScriptedTransport::new()
            .script(DOWNLOAD_URL, vec![Reply::ok(10_000_000)]);

        assert_eq!(probe(transport).download().await, ThroughputResult::FAILED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_one_megabyte() {
        let transport = ScriptedTransport::new().script(
            UPLOAD_URL,
            vec![Reply::ok(1_000_000).after(Duration::from_millis(250))],
        );

        assert_eq!(probe(transport).upload().await.mbps, 32.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_sends_post() {
        let transport = Arc::new(ScriptedTransport::new().script(
            UPLOAD_URL,
            vec![Reply::ok(1_000_000).after(Duration::from_millis(250))],
        ));
        let config = test_config();
        let probe = ThroughputProbe::new(transport.clone(), config.download, config.upload);

        probe.upload().await;

        assert_eq!(
            transport.calls(),
            vec![(http::Method::POST, UPLOAD_URL.to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_failure_is_zero() {
        let transport = ScriptedTransport::new()
            .script(UPLOAD_URL, vec![Reply::fail(ErrorKind::Connect)]);

        assert_eq!(probe(transport).upload().await, ThroughputResult::FAILED);
    }
}
