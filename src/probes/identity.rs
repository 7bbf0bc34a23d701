use crate::config::IdentityConfig;
use crate::transport::{ReadMode, TimedRequest, Transport};
use log::{debug, warn};
use std::net::IpAddr;
use std::sync::Arc;

/// Carrier name reported when the host cannot tell.
pub const UNKNOWN_CARRIER: &str = "Unknown";

/// Host hook for the carrier / ISP name of the active network.
pub trait CarrierLookup: Send + Sync {
    /// `None` when the platform has no answer.
    fn carrier_name(&self) -> Option<String>;
}

/// Carrier name supplied up front by the host.
#[derive(Debug, Clone, Default)]
pub struct FixedCarrier(pub Option<String>);

impl CarrierLookup for FixedCarrier {
    fn carrier_name(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Lookup for platforms without carrier information.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnknownCarrier;

impl CarrierLookup for UnknownCarrier {
    fn carrier_name(&self) -> Option<String> {
        None
    }
}

/// Resolve the carrier name, degrading to [`UNKNOWN_CARRIER`] when the
/// lookup has nothing or only whitespace.
pub fn carrier_name(lookup: &dyn CarrierLookup) -> String {
    match lookup.carrier_name() {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => UNKNOWN_CARRIER.to_string(),
    }
}

/// Public IP of this device, as seen by an echo endpoint.
pub struct IdentityLookup {
    transport: Arc<dyn Transport>,
    config: IdentityConfig,
}

impl IdentityLookup {
    pub fn new(transport: Arc<dyn Transport>, config: IdentityConfig) -> Self {
        Self { transport, config }
    }

    /// One GET, no retry. Returns an empty string on any failure,
    /// including a body that is not an IP address.
    pub async fn public_ip(&self) -> String {
        let request = TimedRequest::get(
            self.config.url.clone(),
            self.config.timeout,
            ReadMode::Text,
        );

        let text = match self.transport.execute(request).await {
            Ok(timed) => timed.text.unwrap_or_default(),
            Err(e) => {
                warn!("Public IP lookup failed: {}", e);
                return String::new();
            }
        };

        match parse_ip(&text) {
            Some(ip) => {
                debug!("Public IP: {}", ip);
                ip
            }
            None => {
                warn!("Public IP lookup returned a malformed body: {:?}", text);
                String::new()
            }
        }
    }
}

/// First line of `body`, trimmed, if it is an IPv4 or IPv6 address.
fn parse_ip(body: &str) -> Option<String> {
    let candidate = body.lines().next()?.trim();

    candidate.parse::<IpAddr>().ok().map(|_| candidate.to_string())
}
