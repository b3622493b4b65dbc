//! Capability traits the host wires into the controller: the WiFi radio,
//! the DNS redirector used for captive-portal capture, and the event hooks.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Radio operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WifiMode {
    #[default]
    Idle,
    /// Station only: joined (or joining) an existing network.
    Sta,
    /// Access point only.
    Ap,
    /// Access point with the station side active as well.
    ApSta,
}

/// Station connection status as reported by the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectStatus {
    #[default]
    Idle,
    Connected,
    ConnectFailed,
    NoSsidAvailable,
    Disconnected,
}

impl ConnectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectStatus::Idle => "IDLE",
            ConnectStatus::Connected => "CONNECTED",
            ConnectStatus::ConnectFailed => "CONNECT_FAILED",
            ConnectStatus::NoSsidAvailable => "NO_SSID_AVAILABLE",
            ConnectStatus::Disconnected => "DISCONNECTED",
        }
    }
}

impl fmt::Display for ConnectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encryption {
    None,
    Encrypted,
}

/// One access point as the radio reports it, before any post-processing.
#[derive(Debug, Clone, Serialize)]
pub struct RawNetwork {
    pub ssid: String,
    pub bssid: [u8; 6],
    /// dBm, negative; closer to zero is stronger.
    pub rssi: i32,
    pub channel: i32,
    pub encryption: Encryption,
    pub hidden: bool,
}

/// Result of one scan pass.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Done(Vec<RawNetwork>),
    /// A scan is still in flight; treated as zero results by callers.
    Running,
    Failed,
}

impl ScanOutcome {
    pub const SCAN_RUNNING: i32 = -1;
    pub const SCAN_FAILED: i32 = -2;

    /// Bridge for radio stacks that report the network count as a signed
    /// integer with negative sentinel values. Any negative count that is not
    /// a known sentinel is treated as a failure; a negative count must never
    /// reach an allocation.
    pub fn from_code(code: i32, mut fetch: impl FnMut(usize) -> Option<RawNetwork>) -> Self {
        match code {
            Self::SCAN_RUNNING => ScanOutcome::Running,
            c if c < 0 => ScanOutcome::Failed,
            n => {
                let mut list = Vec::with_capacity(n as usize);
                for i in 0..n as usize {
                    if let Some(network) = fetch(i) {
                        list.push(network);
                    }
                }
                ScanOutcome::Done(list)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Credentials {
    pub ssid: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ApStaticIp {
    pub ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StaStaticIp {
    pub ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,
    #[serde(default)]
    pub dns1: Option<Ipv4Addr>,
    #[serde(default)]
    pub dns2: Option<Ipv4Addr>,
}

/// Everything needed to bring up the configuration access point.
#[derive(Debug, Clone)]
pub struct ApSettings {
    pub ssid: String,
    /// `None` starts an open network.
    pub password: Option<String>,
    pub channel: u8,
    pub static_ip: Option<ApStaticIp>,
}

/// The WiFi radio capability the controller drives. Implementations wrap a
/// hardware driver or a system service; [`crate::radios::MockRadio`] is the
/// in-memory one used for tests and local development.
#[async_trait]
pub trait WifiRadio: Send + Sync {
    async fn set_mode(&self, mode: WifiMode) -> Result<()>;

    async fn start_ap(&self, settings: &ApSettings) -> Result<()>;

    /// Begin a station connection. `None` reuses the radio's stored
    /// credentials.
    async fn begin_connect(&self, credentials: Option<&Credentials>) -> Result<()>;

    async fn status(&self) -> ConnectStatus;

    /// Block until the in-flight connect attempt settles, then report the
    /// resulting status.
    async fn wait_for_connect(&self) -> ConnectStatus;

    /// Drop the station association. With `erase_credentials` the stored
    /// credentials are invalidated as well.
    async fn disconnect(&self, erase_credentials: bool) -> Result<()>;

    fn supports_wps(&self) -> bool {
        false
    }

    async fn start_wps(&self) -> Result<()> {
        Ok(())
    }

    async fn scan_networks(&self) -> ScanOutcome;

    async fn apply_sta_static_ip(&self, config: &StaStaticIp) -> Result<()>;

    async fn set_hostname(&self, hostname: &str) -> Result<()>;

    /// SSID of the stored station credentials, empty when none are stored.
    async fn stored_ssid(&self) -> String;

    /// Whether a non-empty passphrase is stored alongside the SSID.
    async fn has_stored_psk(&self) -> bool;

    async fn station_ip(&self) -> Option<Ipv4Addr>;

    async fn station_mac(&self) -> String;

    async fn ap_ip(&self) -> Option<Ipv4Addr>;

    async fn ap_mac(&self) -> String;

    /// Hard device restart, used by the reset handler after credentials have
    /// been invalidated.
    async fn restart_device(&self);
}

/// DNS capture capability: answers every query with the portal's own address
/// so clients open the configuration page.
#[async_trait]
pub trait DnsRedirector: Send + Sync {
    async fn start(&self, redirect_to: Ipv4Addr) -> Result<()>;

    /// Whether the redirector drains its own request queue. When this is
    /// false the portal loop calls [`Self::process_next_request`] each tick.
    fn self_polling(&self) -> bool {
        true
    }

    async fn process_next_request(&self) {}

    async fn stop(&self) -> Result<()>;
}

/// No-op redirector for hosts where DNS capture is handled elsewhere.
#[derive(Debug, Default)]
pub struct NullRedirector;

#[async_trait]
impl DnsRedirector for NullRedirector {
    async fn start(&self, _redirect_to: Ipv4Addr) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Snapshot handed to [`PortalEvents::on_ap_started`].
#[derive(Debug, Clone)]
pub struct ApInfo {
    pub ssid: String,
    pub password: Option<String>,
    pub channel: u8,
    pub ip: Option<Ipv4Addr>,
}

/// Host hooks fired by the controller.
pub trait PortalEvents: Send + Sync {
    /// The configuration access point is up and the portal is serving.
    fn on_ap_started(&self, _ap: &ApInfo) {}

    /// Portal-supplied credentials were accepted (or the portal is exiting
    /// after config with `break_after_config` set).
    fn on_config_saved(&self) {}
}

/// Default no-op event sink.
#[derive(Debug, Default)]
pub struct NullEvents;

impl PortalEvents for NullEvents {}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(i: usize) -> RawNetwork {
        RawNetwork {
            ssid: format!("net-{i}"),
            bssid: [0, 1, 2, 3, 4, i as u8],
            rssi: -60,
            channel: 6,
            encryption: Encryption::Encrypted,
            hidden: false,
        }
    }

    #[test]
    fn scan_outcome_maps_sentinels() {
        assert!(matches!(
            ScanOutcome::from_code(ScanOutcome::SCAN_RUNNING, |_| None),
            ScanOutcome::Running
        ));
        assert!(matches!(
            ScanOutcome::from_code(ScanOutcome::SCAN_FAILED, |_| None),
            ScanOutcome::Failed
        ));
        // Unknown negative counts are failures, never an allocation size.
        assert!(matches!(
            ScanOutcome::from_code(-7, |_| None),
            ScanOutcome::Failed
        ));
    }

    #[test]
    fn scan_outcome_collects_entries() {
        let outcome = ScanOutcome::from_code(3, |i| Some(network(i)));
        match outcome {
            ScanOutcome::Done(list) => {
                assert_eq!(list.len(), 3);
                assert_eq!(list[2].ssid, "net-2");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn scan_outcome_zero_is_empty_done() {
        match ScanOutcome::from_code(0, |_| None) {
            ScanOutcome::Done(list) => assert!(list.is_empty()),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
