//! In-memory radio. Joins resolve instantly against a configured list of
//! networks and passphrases, which keeps the portal loops deterministic
//! under `tokio::time::pause`.

use crate::Result;
use crate::traits::{
    ApSettings, ConnectStatus, Credentials, Encryption, RawNetwork, ScanOutcome, StaStaticIp,
    WifiMode, WifiRadio,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const AP_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);
const DHCP_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 23);

#[derive(Debug, Default)]
struct Inner {
    mode: WifiMode,
    hostname: String,
    networks: Vec<RawNetwork>,
    /// Passphrase required per SSID; an SSID with no entry is open.
    passwords: HashMap<String, String>,
    stored: Option<Credentials>,
    status: ConnectStatus,
    fail_next_scan: bool,
    fail_next_connect: bool,
    connect_attempts: u32,
    wps_attempts: u32,
    /// SSID a WPS push-button exchange would join, when WPS is enabled.
    wps_target: Option<String>,
    sta_static: Option<StaStaticIp>,
    ap: Option<ApSettings>,
    restarted: bool,
}

#[derive(Debug, Default)]
pub struct MockRadio {
    inner: Mutex<Inner>,
}

impl MockRadio {
    pub fn new() -> Self {
        Self::default()
    }

    fn locked(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a joinable network. `password: None` makes it open.
    pub fn add_network(&self, ssid: &str, rssi: i32, password: Option<&str>) {
        let mut inner = self.locked();
        let index = inner.networks.len() as u8;
        inner.networks.push(RawNetwork {
            ssid: ssid.to_string(),
            bssid: [0x02, 0, 0, 0, 0, index],
            rssi,
            channel: 6,
            encryption: if password.is_some() {
                Encryption::Encrypted
            } else {
                Encryption::None
            },
            hidden: false,
        });
        if let Some(p) = password {
            inner.passwords.insert(ssid.to_string(), p.to_string());
        }
    }

    pub fn with_network(self, ssid: &str, rssi: i32, password: Option<&str>) -> Self {
        self.add_network(ssid, rssi, password);
        self
    }

    /// Seed stored station credentials, as if provisioned on a prior boot.
    pub fn with_stored(self, ssid: &str, password: &str) -> Self {
        self.locked().stored = Some(Credentials {
            ssid: ssid.to_string(),
            password: password.to_string(),
        });
        self
    }

    /// Make the next scan pass fail.
    pub fn fail_next_scan(&self) {
        self.locked().fail_next_scan = true;
    }

    /// Make the next connect call report a hard radio fault.
    pub fn fail_next_connect(&self) {
        self.locked().fail_next_connect = true;
    }

    /// Enable WPS; a push-button exchange joins `ssid` if it is in range.
    pub fn with_wps_target(self, ssid: &str) -> Self {
        self.locked().wps_target = Some(ssid.to_string());
        self
    }

    pub fn connect_attempts(&self) -> u32 {
        self.locked().connect_attempts
    }

    pub fn wps_attempts(&self) -> u32 {
        self.locked().wps_attempts
    }

    pub fn restarted(&self) -> bool {
        self.locked().restarted
    }

    pub fn mode(&self) -> WifiMode {
        self.locked().mode
    }

    pub fn hostname(&self) -> String {
        self.locked().hostname.clone()
    }

    pub fn sta_static(&self) -> Option<StaStaticIp> {
        self.locked().sta_static
    }

    pub fn ap_settings(&self) -> Option<ApSettings> {
        self.locked().ap.clone()
    }

    /// A join succeeds when the SSID is in range and the passphrase matches
    /// (or the network is open).
    fn try_join(inner: &mut Inner) {
        inner.connect_attempts += 1;
        let Some(creds) = inner.stored.clone() else {
            inner.status = ConnectStatus::NoSsidAvailable;
            return;
        };
        let in_range = inner.networks.iter().any(|n| n.ssid == creds.ssid);
        if !in_range {
            inner.status = ConnectStatus::NoSsidAvailable;
            return;
        }
        let accepted = match inner.passwords.get(&creds.ssid) {
            Some(required) => *required == creds.password,
            None => true,
        };
        inner.status = if accepted {
            ConnectStatus::Connected
        } else {
            ConnectStatus::ConnectFailed
        };
        debug!(ssid = %creds.ssid, status = %inner.status, "mock join");
    }
}

#[async_trait]
impl WifiRadio for MockRadio {
    async fn set_mode(&self, mode: WifiMode) -> Result<()> {
        let mut inner = self.locked();
        inner.mode = mode;
        if matches!(mode, WifiMode::Sta | WifiMode::Idle) {
            inner.ap = None;
        }
        Ok(())
    }

    async fn start_ap(&self, settings: &ApSettings) -> Result<()> {
        self.locked().ap = Some(settings.clone());
        Ok(())
    }

    async fn begin_connect(&self, credentials: Option<&Credentials>) -> Result<()> {
        let mut inner = self.locked();
        if std::mem::take(&mut inner.fail_next_connect) {
            return Err(crate::Error::Radio("simulated radio fault".to_string()));
        }
        if let Some(creds) = credentials {
            inner.stored = Some(creds.clone());
        }
        Self::try_join(&mut inner);
        Ok(())
    }

    async fn status(&self) -> ConnectStatus {
        self.locked().status
    }

    async fn wait_for_connect(&self) -> ConnectStatus {
        // Joins settle synchronously in begin_connect.
        self.locked().status
    }

    async fn disconnect(&self, erase_credentials: bool) -> Result<()> {
        let mut inner = self.locked();
        if inner.status == ConnectStatus::Connected {
            inner.status = ConnectStatus::Disconnected;
        }
        if erase_credentials {
            inner.stored = None;
        }
        Ok(())
    }

    fn supports_wps(&self) -> bool {
        self.locked().wps_target.is_some()
    }

    async fn start_wps(&self) -> Result<()> {
        let mut inner = self.locked();
        inner.wps_attempts += 1;
        if let Some(ssid) = inner.wps_target.clone() {
            if inner.networks.iter().any(|n| n.ssid == ssid) {
                let password = inner.passwords.get(&ssid).cloned().unwrap_or_default();
                inner.stored = Some(Credentials { ssid, password });
                inner.status = ConnectStatus::Connected;
            }
        }
        Ok(())
    }

    async fn scan_networks(&self) -> ScanOutcome {
        let mut inner = self.locked();
        if std::mem::take(&mut inner.fail_next_scan) {
            return ScanOutcome::Failed;
        }
        ScanOutcome::Done(inner.networks.clone())
    }

    async fn apply_sta_static_ip(&self, config: &StaStaticIp) -> Result<()> {
        self.locked().sta_static = Some(*config);
        Ok(())
    }

    async fn set_hostname(&self, hostname: &str) -> Result<()> {
        self.locked().hostname = hostname.to_string();
        Ok(())
    }

    async fn stored_ssid(&self) -> String {
        self.locked()
            .stored
            .as_ref()
            .map(|c| c.ssid.clone())
            .unwrap_or_default()
    }

    async fn has_stored_psk(&self) -> bool {
        self.locked()
            .stored
            .as_ref()
            .is_some_and(|c| !c.password.is_empty())
    }

    async fn station_ip(&self) -> Option<Ipv4Addr> {
        let inner = self.locked();
        if inner.status != ConnectStatus::Connected {
            return None;
        }
        Some(inner.sta_static.map(|s| s.ip).unwrap_or(DHCP_IP))
    }

    async fn station_mac(&self) -> String {
        "02:00:00:00:00:01".to_string()
    }

    async fn ap_ip(&self) -> Option<Ipv4Addr> {
        self.locked().ap.as_ref().map(|_| AP_IP)
    }

    async fn ap_mac(&self) -> String {
        "02:00:00:00:00:02".to_string()
    }

    async fn restart_device(&self) {
        let mut inner = self.locked();
        inner.restarted = true;
        inner.status = ConnectStatus::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_checks_passphrase() {
        let radio = MockRadio::new().with_network("Home", -50, Some("hunter22"));
        radio
            .begin_connect(Some(&Credentials {
                ssid: "Home".into(),
                password: "wrong".into(),
            }))
            .await
            .unwrap();
        assert_eq!(radio.status().await, ConnectStatus::ConnectFailed);

        radio
            .begin_connect(Some(&Credentials {
                ssid: "Home".into(),
                password: "hunter22".into(),
            }))
            .await
            .unwrap();
        assert_eq!(radio.wait_for_connect().await, ConnectStatus::Connected);
        assert_eq!(radio.station_ip().await, Some(DHCP_IP));
        assert_eq!(radio.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn open_networks_need_no_passphrase() {
        let radio = MockRadio::new().with_network("CafeGuest", -60, None);
        radio
            .begin_connect(Some(&Credentials {
                ssid: "CafeGuest".into(),
                password: String::new(),
            }))
            .await
            .unwrap();
        assert_eq!(radio.status().await, ConnectStatus::Connected);
    }

    #[tokio::test]
    async fn erase_forgets_credentials() {
        let radio = MockRadio::new()
            .with_network("Home", -50, Some("hunter22"))
            .with_stored("Home", "hunter22");
        radio.begin_connect(None).await.unwrap();
        assert_eq!(radio.status().await, ConnectStatus::Connected);

        radio.disconnect(true).await.unwrap();
        assert_eq!(radio.stored_ssid().await, "");
        radio.begin_connect(None).await.unwrap();
        assert_eq!(radio.status().await, ConnectStatus::NoSsidAvailable);
    }

    #[tokio::test]
    async fn added_networks_get_distinct_bssids() {
        let radio = MockRadio::new()
            .with_network("a", -40, None)
            .with_network("b", -50, None)
            .with_network("c", -60, None);
        match radio.scan_networks().await {
            ScanOutcome::Done(list) => {
                assert_eq!(list[0].bssid[5], 0);
                assert_eq!(list[1].bssid[5], 1);
                assert_eq!(list[2].bssid[5], 2);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn scan_failure_is_one_shot() {
        let radio = MockRadio::new().with_network("Home", -50, None);
        radio.fail_next_scan();
        assert!(matches!(radio.scan_networks().await, ScanOutcome::Failed));
        assert!(matches!(radio.scan_networks().await, ScanOutcome::Done(_)));
    }
}
