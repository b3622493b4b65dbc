//! Portal configuration: defaults, setter helpers mirroring the classic
//! provisioning API, and the TOML file form the daemon loads.

use crate::traits::{ApStaticIp, StaStaticIp};
use crate::{Error, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Restored whenever the portal form is saved or closed so the ensuing
/// connect attempt has time to run.
pub const DEFAULT_PORTAL_TIMEOUT: Duration = Duration::from_secs(60);
/// Modal portal rescans (and aborts any in-flight connect) this often.
pub const MODAL_SCAN_INTERVAL: Duration = Duration::from_secs(30);
/// Modeless tick rescans this often.
pub const MODELESS_SCAN_INTERVAL: Duration = Duration::from_secs(60);
/// Settle time between the reset page going out and the device restart.
pub const RESET_SETTLE_DELAY: Duration = Duration::from_secs(5);

pub const MIN_WIFI_CHANNEL: u8 = 1;
/// Channels 12 and 13 are unusable for a number of client devices.
pub const MAX_WIFI_CHANNEL: u8 = 11;

/// Suggested floor for [`PortalConfig::set_minimum_signal_quality`].
pub const DEFAULT_MINIMUM_QUALITY: u8 = 8;

#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Where the portal HTTP server listens.
    pub bind_addr: SocketAddr,
    pub hostname: String,
    /// Default SSID/password for the configuration access point, used by the
    /// daemon policies. An explicit name passed to the controller wins.
    pub ap_ssid: String,
    pub ap_password: Option<String>,
    /// `None` keeps the portal open until explicitly closed.
    pub portal_timeout: Option<Duration>,
    /// `None` blocks on the radio's own connect wait.
    pub connect_timeout: Option<Duration>,
    /// 0 derives a channel from the portal start time.
    pub ap_channel: u8,
    /// `None` disables the signal-quality filter.
    pub minimum_quality: Option<u8>,
    pub remove_duplicate_aps: bool,
    /// Exit the modal portal after a save even when the connect failed.
    pub break_after_config: bool,
    pub try_wps: bool,
    pub ap_static_ip: Option<ApStaticIp>,
    pub sta_static_ip: Option<StaStaticIp>,
    /// Injected verbatim into every page head.
    pub custom_head: String,
    /// Value for Access-Control-Allow-Origin when set.
    pub cors_header: Option<String>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 80)),
            hostname: "wifi-portal".to_string(),
            ap_ssid: "wifi-portal-setup".to_string(),
            ap_password: None,
            portal_timeout: None,
            connect_timeout: None,
            ap_channel: 1,
            minimum_quality: None,
            remove_duplicate_aps: true,
            break_after_config: false,
            try_wps: false,
            ap_static_ip: None,
            sta_static_ip: None,
            custom_head: String::new(),
            cors_header: None,
        }
    }
}

impl PortalConfig {
    /// Portal timeout in seconds; 0 disables it.
    pub fn set_config_portal_timeout(&mut self, seconds: u64) {
        self.portal_timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
    }

    /// Connect timeout in seconds; 0 falls back to the radio's blocking wait.
    pub fn set_connect_timeout(&mut self, seconds: u64) {
        self.connect_timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
    }

    /// Select the AP channel. 0 requests a start-time-derived channel;
    /// anything above the legal range falls back to channel 1.
    pub fn set_ap_channel(&mut self, channel: u8) -> u8 {
        self.ap_channel = if channel > MAX_WIFI_CHANNEL { 1 } else { channel };
        self.ap_channel
    }

    /// Minimum quality for the scan filter; negative disables it.
    pub fn set_minimum_signal_quality(&mut self, quality: i16) {
        self.minimum_quality = (0..=100).contains(&quality).then_some(quality as u8);
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: PortalConfigFile = toml::from_str(raw)?;
        let mut config = PortalConfig::default();
        if let Some(addr) = file.bind_addr {
            config.bind_addr = SocketAddr::from_str(&addr)
                .map_err(|e| Error::InvalidConfig(format!("bind_addr {addr:?}: {e}")))?;
        }
        if let Some(hostname) = file.hostname {
            config.hostname = hostname;
        }
        if let Some(ssid) = file.ap_ssid {
            config.ap_ssid = ssid;
        }
        config.ap_password = file.ap_password;
        if let Some(seconds) = file.portal_timeout_secs {
            config.set_config_portal_timeout(seconds);
        }
        if let Some(seconds) = file.connect_timeout_secs {
            config.set_connect_timeout(seconds);
        }
        if let Some(channel) = file.ap_channel {
            config.set_ap_channel(channel);
        }
        if let Some(quality) = file.minimum_quality {
            config.set_minimum_signal_quality(quality);
        }
        if let Some(flag) = file.remove_duplicate_aps {
            config.remove_duplicate_aps = flag;
        }
        if let Some(flag) = file.break_after_config {
            config.break_after_config = flag;
        }
        if let Some(flag) = file.try_wps {
            config.try_wps = flag;
        }
        config.ap_static_ip = file.ap_static_ip;
        config.sta_static_ip = file.sta_static_ip;
        if let Some(head) = file.custom_head {
            config.custom_head = head;
        }
        config.cors_header = file.cors_header;
        Ok(config)
    }
}

#[derive(Debug, Deserialize)]
struct PortalConfigFile {
    bind_addr: Option<String>,
    hostname: Option<String>,
    ap_ssid: Option<String>,
    ap_password: Option<String>,
    portal_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    ap_channel: Option<u8>,
    minimum_quality: Option<i16>,
    remove_duplicate_aps: Option<bool>,
    break_after_config: Option<bool>,
    try_wps: Option<bool>,
    ap_static_ip: Option<ApStaticIp>,
    sta_static_ip: Option<StaStaticIp>,
    custom_head: Option<String>,
    cors_header: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = PortalConfig::default();
        assert!(config.portal_timeout.is_none());
        assert!(config.remove_duplicate_aps);
        assert_eq!(config.ap_channel, 1);
    }

    #[test]
    fn timeout_setters_treat_zero_as_disabled() {
        let mut config = PortalConfig::default();
        config.set_config_portal_timeout(120);
        assert_eq!(config.portal_timeout, Some(Duration::from_secs(120)));
        config.set_config_portal_timeout(0);
        assert!(config.portal_timeout.is_none());
        config.set_connect_timeout(0);
        assert!(config.connect_timeout.is_none());
    }

    #[test]
    fn channel_setter_clamps_to_legal_range() {
        let mut config = PortalConfig::default();
        assert_eq!(config.set_ap_channel(6), 6);
        assert_eq!(config.set_ap_channel(0), 0); // derived at portal start
        assert_eq!(config.set_ap_channel(13), 1);
    }

    #[test]
    fn quality_setter_disables_on_negative() {
        let mut config = PortalConfig::default();
        config.set_minimum_signal_quality(DEFAULT_MINIMUM_QUALITY as i16);
        assert_eq!(config.minimum_quality, Some(DEFAULT_MINIMUM_QUALITY));
        config.set_minimum_signal_quality(-1);
        assert!(config.minimum_quality.is_none());
    }

    #[test]
    fn toml_round_trip() {
        let raw = r#"
            bind_addr = "127.0.0.1:8080"
            hostname = "garage-sensor"
            ap_ssid = "GarageSetup"
            portal_timeout_secs = 300
            ap_channel = 0
            minimum_quality = 8

            [sta_static_ip]
            ip = "192.168.1.50"
            gateway = "192.168.1.1"
            subnet = "255.255.255.0"
            dns1 = "1.1.1.1"
        "#;
        let config = PortalConfig::from_toml_str(raw).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.hostname, "garage-sensor");
        assert_eq!(config.ap_ssid, "GarageSetup");
        assert_eq!(config.portal_timeout, Some(Duration::from_secs(300)));
        assert_eq!(config.ap_channel, 0);
        assert_eq!(config.minimum_quality, Some(8));
        let sta = config.sta_static_ip.unwrap();
        assert_eq!(sta.ip.octets(), [192, 168, 1, 50]);
        assert_eq!(sta.dns1.unwrap().octets(), [1, 1, 1, 1]);
        assert!(sta.dns2.is_none());
    }

    #[test]
    fn bad_bind_addr_is_rejected() {
        let err = PortalConfig::from_toml_str("bind_addr = \"not-an-addr\"").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
