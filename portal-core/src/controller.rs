//! The portal controller: brings up the configuration access point, serves
//! the portal, and drives station connect attempts. Supports a modal mode
//! (block until provisioned or timed out) and a modeless mode (portal runs
//! alongside the host's own loop).

use crate::config::{
    DEFAULT_PORTAL_TIMEOUT, MAX_WIFI_CHANNEL, MODAL_SCAN_INTERVAL, MODELESS_SCAN_INTERVAL,
    PortalConfig,
};
use crate::fields::{DataField, DataFieldRegistry};
use crate::pages::{InfoView, StatusView};
use crate::scan::{ScanEntry, ScanFilter, entries_from_outcome};
use crate::traits::{
    ApInfo, ApSettings, ConnectStatus, Credentials, DnsRedirector, NullEvents, NullRedirector,
    PortalEvents, StaStaticIp, WifiMode, WifiRadio,
};
use crate::web;
use crate::Result;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep};
use tracing::{debug, info, warn};

/// Pause between a save arriving and the connect attempt, so the client
/// gets the confirmation page before the access point link degrades.
const SAVE_SETTLE_DELAY: Duration = Duration::from_secs(2);
/// Modal portal tick.
const LOOP_TICK: Duration = Duration::from_millis(100);
/// Status poll interval while waiting out a bounded connect.
const CONNECT_POLL: Duration = Duration::from_millis(100);
/// How long auto-connect gives the stored credentials before opening the
/// portal, and how often it polls in that window.
const AUTO_CONNECT_WAIT: Duration = Duration::from_secs(10);
const AUTO_CONNECT_POLL: Duration = Duration::from_millis(200);

/// Mutable portal state shared between the controller and the HTTP
/// handlers. Handlers set flags; the portal loop consumes them each tick.
#[derive(Debug, Default)]
pub struct PortalState {
    pub ap_name: String,
    pub ap_password: Option<String>,
    pub ap_channel: u8,
    /// Set by the save handler; cleared when the loop picks the request up.
    pub connect_requested: bool,
    /// Set by the close handler.
    pub stop_requested: bool,
    pub pending: Option<Credentials>,
    /// Active portal timeout. Save and close restore this to the default so
    /// the ensuing connect attempt has room to run.
    pub portal_timeout: Option<Duration>,
    pub sta_static_ip: Option<StaStaticIp>,
    pub fields: DataFieldRegistry,
    pub scan_cache: Vec<ScanEntry>,
    pub last_status: ConnectStatus,
    pub connecting: bool,
}

/// State the HTTP handlers work against, threaded through axum as
/// `State<Arc<PortalShared>>`.
pub struct PortalShared {
    pub radio: Arc<dyn WifiRadio>,
    pub config: PortalConfig,
    state: Mutex<PortalState>,
}

impl PortalShared {
    /// Lock the state, recovering from a poisoned mutex. A handler panic
    /// must not wedge the portal loop.
    pub fn locked(&self) -> MutexGuard<'_, PortalState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn filter(&self) -> ScanFilter {
        ScanFilter {
            remove_duplicates: self.config.remove_duplicate_aps,
            minimum_quality: self.config.minimum_quality,
        }
    }

    /// Run a scan pass and replace the cached entry set.
    pub async fn refresh_scan(&self) {
        let outcome = self.radio.scan_networks().await;
        let entries = entries_from_outcome(outcome, &self.filter());
        self.locked().scan_cache = entries;
    }

    pub async fn status_view(&self) -> StatusView {
        let ap_name = self.locked().ap_name.clone();
        StatusView {
            ap_name,
            stored_ssid: self.radio.stored_ssid().await,
            connected: self.radio.status().await == ConnectStatus::Connected,
            station_ip: self.radio.station_ip().await,
        }
    }

    pub async fn info_view(&self) -> InfoView {
        let (connecting, last_status) = {
            let state = self.locked();
            (state.connecting, state.last_status)
        };
        InfoView {
            status: self.status_view().await,
            hostname: self.config.hostname.clone(),
            ap_ip: self.radio.ap_ip().await,
            ap_mac: self.radio.ap_mac().await,
            station_mac: self.radio.station_mac().await,
            connecting,
            last_status,
        }
    }

    /// Consume a pending save request, if any. An empty SSID means the
    /// client asked to reuse the stored credentials.
    pub fn take_pending(&self) -> Option<Credentials> {
        let mut state = self.locked();
        if state.connect_requested {
            state.connect_requested = false;
            Some(state.pending.take().unwrap_or_default())
        } else {
            None
        }
    }

    fn take_stop(&self) -> bool {
        let mut state = self.locked();
        std::mem::take(&mut state.stop_requested)
    }
}

pub struct PortalController {
    shared: Arc<PortalShared>,
    dns: Arc<dyn DnsRedirector>,
    events: Arc<dyn PortalEvents>,
    hostname: String,
    modeless: AtomicBool,
    portal_started: Option<Instant>,
    last_scan: Option<Instant>,
    server: Option<JoinHandle<()>>,
    bound_addr: Option<SocketAddr>,
}

impl PortalController {
    pub fn new(radio: Arc<dyn WifiRadio>, config: PortalConfig) -> Self {
        let hostname = rfc952_hostname(&config.hostname);
        let state = PortalState {
            portal_timeout: config.portal_timeout,
            sta_static_ip: config.sta_static_ip,
            ..Default::default()
        };
        Self {
            shared: Arc::new(PortalShared {
                radio,
                config,
                state: Mutex::new(state),
            }),
            dns: Arc::new(NullRedirector),
            events: Arc::new(NullEvents),
            hostname,
            modeless: AtomicBool::new(false),
            portal_started: None,
            last_scan: None,
            server: None,
            bound_addr: None,
        }
    }

    pub fn with_dns(mut self, dns: Arc<dyn DnsRedirector>) -> Self {
        self.dns = dns;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn PortalEvents>) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &PortalConfig {
        &self.shared.config
    }

    pub fn shared(&self) -> Arc<PortalShared> {
        Arc::clone(&self.shared)
    }

    /// Sanitized hostname applied to the station interface.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Address the portal HTTP server actually bound, once running.
    pub fn portal_addr(&self) -> Option<SocketAddr> {
        self.bound_addr
    }

    /// Register an extra form field. Returns false when an input with the
    /// same id already exists.
    pub fn add_data_field(&self, field: DataField) -> bool {
        self.shared.locked().fields.add(field)
    }

    pub fn read_data_field(&self, id: &str) -> Option<String> {
        self.shared
            .locked()
            .fields
            .get(id)
            .map(|f| f.value().to_string())
    }

    /// Try the stored credentials first; fall back to the modal portal when
    /// that fails. Returns true once the station is connected.
    pub async fn auto_connect(
        &mut self,
        ap_name: Option<&str>,
        ap_password: Option<&str>,
    ) -> Result<bool> {
        info!("trying stored credentials before opening the portal");
        self.shared.radio.set_mode(WifiMode::Sta).await?;
        self.shared.radio.set_hostname(&self.hostname).await?;
        if let Some(sta) = self.sta_static_ip() {
            self.shared.radio.apply_sta_static_ip(&sta).await?;
        }
        self.shared.radio.begin_connect(None).await?;

        let deadline = Instant::now() + AUTO_CONNECT_WAIT;
        let mut status = self.shared.radio.status().await;
        while status != ConnectStatus::Connected && Instant::now() < deadline {
            sleep(AUTO_CONNECT_POLL).await;
            status = self.shared.radio.status().await;
        }
        self.shared.locked().last_status = status;

        if status == ConnectStatus::Connected {
            if let Some(ip) = self.shared.radio.station_ip().await {
                info!(%ip, "connected with stored credentials");
            }
            return Ok(true);
        }
        self.start_config_portal(ap_name, ap_password).await
    }

    /// Run the configuration portal until credentials are provisioned, the
    /// portal is closed, or the timeout elapses. Returns whether the station
    /// ended up connected.
    pub async fn start_config_portal(
        &mut self,
        ap_name: Option<&str>,
        ap_password: Option<&str>,
    ) -> Result<bool> {
        if let Err(e) = self.setup_config_portal(ap_name, ap_password).await {
            if let Err(te) = self.teardown_portal().await {
                warn!(error = %te, "teardown after failed portal setup");
            }
            return Err(e);
        }
        self.modeless.store(false, Ordering::Relaxed);

        // Tear down no matter how the loop ended; a radio fault must not
        // leave the server task or the DNS redirector running.
        let outcome = self.run_modal_portal().await;
        let teardown = self.teardown_portal().await;
        let timed_out = match outcome {
            Ok(timed_out) => {
                teardown?;
                timed_out
            }
            Err(e) => {
                if let Err(te) = teardown {
                    warn!(error = %te, "teardown after portal loop error");
                }
                return Err(e);
            }
        };

        if timed_out {
            self.shared.radio.set_hostname(&self.hostname).await?;
            if let Some(sta) = self.sta_static_ip() {
                self.shared.radio.apply_sta_static_ip(&sta).await?;
            }
            self.shared.radio.begin_connect(None).await?;
            let status = self.wait_for_connect_result().await;
            self.shared.locked().last_status = status;
        }

        Ok(self.shared.radio.status().await == ConnectStatus::Connected)
    }

    /// The modal loop proper. Returns whether the portal ended by timeout
    /// (or close), meaning the caller owes one last stored-credentials
    /// connect attempt.
    async fn run_modal_portal(&mut self) -> Result<bool> {
        // Timed-out also covers an explicit close without a save: both paths
        // fall through to one last attempt with whatever is stored.
        let mut timed_out = true;
        loop {
            if !self.dns.self_polling() {
                self.dns.process_next_request().await;
            }

            if self.scan_due(MODAL_SCAN_INTERVAL) {
                // An unfinished connect attempt blocks the scan on most
                // radios, so abort it first. Stored credentials survive.
                if let Err(e) = self.shared.radio.disconnect(false).await {
                    warn!(error = %e, "pre-scan disconnect failed");
                }
                self.shared.refresh_scan().await;
                self.last_scan = Some(Instant::now());
            }

            if let Some(submitted) = self.shared.take_pending() {
                sleep(SAVE_SETTLE_DELAY).await;
                let creds = (!submitted.ssid.is_empty()).then_some(submitted);
                match self.connect_wifi(creds).await? {
                    ConnectStatus::Connected => {
                        timed_out = false;
                        self.events.on_config_saved();
                        break;
                    }
                    status => {
                        warn!(%status, "portal-supplied credentials failed to connect");
                        self.shared.radio.set_mode(WifiMode::Ap).await?;
                        if self.shared.config.break_after_config {
                            timed_out = false;
                            self.events.on_config_saved();
                            break;
                        }
                        // Fresh timer for the next attempt.
                        self.portal_started = Some(Instant::now());
                    }
                }
            }

            if self.shared.take_stop() {
                info!("portal close requested");
                break;
            }

            if self.portal_timed_out() {
                info!("portal timeout elapsed");
                break;
            }

            sleep(LOOP_TICK).await;
        }

        Ok(timed_out)
    }

    /// Bring up the portal and return immediately; the host then calls
    /// [`Self::loop_once`] from its own loop and finally
    /// [`Self::stop_config_portal`].
    pub async fn start_config_portal_modeless(
        &mut self,
        ap_name: Option<&str>,
        ap_password: Option<&str>,
    ) -> Result<()> {
        self.setup_config_portal(ap_name, ap_password).await?;
        self.modeless.store(true, Ordering::Relaxed);
        // Opportunistic attempt with whatever the radio has stored; a failure
        // just leaves the portal waiting for a save.
        let status = self.connect_wifi(None).await?;
        debug!(%status, "opportunistic connect on modeless start");
        Ok(())
    }

    /// One modeless tick: DNS poll, periodic rescan, and a connect attempt
    /// when (and only when) the save handler has flagged one. A failed
    /// attempt is not retried until the next save.
    pub async fn loop_once(&mut self) -> Result<()> {
        if !self.modeless.load(Ordering::Relaxed) {
            return Ok(());
        }

        if !self.dns.self_polling() {
            self.dns.process_next_request().await;
        }

        if self.scan_due(MODELESS_SCAN_INTERVAL) {
            self.shared.refresh_scan().await;
            self.last_scan = Some(Instant::now());
        }

        if let Some(submitted) = self.shared.take_pending() {
            sleep(SAVE_SETTLE_DELAY).await;
            let creds = (!submitted.ssid.is_empty()).then_some(submitted);
            let status = self.connect_wifi(creds).await?;
            if status == ConnectStatus::Connected {
                self.events.on_config_saved();
            } else {
                warn!(%status, "connect failed, waiting for a new save");
            }
        }

        if self.shared.take_stop() {
            self.stop_config_portal().await?;
        }

        Ok(())
    }

    /// Tear the modeless portal down and put the radio back into station
    /// mode. Idempotent.
    pub async fn stop_config_portal(&mut self) -> Result<()> {
        if !self.modeless.swap(false, Ordering::Relaxed) && self.server.is_none() {
            return Ok(());
        }
        self.teardown_portal().await
    }

    async fn setup_config_portal(
        &mut self,
        ap_name: Option<&str>,
        ap_password: Option<&str>,
    ) -> Result<()> {
        let config = &self.shared.config;
        let ssid = ap_name
            .map(str::to_string)
            .unwrap_or_else(|| config.ap_ssid.clone());
        let password = validate_ap_password(
            ap_password.or(config.ap_password.as_deref()),
        );
        let channel = effective_channel(config.ap_channel);

        // Keep the station side alive only when it is already associated.
        let mode = if self.shared.radio.status().await == ConnectStatus::Connected {
            WifiMode::ApSta
        } else {
            WifiMode::Ap
        };
        self.shared.radio.set_mode(mode).await?;
        self.shared
            .radio
            .start_ap(&ApSettings {
                ssid: ssid.clone(),
                password: password.clone(),
                channel,
                static_ip: config.ap_static_ip,
            })
            .await?;

        {
            let mut state = self.shared.locked();
            state.ap_name = ssid.clone();
            state.ap_password = password.clone();
            state.ap_channel = channel;
            state.connect_requested = false;
            state.stop_requested = false;
            state.pending = None;
            state.portal_timeout = self.shared.config.portal_timeout;
            state.sta_static_ip = self.shared.config.sta_static_ip;
        }

        let ap_ip = self.shared.radio.ap_ip().await;
        if let Some(ip) = ap_ip {
            self.dns.start(ip).await?;
        }

        let (addr, handle) = web::start_web_server(self.shared()).await?;
        info!(%addr, ssid = %ssid, channel, "configuration portal up");
        self.bound_addr = Some(addr);
        self.server = Some(handle);

        self.shared.refresh_scan().await;
        self.last_scan = Some(Instant::now());
        self.portal_started = Some(Instant::now());

        self.events.on_ap_started(&ApInfo {
            ssid,
            password,
            channel,
            ip: ap_ip,
        });
        Ok(())
    }

    async fn teardown_portal(&mut self) -> Result<()> {
        if let Some(server) = self.server.take() {
            server.abort();
        }
        self.bound_addr = None;
        if let Err(e) = self.dns.stop().await {
            warn!(error = %e, "dns redirector stop failed");
        }
        self.shared.radio.set_mode(WifiMode::Sta).await?;
        debug!("portal torn down");
        Ok(())
    }

    /// Connect the station. `None` reuses the stored credentials; explicit
    /// credentials replace them. Already connected is a successful no-op.
    pub async fn connect_wifi(
        &mut self,
        credentials: Option<Credentials>,
    ) -> Result<ConnectStatus> {
        if self.shared.radio.status().await == ConnectStatus::Connected {
            debug!("already connected, skipping connect");
            return Ok(ConnectStatus::Connected);
        }

        let has_new = credentials
            .as_ref()
            .is_some_and(|c| !c.ssid.is_empty());
        if has_new {
            // New credentials invalidate whatever was stored before.
            self.shared.radio.disconnect(true).await?;
        }

        if let Some(sta) = self.sta_static_ip() {
            self.shared.radio.apply_sta_static_ip(&sta).await?;
        }
        self.shared.radio.set_mode(WifiMode::ApSta).await?;
        self.shared.radio.set_hostname(&self.hostname).await?;

        self.shared.locked().connecting = true;
        let new_creds = if has_new { credentials.as_ref() } else { None };
        if let Err(e) = self.shared.radio.begin_connect(new_creds).await {
            self.shared.locked().connecting = false;
            return Err(e);
        }
        let mut status = self.wait_for_connect_result().await;

        // WPS is worth a shot whenever the attempt ran without a passphrase,
        // whether that was an explicit open-network save or a stored-
        // credentials reuse with no PSK on record.
        let password_empty = match credentials.as_ref() {
            Some(c) if has_new => c.password.is_empty(),
            _ => !self.shared.radio.has_stored_psk().await,
        };
        if status != ConnectStatus::Connected
            && self.shared.config.try_wps
            && self.shared.radio.supports_wps()
            && password_empty
        {
            info!("passphrase-less connect failed, trying WPS");
            self.shared.radio.start_wps().await?;
            status = self.wait_for_connect_result().await;
        }

        {
            let mut state = self.shared.locked();
            state.connecting = false;
            state.last_status = status;
        }
        info!(%status, "connect attempt settled");
        Ok(status)
    }

    /// Wait for the in-flight connect attempt to settle. Without a
    /// configured connect timeout this defers to the radio's own blocking
    /// wait; with one it polls until the deadline and reports the last
    /// observed status.
    pub async fn wait_for_connect_result(&self) -> ConnectStatus {
        match self.shared.config.connect_timeout {
            None => self.shared.radio.wait_for_connect().await,
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                let mut status = self.shared.radio.status().await;
                while status != ConnectStatus::Connected && Instant::now() < deadline {
                    sleep(CONNECT_POLL).await;
                    status = self.shared.radio.status().await;
                }
                status
            }
        }
    }

    /// Erase the stored station credentials. The radio forgets the network;
    /// the next boot lands in the portal.
    pub async fn reset_settings(&self) -> Result<()> {
        info!("erasing stored credentials");
        self.shared.radio.disconnect(true).await
    }

    /// DNS-only tick for hosts that drive the connect path themselves but
    /// still need captive capture serviced.
    pub async fn safe_loop(&self) {
        if !self.dns.self_polling() {
            self.dns.process_next_request().await;
        }
    }

    /// Force a fresh scan pass outside the periodic schedule and return the
    /// rendered network list.
    pub async fn refresh_networks(&mut self) -> String {
        self.shared.refresh_scan().await;
        self.last_scan = Some(Instant::now());
        crate::pages::network_list(&self.shared.locked().scan_cache)
    }

    /// SSID of the configuration access point, once the portal is up.
    pub fn config_portal_ssid(&self) -> String {
        self.shared.locked().ap_name.clone()
    }

    pub fn config_portal_password(&self) -> Option<String> {
        self.shared.locked().ap_password.clone()
    }

    pub async fn stored_ssid(&self) -> String {
        self.shared.radio.stored_ssid().await
    }

    fn scan_due(&self, interval: Duration) -> bool {
        self.last_scan
            .is_none_or(|at| at.elapsed() >= interval)
    }

    fn portal_timed_out(&self) -> bool {
        let timeout = self.shared.locked().portal_timeout;
        match (self.portal_started, timeout) {
            (Some(started), Some(timeout)) => started.elapsed() >= timeout,
            _ => false,
        }
    }

    fn sta_static_ip(&self) -> Option<StaStaticIp> {
        self.shared.locked().sta_static_ip
    }
}

/// Restore the default portal timeout; called from the save and close
/// handlers so the final connect attempt is not cut short.
pub(crate) fn restore_portal_timeout(state: &mut PortalState) {
    state.portal_timeout = Some(DEFAULT_PORTAL_TIMEOUT);
}

/// Sanitize a hostname to RFC 952 shape: alphanumerics and hyphens, at most
/// 24 characters, no trailing hyphen. Everything else is dropped.
pub fn rfc952_hostname(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .take(24)
        .collect();
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// WPA2 passphrases must be 8 to 63 characters; anything else falls back to
/// an open network rather than a misconfigured radio.
pub fn validate_ap_password(password: Option<&str>) -> Option<String> {
    match password {
        Some(p) if (8..=63).contains(&p.len()) => Some(p.to_string()),
        Some(p) if !p.is_empty() => {
            warn!(length = p.len(), "invalid access point passphrase length, starting open");
            None
        }
        _ => None,
    }
}

/// Resolve channel 0 (auto) to a start-time-derived channel in 1..=11.
pub fn effective_channel(configured: u8) -> u8 {
    if configured != 0 {
        return configured;
    }
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    (millis % u128::from(MAX_WIFI_CHANNEL)) as u8 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ap_password_length_rules() {
        assert!(validate_ap_password(Some("short")).is_none()); // 5 chars
        assert_eq!(
            validate_ap_password(Some("12345678")).as_deref(),
            Some("12345678")
        );
        let max = "x".repeat(63);
        assert_eq!(validate_ap_password(Some(&max)).as_deref(), Some(max.as_str()));
        assert!(validate_ap_password(Some(&"x".repeat(64))).is_none());
        assert!(validate_ap_password(Some("")).is_none());
        assert!(validate_ap_password(None).is_none());
    }

    #[test]
    fn hostname_sanitized_to_rfc952() {
        assert_eq!(rfc952_hostname("my device_01!"), "mydevice01");
        assert_eq!(rfc952_hostname("trailing-"), "trailing");
        assert_eq!(
            rfc952_hostname("a-very-long-hostname-that-overflows"),
            "a-very-long-hostname-tha"
        );
        assert!(rfc952_hostname("a-very-long-hostname-that-overflows").len() <= 24);
    }

    #[test]
    fn auto_channel_stays_in_range() {
        for _ in 0..32 {
            let channel = effective_channel(0);
            assert!((1..=11).contains(&channel));
        }
        assert_eq!(effective_channel(6), 6);
    }
}
