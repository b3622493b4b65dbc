//! Portal HTML rendering. Plain template-constant substitution over the
//! controller's live state; deliberately not a template engine.

use crate::fields::{DataField, DataFieldRegistry, LabelPlacement};
use crate::scan::ScanEntry;
use crate::traits::{ConnectStatus, Encryption, StaStaticIp};
use std::net::Ipv4Addr;

const HTML_HEAD_START: &str = "<!DOCTYPE html><html lang=\"en\"><head><meta name=\"viewport\" content=\"width=device-width, initial-scale=1, user-scalable=no\"/><title>{v}</title>";

const HTML_STYLE: &str = "<style>div{padding:2px;font-size:1em;}body,textarea,input,select{background:0;border-radius:0;font:16px sans-serif;margin:0}textarea,input,select{outline:0;font-size:14px;border:1px solid #ccc;padding:8px;width:90%}.btn a{text-decoration:none}.container{margin:auto;width:90%}@media(min-width:1200px){.container{margin:auto;width:30%}}@media(min-width:768px) and (max-width:1200px){.container{margin:auto;width:50%}}.btn,h2{font-size:2em}h1{font-size:3em}.btn{background:#0ae;border-radius:4px;border:0;color:#fff;cursor:pointer;display:inline-block;margin:2px 0;padding:10px 14px 11px;width:100%}.btn:hover{background:#09d}.btn:active,.btn:focus{background:#08b}label>*{display:inline}form>*{display:block;margin-bottom:10px}textarea:focus,input:focus,select:focus{border-color:#5ab}.msg{background:#def;border-left:5px solid #59d;padding:1.5em}.q{float:right;width:64px;text-align:right}.l{background-size:1em}.table td{padding:.5em;text-align:left}.table tbody>:nth-child(2n-1){background:#ddd}fieldset{border-radius:0.5rem;margin:0px;}</style>";

// Clicking a network name copies it into the SSID input.
const HTML_SCRIPT: &str = "<script>function c(l){document.getElementById('s').value=l.innerText||l.textContent;document.getElementById('p').focus();}</script>";

const HTML_HEAD_END: &str = "</head><body><div class=\"container\"><div style=\"text-align:left;display:inline-block;min-width:260px;\">";

const HTML_END: &str = "</div></div></body></html>";

const FLDSET_START: &str = "<fieldset>";
const FLDSET_END: &str = "</fieldset>";

// {v} = SSID, {r} = quality percent, {i} = lock-icon class for encrypted APs
const WIFI_LIST_ITEM: &str =
    "<div><a href=\"#p\" onclick=\"c(this)\">{v}</a>&nbsp;<span class=\"q {i}\">{r}%</span></div>";

const FORM_LABEL: &str = "<label for=\"{i}\">{t}</label>";
const FORM_FIELD: &str =
    "<input id=\"{i}\" name=\"{n}\" maxlength=\"{l}\" placeholder=\"{p}\" value=\"{v}\">";

const SAVED_MSG: &str = "<div class=\"msg\"><h3>WiFi Credentials Saved</h3><p>Connecting {d} to the {n} network.</p></div>";

const AVAILABLE_PAGES: &str = "<h3>Available Pages</h3><table class=\"table\"><thead><tr><th>Page</th><th>Function</th></tr></thead><tbody><tr><td><a href=\"/\">/</a></td><td>Menu page.</td></tr><tr><td><a href=\"/wifi\">/wifi</a></td><td>Show WiFi scan results and enter WiFi configuration.</td></tr><tr><td><a href=\"/save\">/save</a></td><td>Save WiFi configuration information and configure device. Needs variables supplied.</td></tr><tr><td><a href=\"/close\">/close</a></td><td>Close the configuration server and configuration WiFi network.</td></tr><tr><td><a href=\"/i\">/i</a></td><td>This page.</td></tr><tr><td><a href=\"/r\">/r</a></td><td>Delete WiFi configuration and reboot. The device will not reconnect to a network until new WiFi configuration data is entered.</td></tr><tr><td><a href=\"/state\">/state</a></td><td>Current device state in JSON format. Interface for programmatic WiFi configuration.</td></tr></tbody></table>";

/// Live status shared by the root, close, and info pages.
#[derive(Debug, Clone, Default)]
pub struct StatusView {
    pub ap_name: String,
    pub stored_ssid: String,
    pub connected: bool,
    pub station_ip: Option<Ipv4Addr>,
}

/// Extra detail for the info page.
#[derive(Debug, Clone, Default)]
pub struct InfoView {
    pub status: StatusView,
    pub hostname: String,
    pub ap_ip: Option<Ipv4Addr>,
    pub ap_mac: String,
    pub station_mac: String,
    pub connecting: bool,
    pub last_status: ConnectStatus,
}

fn page_shell(title: &str, custom_head: &str, body: &str) -> String {
    let mut page = HTML_HEAD_START.replace("{v}", title);
    page.push_str(HTML_SCRIPT);
    page.push_str(HTML_STYLE);
    page.push_str(custom_head);
    page.push_str(HTML_HEAD_END);
    page.push_str(body);
    page.push_str(HTML_END);
    page
}

/// Render the visible scan entries as the clickable network list.
pub fn network_list(entries: &[ScanEntry]) -> String {
    let mut out = String::new();
    for entry in entries.iter().filter(|e| e.visible()) {
        let icon = match entry.network.encryption {
            Encryption::Encrypted => "l",
            Encryption::None => "",
        };
        out.push_str(
            &WIFI_LIST_ITEM
                .replace("{v}", &entry.network.ssid)
                .replace("{r}", &entry.quality().to_string())
                .replace("{i}", icon),
        );
    }
    out
}

fn labelled_input(id: &str, name: &str, placeholder: &str, max_length: usize, value: &str) -> String {
    let mut out = FORM_LABEL.replace("{i}", id).replace("{t}", placeholder);
    out.push_str(
        &FORM_FIELD
            .replace("{i}", id)
            .replace("{n}", name)
            .replace("{l}", &max_length.to_string())
            .replace("{p}", placeholder)
            .replace("{v}", value),
    );
    out
}

fn data_field_html(field: &DataField) -> String {
    if !field.is_input() {
        return field.custom_html().unwrap_or_default().to_string();
    }
    let input = FORM_FIELD
        .replace("{i}", field.id())
        .replace("{n}", field.id())
        .replace("{l}", &field.max_length().to_string())
        .replace("{p}", field.placeholder())
        .replace("{v}", field.value());
    let label = FORM_LABEL
        .replace("{i}", field.id())
        .replace("{t}", field.placeholder());
    let mut out = match field.label_placement() {
        LabelPlacement::Before => label + &input,
        LabelPlacement::After => input + &label,
        LabelPlacement::None => input,
    };
    if let Some(custom) = field.custom_html() {
        out.push_str(custom);
    }
    out
}

fn static_ip_form(sta: Option<&StaStaticIp>) -> String {
    let text = |ip: Option<Ipv4Addr>| ip.map(|v| v.to_string()).unwrap_or_default();
    let (ip, gw, sn, dns1, dns2) = match sta {
        Some(cfg) => (
            cfg.ip.to_string(),
            cfg.gateway.to_string(),
            cfg.subnet.to_string(),
            text(cfg.dns1),
            text(cfg.dns2),
        ),
        None => Default::default(),
    };
    let mut out = String::from(FLDSET_START);
    out.push_str(&labelled_input("ip", "ip", "Static IP", 15, &ip));
    out.push_str(&labelled_input("gw", "gw", "Gateway IP", 15, &gw));
    out.push_str(&labelled_input("sn", "sn", "Subnet", 15, &sn));
    out.push_str(&labelled_input("dns1", "dns1", "DNS1 IP", 15, &dns1));
    out.push_str(&labelled_input("dns2", "dns2", "DNS2 IP", 15, &dns2));
    out.push_str(FLDSET_END);
    out
}

fn report_status(view: &StatusView) -> String {
    if view.stored_ssid.is_empty() {
        return "No network configured.".to_string();
    }
    let mut out = format!("Configured to connect to AP <b>{}", view.stored_ssid);
    match (view.connected, view.station_ip) {
        (true, Some(ip)) => {
            out.push_str(&format!(
                " and connected</b> on IP <a href=\"http://{ip}/\">{ip}</a>"
            ));
        }
        _ => out.push_str(" but not connected.</b>"),
    }
    out
}

pub fn root_page(view: &StatusView, custom_head: &str) -> String {
    let mut body = format!("<h2>{}", view.ap_name);
    if !view.stored_ssid.is_empty() {
        if view.connected {
            body.push_str(&format!(" on {}", view.stored_ssid));
        } else {
            body.push_str(&format!(" <s>on {}</s>", view.stored_ssid));
        }
    }
    body.push_str("</h2>");
    body.push_str(FLDSET_START);
    body.push_str("<form action=\"/wifi\" method=\"get\"><button class=\"btn\">Configure WiFi</button></form><br>");
    body.push_str("<form action=\"/i\" method=\"get\"><button class=\"btn\">Information</button></form><br>");
    body.push_str("<form action=\"/close\" method=\"get\"><button class=\"btn\">Exit Portal</button></form><br>");
    body.push_str(&format!(
        "<div class=\"msg\">{}</div>",
        report_status(view)
    ));
    body.push_str(FLDSET_END);
    page_shell("Options", custom_head, &body)
}

pub fn wifi_page(
    entries: &[ScanEntry],
    fields: &DataFieldRegistry,
    sta: Option<&StaStaticIp>,
    custom_head: &str,
) -> String {
    let mut body = String::from("<h2>Configuration</h2>");
    if entries.iter().any(|e| e.visible()) {
        body.push_str(FLDSET_START);
        body.push_str(&network_list(entries));
        body.push_str(FLDSET_END);
        body.push_str("<br/>");
    } else {
        body.push_str("No networks found. Refresh to scan again.");
    }
    body.push_str("<small>To reuse the already connected AP, leave SSID and password fields empty</small>");
    body.push_str("<form method=\"get\" action=\"/save\">");
    body.push_str(FLDSET_START);
    body.push_str(&labelled_input("s", "s", "SSID", 32, ""));
    body.push_str(&labelled_input("p", "p", "Password", 64, ""));
    body.push_str(FLDSET_END);
    if !fields.is_empty() {
        body.push_str(FLDSET_START);
        for field in fields.iter() {
            body.push_str(&data_field_html(field));
        }
        body.push_str(FLDSET_END);
        body.push_str("<br/>");
    }
    body.push_str(&static_ip_form(sta));
    body.push_str("<br/><button class=\"btn\" type=\"submit\">Save</button>");
    body.push_str("</form>");
    page_shell("Configuration", custom_head, &body)
}

pub fn saved_page(ap_name: &str, ssid: &str, custom_head: &str) -> String {
    let body = SAVED_MSG.replace("{d}", ap_name).replace("{n}", ssid);
    page_shell("Credentials Saved", custom_head, &body)
}

pub fn close_page(view: &StatusView, custom_head: &str) -> String {
    let ip = view
        .station_ip
        .map(|ip| ip.to_string())
        .unwrap_or_default();
    let body = format!(
        "<div class=\"msg\">My network is <b>{}</b><br>IP address is <b>{}</b><br><br>Portal closed...<br><br></div>",
        view.stored_ssid, ip
    );
    page_shell("Close Portal", custom_head, &body)
}

pub fn reset_page(custom_head: &str) -> String {
    page_shell("Reset", custom_head, "Resetting")
}

pub fn info_page(view: &InfoView, custom_head: &str) -> String {
    let mut body = String::from("<dl>");
    if view.connecting {
        body.push_str(&format!(
            "<dt>Trying to connect</dt><dd>{}</dd>",
            view.last_status
        ));
    }
    body.push_str("</dl>");
    body.push_str("<h2>WiFi Information</h2>");
    body.push_str(&report_status(&view.status));
    body.push_str(FLDSET_START);
    body.push_str("<h3>Device Data</h3><table class=\"table\"><thead><tr><th>Name</th><th>Value</th></tr></thead><tbody>");
    let text = |ip: Option<Ipv4Addr>| ip.map(|v| v.to_string()).unwrap_or_default();
    for (name, value) in [
        ("Hostname", view.hostname.clone()),
        ("Access Point IP", text(view.ap_ip)),
        ("Access Point MAC", view.ap_mac.clone()),
        ("SSID", view.status.stored_ssid.clone()),
        ("Station IP", text(view.status.station_ip)),
        ("Station MAC", view.station_mac.clone()),
    ] {
        body.push_str(&format!("<tr><td>{name}</td><td>{value}</td></tr>"));
    }
    body.push_str("</tbody></table>");
    body.push_str(FLDSET_END);
    body.push_str(FLDSET_START);
    body.push_str(AVAILABLE_PAGES);
    body.push_str(FLDSET_END);
    page_shell("Info", custom_head, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::{ScanFilter, process_results};
    use crate::traits::RawNetwork;

    fn network(ssid: &str, rssi: i32, encryption: Encryption) -> RawNetwork {
        RawNetwork {
            ssid: ssid.to_string(),
            bssid: [0; 6],
            rssi,
            channel: 1,
            encryption,
            hidden: false,
        }
    }

    #[test]
    fn network_list_skips_suppressed_entries() {
        let entries = process_results(
            vec![
                network("Home", -40, Encryption::Encrypted),
                network("Home", -60, Encryption::Encrypted),
                network("Cafe", -55, Encryption::None),
            ],
            &ScanFilter::default(),
        );
        let html = network_list(&entries);
        assert_eq!(html.matches("Home").count(), 1);
        assert!(html.contains("Cafe"));
        // -40 dBm renders as 100%, the open network without the lock class
        assert!(html.contains("100%"));
        assert!(html.contains("class=\"q l\""));
        assert!(html.contains("class=\"q \""));
    }

    #[test]
    fn data_field_label_placement() {
        let before = DataField::new("token", "API token", "abc", 16);
        let html = data_field_html(&before);
        let label = html.find("<label").unwrap();
        let input = html.find("<input").unwrap();
        assert!(label < input);

        let after = DataField::new("token", "API token", "abc", 16)
            .with_label_placement(LabelPlacement::After);
        let html = data_field_html(&after);
        assert!(html.find("<input").unwrap() < html.find("<label").unwrap());

        let bare = DataField::new("token", "API token", "abc", 16)
            .with_label_placement(LabelPlacement::None);
        assert!(!data_field_html(&bare).contains("<label"));
    }

    #[test]
    fn root_page_reports_unconfigured_device() {
        let view = StatusView {
            ap_name: "SetupAP".into(),
            ..Default::default()
        };
        let html = root_page(&view, "");
        assert!(html.contains("SetupAP"));
        assert!(html.contains("No network configured."));
    }

    #[test]
    fn custom_head_is_injected() {
        let html = reset_page("<meta name=\"x\">");
        assert!(html.contains("<meta name=\"x\">"));
    }
}
