//! The portal HTTP surface. Handlers render against the shared portal state
//! and set flags the portal loop consumes; nothing here touches the radio's
//! connect path directly except the reset handler.

use crate::config::RESET_SETTLE_DELAY;
use crate::controller::{PortalShared, restore_portal_timeout};
use crate::pages;
use crate::traits::Credentials;
use crate::Result;
use axum::{
    Form, Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub type WebState = State<Arc<PortalShared>>;

/// Bind the portal server and serve it on a background task. The bound
/// address is reported back so a port-0 bind stays usable.
pub async fn start_web_server(
    shared: Arc<PortalShared>,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let addr = shared.config.bind_addr;
    let app = Router::new()
        .route("/", get(handle_root))
        .route("/fwlink", get(handle_root))
        .route("/wifi", get(handle_wifi).post(handle_wifi))
        .route("/0wifi", get(handle_wifi_cached))
        .route("/save", get(handle_save_query).post(handle_save_form))
        .route("/close", get(handle_close))
        .route("/i", get(handle_info))
        .route("/r", get(handle_reset))
        .route("/state", get(handle_state))
        .fallback(handle_not_found)
        .with_state(shared);

    let listener = TcpListener::bind(addr).await?;
    let bound = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app.into_make_service()).await {
            error!(error = %e, "portal web server exited");
        }
    });
    Ok((bound, handle))
}

/// Whether the requested host is already a literal address (possibly with a
/// port), meaning the client is not chasing a captive-portal probe name.
fn is_ip(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ':')
}

/// Captive capture: a request addressed to any hostname is bounced to the
/// portal's own IP so probe pages land on the configuration UI.
async fn captive_redirect(shared: &PortalShared, headers: &HeaderMap) -> Option<Response> {
    let host = headers.get(header::HOST)?.to_str().ok()?;
    if is_ip(host) {
        return None;
    }
    let ip = shared.radio.ap_ip().await?;
    debug!(host, "captive redirect to portal");
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, format!("http://{ip}/"))
        .header(header::CONTENT_LENGTH, "0")
        .body(Body::empty())
        .ok()
}

/// Stamp any response with the no-cache headers captive clients need, plus
/// the CORS header when one is configured.
fn with_portal_headers(shared: &PortalShared, mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(header::EXPIRES, HeaderValue::from_static("-1"));
    if let Some(origin) = &shared.config.cors_header {
        if let Ok(value) = HeaderValue::from_str(origin) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
    }
    response
}

fn portal_page(shared: &PortalShared, html: String) -> Response {
    with_portal_headers(shared, Html(html).into_response())
}

/// A person is on the portal pages, so hold the timeout open until they
/// save or close.
fn suspend_timeout(shared: &PortalShared) {
    shared.locked().portal_timeout = None;
}

async fn handle_root(State(shared): WebState, headers: HeaderMap) -> Response {
    if let Some(redirect) = captive_redirect(&shared, &headers).await {
        return redirect;
    }
    suspend_timeout(&shared);
    let view = shared.status_view().await;
    portal_page(&shared, pages::root_page(&view, &shared.config.custom_head))
}

async fn handle_wifi(State(shared): WebState, headers: HeaderMap) -> Response {
    if let Some(redirect) = captive_redirect(&shared, &headers).await {
        return redirect;
    }
    suspend_timeout(&shared);
    shared.refresh_scan().await;
    render_wifi(&shared)
}

/// The scan-less variant serves whatever the cache holds; the portal loop
/// keeps it fresh on its own schedule.
async fn handle_wifi_cached(State(shared): WebState, headers: HeaderMap) -> Response {
    if let Some(redirect) = captive_redirect(&shared, &headers).await {
        return redirect;
    }
    suspend_timeout(&shared);
    render_wifi(&shared)
}

fn render_wifi(shared: &PortalShared) -> Response {
    let state = shared.locked();
    let html = pages::wifi_page(
        &state.scan_cache,
        &state.fields,
        state.sta_static_ip.as_ref(),
        &shared.config.custom_head,
    );
    drop(state);
    portal_page(shared, html)
}

async fn handle_save_query(
    State(shared): WebState,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    apply_save(&shared, params)
}

async fn handle_save_form(
    State(shared): WebState,
    Form(params): Form<HashMap<String, String>>,
) -> Response {
    apply_save(&shared, params)
}

/// Store the submitted credentials and form fields and flag a connect for
/// the portal loop. The page goes out before the attempt starts, so the
/// client sees the confirmation while the access point link is still up.
fn apply_save(shared: &PortalShared, params: HashMap<String, String>) -> Response {
    let ssid = params.get("s").cloned().unwrap_or_default();
    let password = params.get("p").cloned().unwrap_or_default();
    info!(ssid = %ssid, "credentials submitted");

    let mut state = shared.locked();
    for field in state.fields.iter_mut() {
        if let Some(value) = params.get(field.id()) {
            field.set_value(value);
        }
    }
    if let Some(sta) = parse_static_ip(&params) {
        state.sta_static_ip = Some(sta);
    }
    state.pending = Some(Credentials {
        ssid: ssid.clone(),
        password,
    });
    state.connect_requested = true;
    restore_portal_timeout(&mut state);
    let ap_name = state.ap_name.clone();
    drop(state);

    portal_page(
        shared,
        pages::saved_page(&ap_name, &ssid, &shared.config.custom_head),
    )
}

fn parse_static_ip(params: &HashMap<String, String>) -> Option<crate::traits::StaStaticIp> {
    let parse = |key: &str| params.get(key).and_then(|v| v.parse().ok());
    Some(crate::traits::StaStaticIp {
        ip: parse("ip")?,
        gateway: parse("gw")?,
        subnet: parse("sn")?,
        dns1: parse("dns1"),
        dns2: parse("dns2"),
    })
}

async fn handle_close(State(shared): WebState) -> Response {
    let view = shared.status_view().await;
    {
        let mut state = shared.locked();
        state.stop_requested = true;
        restore_portal_timeout(&mut state);
    }
    info!("portal close requested over http");
    portal_page(&shared, pages::close_page(&view, &shared.config.custom_head))
}

async fn handle_info(State(shared): WebState, headers: HeaderMap) -> Response {
    if let Some(redirect) = captive_redirect(&shared, &headers).await {
        return redirect;
    }
    suspend_timeout(&shared);
    let view = shared.info_view().await;
    portal_page(&shared, pages::info_page(&view, &shared.config.custom_head))
}

/// Erase the stored credentials and restart the device after a settle delay
/// so this response still reaches the client.
async fn handle_reset(State(shared): WebState) -> Response {
    info!("credential erase and restart requested");
    let page = portal_page(&shared, pages::reset_page(&shared.config.custom_head));
    let radio = Arc::clone(&shared.radio);
    tokio::spawn(async move {
        if let Err(e) = radio.disconnect(true).await {
            error!(error = %e, "credential erase failed");
        }
        tokio::time::sleep(RESET_SETTLE_DELAY).await;
        radio.restart_device().await;
    });
    page
}

/// Machine-readable device state for programmatic provisioning.
async fn handle_state(State(shared): WebState) -> Response {
    let ip_text = |ip: Option<std::net::Ipv4Addr>| {
        ip.map(|v| v.to_string()).unwrap_or_default()
    };
    let body = serde_json::json!({
        "Soft_AP_IP": ip_text(shared.radio.ap_ip().await),
        "Soft_AP_MAC": shared.radio.ap_mac().await,
        "Station_IP": ip_text(shared.radio.station_ip().await),
        "Station_MAC": shared.radio.station_mac().await,
        "Password": shared.radio.has_stored_psk().await,
        "SSID": shared.radio.stored_ssid().await,
    });
    with_portal_headers(&shared, Json(body).into_response())
}

async fn handle_not_found(
    State(shared): WebState,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Some(redirect) = captive_redirect(&shared, &headers).await {
        return redirect;
    }
    let mut body = format!("File Not Found\n\nURI: {}\nMethod: {method}\n", uri.path());
    let args: Vec<(&str, &str)> = uri
        .query()
        .map(|q| {
            q.split('&')
                .filter(|p| !p.is_empty())
                .map(|p| p.split_once('=').unwrap_or((p, "")))
                .collect()
        })
        .unwrap_or_default();
    body.push_str(&format!("Arguments: {}\n", args.len()));
    for (name, value) in args {
        body.push_str(&format!(" {name}: {value}\n"));
    }
    with_portal_headers(&shared, (StatusCode::NOT_FOUND, body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_hosts_are_not_redirected() {
        assert!(is_ip("192.168.4.1"));
        assert!(is_ip("192.168.4.1:8080"));
        assert!(!is_ip("connectivitycheck.gstatic.com"));
        assert!(!is_ip("wifi-portal.local"));
        assert!(!is_ip(""));
    }

    #[test]
    fn static_ip_requires_the_full_triple() {
        let mut params = HashMap::new();
        params.insert("ip".to_string(), "192.168.1.50".to_string());
        params.insert("gw".to_string(), "192.168.1.1".to_string());
        assert!(parse_static_ip(&params).is_none());
        params.insert("sn".to_string(), "255.255.255.0".to_string());
        let sta = parse_static_ip(&params).unwrap();
        assert_eq!(sta.ip.octets(), [192, 168, 1, 50]);
        assert!(sta.dns1.is_none());
    }
}
