//! Demo daemon: runs the configuration portal over the in-memory radio.
//! Real deployments swap the radio for a platform implementation and keep
//! the policy selection as is.

mod policy;

use anyhow::Context;
use portal_core::config::PortalConfig;
use portal_core::controller::PortalController;
use portal_core::radios::MockRadio;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {path}"))?;
            PortalConfig::from_toml_str(&raw).with_context(|| format!("parsing {path}"))?
        }
        None => {
            let mut config = PortalConfig::default();
            config.bind_addr = "127.0.0.1:8080".parse()?;
            config
        }
    };
    info!(addr = %config.bind_addr, "starting portal daemon");

    // A handful of fake networks so the portal page has something to show.
    let radio = Arc::new(
        MockRadio::new()
            .with_network("MyHomeWiFi", -42, Some("correct-horse"))
            .with_network("MyHomeWiFi", -71, Some("correct-horse"))
            .with_network("CafeGuest", -60, None)
            .with_network("xfinitywifi", -55, Some("not-telling"))
            .with_network("HiddenNetwork", -80, Some("shhh")),
    );

    let controller = PortalController::new(radio, config);
    policy::dispatch(controller).await
}
