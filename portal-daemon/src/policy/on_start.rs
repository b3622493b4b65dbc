use portal_core::controller::PortalController;
use tracing::info;

/// On-start policy: open the configuration portal immediately.
pub async fn run(mut controller: PortalController) -> anyhow::Result<()> {
    info!("policy: on-start, opening the portal");
    let connected = controller.start_config_portal(None, None).await?;
    info!(connected, "portal finished");
    Ok(())
}
