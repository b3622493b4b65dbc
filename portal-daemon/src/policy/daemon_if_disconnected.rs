use portal_core::controller::PortalController;
use tracing::info;

/// Daemon policy: try the stored credentials first and only open the portal
/// when the station cannot connect on its own.
pub async fn run(mut controller: PortalController) -> anyhow::Result<()> {
    info!("policy: daemon-if-disconnected");
    let connected = controller.auto_connect(None, None).await?;
    info!(connected, "provisioning settled");
    Ok(())
}
