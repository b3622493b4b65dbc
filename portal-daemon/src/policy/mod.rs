//! Startup policy dispatch. The policy is a compile-time choice so the
//! daemon binary carries exactly one behavior.

#[cfg(feature = "policy_daemon_if_disconnected")]
pub mod daemon_if_disconnected;
#[cfg(feature = "policy_on_start")]
pub mod on_start;

use portal_core::controller::PortalController;

const POLICY_COUNT: usize = cfg!(feature = "policy_on_start") as usize
    + cfg!(feature = "policy_daemon_if_disconnected") as usize;
const _: () = assert!(
    POLICY_COUNT == 1,
    "Select exactly ONE policy feature (e.g., policy_on_start)."
);

pub async fn dispatch(controller: PortalController) -> anyhow::Result<()> {
    #[cfg(feature = "policy_on_start")]
    {
        on_start::run(controller).await
    }

    #[cfg(all(
        feature = "policy_daemon_if_disconnected",
        not(feature = "policy_on_start")
    ))]
    {
        daemon_if_disconnected::run(controller).await
    }
}
