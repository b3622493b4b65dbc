//! Radio implementations. Real deployments supply their own
//! [`crate::traits::WifiRadio`] over the platform's WiFi stack; the in-memory
//! mock here backs the tests and the demo daemon.

mod mock;

pub use mock::MockRadio;
