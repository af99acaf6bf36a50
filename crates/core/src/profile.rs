//! Onboard profiles: complete configurations stored in device memory.

use crate::error::Result;
use async_trait::async_trait;

/// Onboard profile switching. A device implements all of it or none of it.
#[async_trait]
pub trait ProfilesCapability: Send + Sync {
    /// Number of profiles the device stores; valid ids are `0..profile_count()`.
    fn profile_count(&self) -> u8;

    /// Activate profile `id`. The device confirms with `ProfileReceived`.
    async fn request_profile(&self, id: u8) -> Result<()>;
}
