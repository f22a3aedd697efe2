use async_trait::async_trait;
use thiserror::Error;

use super::models::{Device, DevicePatch};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("device {0} not found")]
    NotFound(i32),
    #[error("device store unavailable: {0}")]
    Unavailable(String),
}

/// The device registry as seen by the engine.
///
/// The registry itself (persistence, management API, auth) lives outside
/// this crate; the engine only reads the device set, merges `notified`
/// patches after successful deliveries, and deletes expired one-shot
/// devices during cleanup.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<Device>, StoreError>;

    async fn get_devices(&self, ids: &[i32]) -> Result<Vec<Device>, StoreError>;

    /// Replaces the stored records wholesale. Fails if any id is unknown.
    async fn update_devices(&self, devices: Vec<Device>) -> Result<(), StoreError>;

    /// Merges explicit partial updates into the stored records. Fails if
    /// any patched id is unknown.
    async fn apply_patches(&self, patches: Vec<DevicePatch>) -> Result<(), StoreError>;

    /// Deletes the given devices. Unknown ids are ignored so that cleanup
    /// stays idempotent.
    async fn delete_devices(&self, ids: &[i32]) -> Result<(), StoreError>;
}
