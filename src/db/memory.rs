use async_trait::async_trait;
use dashmap::DashMap;

use super::models::{Device, DevicePatch};
use super::store::{DeviceStore, StoreError};

/// In-memory device registry backed by a concurrent map.
///
/// Used by the standalone binary (seeded from a TOML file) and by the test
/// suite. Deployments with a real registry implement [`DeviceStore`] over
/// their own persistence instead.
#[derive(Default)]
pub struct MemoryStore {
    devices: DashMap<i32, Device>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<Device>) -> Self {
        let store = Self::new();
        store.add_devices(devices);
        store
    }

    pub fn add_devices(&self, devices: Vec<Device>) {
        for device in devices {
            self.devices.insert(device.id, device);
        }
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn list_devices(&self) -> Result<Vec<Device>, StoreError> {
        let mut devices: Vec<Device> = self
            .devices
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        devices.sort_by_key(|d| d.id);
        Ok(devices)
    }

    async fn get_devices(&self, ids: &[i32]) -> Result<Vec<Device>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.devices.get(id).map(|entry| entry.value().clone()))
            .collect())
    }

    async fn update_devices(&self, devices: Vec<Device>) -> Result<(), StoreError> {
        for device in devices {
            if !self.devices.contains_key(&device.id) {
                return Err(StoreError::NotFound(device.id));
            }
            self.devices.insert(device.id, device);
        }
        Ok(())
    }

    async fn apply_patches(&self, patches: Vec<DevicePatch>) -> Result<(), StoreError> {
        for patch in patches {
            let mut entry = self
                .devices
                .get_mut(&patch.id)
                .ok_or(StoreError::NotFound(patch.id))?;
            if let Some(notified) = patch.notified {
                entry.notified = notified;
            }
        }
        Ok(())
    }

    async fn delete_devices(&self, ids: &[i32]) -> Result<(), StoreError> {
        for id in ids {
            self.devices.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Protocol, TriggerState};

    fn device(id: i32) -> Device {
        Device {
            id,
            name: format!("device-{id}"),
            identifier: "192.0.2.1".to_string(),
            protocol: Protocol::Icmp,
            port: None,
            persist: true,
            trigger: TriggerState::Offline,
            window_start: 0,
            window_end: 2359,
            recipients: "ops@example.com".to_string(),
            requested_by: "noc".to_string(),
            comments: None,
            subject_template: "$name down".to_string(),
            body_template: "$name is down".to_string(),
            notified: false,
        }
    }

    #[tokio::test]
    async fn patch_merges_notified_flag_only() {
        let store = MemoryStore::with_devices(vec![device(1)]);
        store
            .apply_patches(vec![DevicePatch::notified(1, true)])
            .await
            .unwrap();
        let devices = store.get_devices(&[1]).await.unwrap();
        assert!(devices[0].notified);
        assert_eq!(devices[0].name, "device-1");
    }

    #[tokio::test]
    async fn patching_unknown_device_fails() {
        let store = MemoryStore::new();
        let err = store
            .apply_patches(vec![DevicePatch::notified(42, true)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(42)));
    }

    #[tokio::test]
    async fn update_replaces_known_devices_only() {
        let store = MemoryStore::with_devices(vec![device(1)]);
        let mut updated = device(1);
        updated.identifier = "198.51.100.7".to_string();
        store.update_devices(vec![updated]).await.unwrap();
        let devices = store.get_devices(&[1]).await.unwrap();
        assert_eq!(devices[0].identifier, "198.51.100.7");

        let err = store.update_devices(vec![device(9)]).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(9)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::with_devices(vec![device(1), device(2)]);
        store.delete_devices(&[1]).await.unwrap();
        store.delete_devices(&[1]).await.unwrap();
        assert_eq!(store.list_devices().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_returns_devices_in_id_order() {
        let store = MemoryStore::with_devices(vec![device(3), device(1), device(2)]);
        let ids: Vec<i32> = store
            .list_devices()
            .await
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
