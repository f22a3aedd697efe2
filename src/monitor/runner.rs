//! One-cycle orchestration: scatter per-device checks, gather their
//! outcomes behind a barrier, then clean up expired one-shot devices.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{error, info, warn};

use super::evaluator::{self, Decision};
use super::probe;
use crate::config::EngineSettings;
use crate::db::models::{Device, DevicePatch};
use crate::db::store::{DeviceStore, StoreError};
use crate::notifications::Notifier;

/// Per-cycle observability summary, also emitted through tracing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub devices_evaluated: usize,
    pub notifications_sent: usize,
    pub probe_failures: usize,
    pub evaluation_failures: usize,
    pub delivery_failures: usize,
    pub store_failures: usize,
    /// Workflows that crashed outright, as opposed to reporting a
    /// malformed-data evaluation failure.
    pub panicked: usize,
    pub cancelled: usize,
    pub devices_cleaned: usize,
}

/// Terminal outcome of one device's probe -> evaluate -> notify workflow.
enum DeviceOutcome {
    NoOp,
    Notified,
    ProbeFailed,
    EvaluationFailed,
    DeliveryFailed,
    StoreFailed,
    Cancelled,
}

pub struct MonitorEngine {
    store: Arc<dyn DeviceStore>,
    notifier: Arc<dyn Notifier>,
    settings: EngineSettings,
}

impl MonitorEngine {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        notifier: Arc<dyn Notifier>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            settings,
        }
    }

    /// Runs one full monitor cycle over a snapshot of the device set.
    ///
    /// Every device gets an independent workflow; one device's failure
    /// never aborts its siblings. Cleanup only starts once every workflow
    /// has reached a terminal outcome or the cycle deadline has cancelled
    /// the stragglers. Assumes the external scheduler never overlaps two
    /// invocations.
    pub async fn run_cycle(&self) -> Result<CycleSummary, StoreError> {
        let devices = self.store.list_devices().await?;
        info!(count = devices.len(), "starting monitor cycle");

        let mut summary = CycleSummary {
            devices_evaluated: devices.len(),
            ..CycleSummary::default()
        };

        let permits = Arc::new(Semaphore::new(self.settings.max_concurrent_checks));
        let mut workflows = JoinSet::new();
        for device in devices {
            let permits = Arc::clone(&permits);
            let store = Arc::clone(&self.store);
            let notifier = Arc::clone(&self.notifier);
            let settings = self.settings.clone();
            workflows.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return DeviceOutcome::Cancelled,
                };
                check_device(store, notifier, &settings, device).await
            });
        }

        let deadline = tokio::time::sleep(self.settings.cycle_deadline);
        tokio::pin!(deadline);
        let mut deadline_fired = false;
        loop {
            tokio::select! {
                joined = workflows.join_next() => {
                    match joined {
                        Some(Ok(outcome)) => tally(&mut summary, &outcome),
                        Some(Err(join_error)) => {
                            if join_error.is_cancelled() {
                                summary.cancelled += 1;
                            } else {
                                error!(error = %join_error, "device workflow panicked");
                                summary.panicked += 1;
                            }
                        }
                        None => break,
                    }
                }
                () = &mut deadline, if !deadline_fired => {
                    warn!("cycle deadline exceeded, cancelling in-flight device checks");
                    deadline_fired = true;
                    workflows.abort_all();
                }
            }
        }

        summary.devices_cleaned = self.cleanup().await?;
        info!(
            evaluated = summary.devices_evaluated,
            sent = summary.notifications_sent,
            probe_failures = summary.probe_failures,
            delivery_failures = summary.delivery_failures,
            cancelled = summary.cancelled,
            cleaned = summary.devices_cleaned,
            "monitor cycle finished"
        );
        Ok(summary)
    }

    /// Deletes one-shot devices that have fired their notification.
    /// Idempotent; a run with no qualifying devices is a no-op.
    pub async fn cleanup(&self) -> Result<usize, StoreError> {
        let devices = self.store.list_devices().await?;
        let expired: Vec<i32> = devices
            .iter()
            .filter(|device| device.notified && !device.persist)
            .map(|device| device.id)
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }
        self.store.delete_devices(&expired).await?;
        info!(count = expired.len(), "removed one-shot devices that have notified");
        Ok(expired.len())
    }
}

/// Probe -> evaluate -> notify -> flag patch, strictly in that order.
/// All failures are logged and reported through the returned outcome;
/// nothing here propagates to sibling workflows.
async fn check_device(
    store: Arc<dyn DeviceStore>,
    notifier: Arc<dyn Notifier>,
    settings: &EngineSettings,
    device: Device,
) -> DeviceOutcome {
    info!(device = %device.name, "checking connectivity");

    let outcome = match timeout(settings.probe_timeout, probe::probe(&device)).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            error!(device = %device.name, error = %e, "probe failed, reachability unknown");
            return DeviceOutcome::ProbeFailed;
        }
        Err(_elapsed) => {
            error!(device = %device.name, "probe exceeded its hard timeout");
            return DeviceOutcome::ProbeFailed;
        }
    };

    let notification = match evaluator::evaluate(&device, outcome, evaluator::now_hhmm(Utc::now()))
    {
        Ok(Decision::Notify(notification)) => notification,
        Ok(Decision::NoOp) => {
            info!(device = %device.name, "notification trigger criteria not met");
            return DeviceOutcome::NoOp;
        }
        Err(e) => {
            warn!(device = %device.name, error = %e, "skipping device with malformed data");
            return DeviceOutcome::EvaluationFailed;
        }
    };

    info!(
        device = %device.name,
        recipients = %device.recipients,
        "notification trigger criteria met, sending notification"
    );
    let delivery = timeout(
        settings.notify_timeout,
        notifier.send(&device.recipients, &notification.subject, &notification.body),
    )
    .await;
    match delivery {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            // Leave `notified` untouched so the same edge fires again next
            // cycle.
            error!(device = %device.name, error = %e, "notification delivery failed");
            return DeviceOutcome::DeliveryFailed;
        }
        Err(_elapsed) => {
            error!(device = %device.name, "notification delivery timed out");
            return DeviceOutcome::DeliveryFailed;
        }
    }

    let patch = DevicePatch::notified(device.id, notification.notified_after);
    match store.apply_patches(vec![patch]).await {
        Ok(()) => DeviceOutcome::Notified,
        Err(e) => {
            error!(device = %device.name, error = %e, "failed to record notification state");
            DeviceOutcome::StoreFailed
        }
    }
}

fn tally(summary: &mut CycleSummary, outcome: &DeviceOutcome) {
    match outcome {
        DeviceOutcome::NoOp => {}
        DeviceOutcome::Notified => summary.notifications_sent += 1,
        DeviceOutcome::ProbeFailed => summary.probe_failures += 1,
        DeviceOutcome::EvaluationFailed => summary.evaluation_failures += 1,
        DeviceOutcome::DeliveryFailed => summary.delivery_failures += 1,
        DeviceOutcome::StoreFailed => summary.store_failures += 1,
        DeviceOutcome::Cancelled => summary.cancelled += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::db::models::{Protocol, TriggerState};
    use crate::notifications::SenderError;
    use async_trait::async_trait;

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn send(&self, _: &str, _: &str, _: &str) -> Result<(), SenderError> {
            Ok(())
        }
    }

    fn device(id: i32, persist: bool, notified: bool) -> Device {
        Device {
            id,
            name: format!("device-{id}"),
            identifier: "192.0.2.1".to_string(),
            protocol: Protocol::Icmp,
            port: None,
            persist,
            trigger: TriggerState::Offline,
            window_start: 0,
            window_end: 2359,
            recipients: "ops@example.com".to_string(),
            requested_by: "noc".to_string(),
            comments: None,
            subject_template: "$name down".to_string(),
            body_template: "$name is down".to_string(),
            notified,
        }
    }

    fn engine(store: Arc<MemoryStore>) -> MonitorEngine {
        MonitorEngine::new(store, Arc::new(NullNotifier), EngineSettings::default())
    }

    #[tokio::test]
    async fn cleanup_removes_only_notified_one_shot_devices() {
        let store = Arc::new(MemoryStore::with_devices(vec![
            device(1, false, true),
            device(2, true, true),
            device(3, false, false),
        ]));
        let engine = engine(Arc::clone(&store));

        let cleaned = engine.cleanup().await.unwrap();
        assert_eq!(cleaned, 1);

        let remaining: Vec<i32> = store
            .list_devices()
            .await
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(remaining, vec![2, 3]);
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let store = Arc::new(MemoryStore::with_devices(vec![device(1, false, true)]));
        let engine = engine(Arc::clone(&store));

        assert_eq!(engine.cleanup().await.unwrap(), 1);
        assert_eq!(engine.cleanup().await.unwrap(), 0);
        assert!(store.list_devices().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cleanup_with_no_devices_is_a_noop() {
        let engine = engine(Arc::new(MemoryStore::new()));
        assert_eq!(engine.cleanup().await.unwrap(), 0);
    }
}
