use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use std::{env, fs, path::Path};
use thiserror::Error;

use crate::db::models::{Device, Protocol};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read device file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse device file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid device entry: {0}")]
    InvalidDevice(String),
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: String, value: String },
}

/// Engine tuning knobs. Every value has a sane default and can be
/// overridden through `PINGMON_*` environment variables.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Hard wall-clock budget for a single device probe.
    pub probe_timeout: Duration,
    /// Budget for one notifier delivery attempt.
    pub notify_timeout: Duration,
    /// Outer deadline for a whole cycle; in-flight checks are cancelled
    /// once it elapses.
    pub cycle_deadline: Duration,
    /// Worker-pool bound for concurrent device checks, independent of the
    /// device count.
    pub max_concurrent_checks: usize,
    /// Pause between monitor cycles when the built-in scheduler drives the
    /// engine. External schedulers ignore this.
    pub run_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(10),
            notify_timeout: Duration::from_secs(10),
            cycle_deadline: Duration::from_secs(55),
            max_concurrent_checks: 16,
            run_interval: Duration::from_secs(60),
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Some(secs) = env_u64("PINGMON_PROBE_TIMEOUT_SECS")? {
            settings.probe_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("PINGMON_NOTIFY_TIMEOUT_SECS")? {
            settings.notify_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("PINGMON_CYCLE_DEADLINE_SECS")? {
            settings.cycle_deadline = Duration::from_secs(secs);
        }
        if let Some(count) = env_u64("PINGMON_MAX_CONCURRENT_CHECKS")? {
            settings.max_concurrent_checks = count.max(1) as usize;
        }
        if let Some(secs) = env_u64("PINGMON_RUN_INTERVAL_SECS")? {
            settings.run_interval = Duration::from_secs(secs.max(1));
        }
        Ok(settings)
    }
}

fn env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| ConfigError::InvalidEnv {
            key: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(None),
    }
}

#[derive(Deserialize)]
struct DeviceFile {
    devices: Vec<Device>,
}

/// Loads and validates the TOML device seed file used by the standalone
/// binary to populate its in-memory registry.
pub fn load_device_file(path: &str) -> Result<Vec<Device>, ConfigError> {
    let raw = fs::read_to_string(Path::new(path))?;
    let file: DeviceFile = toml::from_str(&raw)?;

    let mut seen = HashSet::new();
    for device in &file.devices {
        validate_device(device)?;
        if !seen.insert(device.id) {
            return Err(ConfigError::InvalidDevice(format!(
                "duplicate device id {}",
                device.id
            )));
        }
    }
    Ok(file.devices)
}

fn validate_device(device: &Device) -> Result<(), ConfigError> {
    match (device.protocol, device.port) {
        (Protocol::Icmp, Some(_)) => {
            return Err(ConfigError::InvalidDevice(format!(
                "{}: ICMP devices must not set a port",
                device.name
            )));
        }
        (Protocol::Tcp | Protocol::Udp, None) => {
            return Err(ConfigError::InvalidDevice(format!(
                "{}: {} devices require a port",
                device.name, device.protocol
            )));
        }
        _ => {}
    }
    for value in [device.window_start, device.window_end] {
        if value > 2359 || value % 100 > 59 {
            return Err(ConfigError::InvalidDevice(format!(
                "{}: window value {value} is not a valid HHMM time",
                device.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "pingmon-devices-{}-{}.toml",
            std::process::id(),
            rand::random::<u32>()
        ));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_a_valid_device_file() {
        let path = write_temp(
            r#"
            [[devices]]
            id = 1
            name = "gateway"
            identifier = "192.0.2.1"
            protocol = "TCP"
            port = 443
            persist = true
            trigger = "OFFLINE"
            window_start = 0
            window_end = 2359
            recipients = "ops@example.com"
            requested_by = "noc"
            subject_template = "$name unreachable"
            body_template = "$name is down"
            "#,
        );
        let devices = load_device_file(path.to_str().unwrap()).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].port, Some(443));
    }

    #[test]
    fn rejects_tcp_device_without_port() {
        let path = write_temp(
            r#"
            [[devices]]
            id = 1
            name = "gateway"
            identifier = "192.0.2.1"
            protocol = "TCP"
            persist = true
            trigger = "OFFLINE"
            window_start = 0
            window_end = 2359
            recipients = "ops@example.com"
            requested_by = "noc"
            subject_template = "s"
            body_template = "b"
            "#,
        );
        let err = load_device_file(path.to_str().unwrap()).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, ConfigError::InvalidDevice(_)));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let entry = r#"
            [[devices]]
            id = 7
            name = "gateway"
            identifier = "192.0.2.1"
            protocol = "ICMP"
            persist = true
            trigger = "OFFLINE"
            window_start = 0
            window_end = 2359
            recipients = "ops@example.com"
            requested_by = "noc"
            subject_template = "s"
            body_template = "b"
        "#;
        let path = write_temp(&format!("{entry}\n{entry}"));
        let err = load_device_file(path.to_str().unwrap()).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, ConfigError::InvalidDevice(_)));
    }

    #[test]
    fn rejects_malformed_window() {
        let path = write_temp(
            r#"
            [[devices]]
            id = 1
            name = "gateway"
            identifier = "192.0.2.1"
            protocol = "ICMP"
            persist = true
            trigger = "OFFLINE"
            window_start = 0
            window_end = 2475
            recipients = "ops@example.com"
            requested_by = "noc"
            subject_template = "s"
            body_template = "b"
            "#,
        );
        let err = load_device_file(path.to_str().unwrap()).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, ConfigError::InvalidDevice(_)));
    }

    #[test]
    fn settings_default_when_env_is_unset() {
        let settings = EngineSettings::default();
        assert_eq!(settings.max_concurrent_checks, 16);
        assert_eq!(settings.probe_timeout, Duration::from_secs(10));
        assert_eq!(settings.run_interval, Duration::from_secs(60));
    }
}
