use serde::{Deserialize, Serialize};
use std::fmt;

/// Probe strategy for a device. ICMP devices carry no port; TCP and UDP
/// devices must carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Icmp,
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Icmp => write!(f, "ICMP"),
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

/// The reachability state that should cause a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerState {
    Online,
    Offline,
}

impl TriggerState {
    /// The other state, used when evaluating the reverse edge for
    /// persistent devices.
    pub fn opposite(self) -> Self {
        match self {
            TriggerState::Online => TriggerState::Offline,
            TriggerState::Offline => TriggerState::Online,
        }
    }
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerState::Online => write!(f, "ONLINE"),
            TriggerState::Offline => write!(f, "OFFLINE"),
        }
    }
}

/// A monitored endpoint as stored in the device registry.
///
/// `notified` is the only field the engine ever mutates: it records that a
/// notification has fired for the current state and has not yet been
/// acknowledged by a reverse transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: i32,
    pub name: String,
    pub identifier: String,
    pub protocol: Protocol,
    #[serde(default)]
    pub port: Option<u16>,
    pub persist: bool,
    pub trigger: TriggerState,
    /// Daily notification window bounds, hour*100+minute, 0000-2359 UTC.
    pub window_start: u16,
    pub window_end: u16,
    pub recipients: String,
    pub requested_by: String,
    #[serde(default)]
    pub comments: Option<String>,
    pub subject_template: String,
    pub body_template: String,
    #[serde(default)]
    pub notified: bool,
}

/// Explicit partial update for a device record.
///
/// Only fields that are `Some` are merged into the stored record; everything
/// else is left untouched. The engine itself only ever patches `notified`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicePatch {
    pub id: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notified: Option<bool>,
}

impl DevicePatch {
    pub fn notified(id: i32, notified: bool) -> Self {
        Self {
            id,
            notified: Some(notified),
        }
    }
}
