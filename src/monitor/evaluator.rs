//! Edge-triggered notification decision logic.
//!
//! Given a fresh probe outcome, the current UTC time of day and the device's
//! `notified` flag, decides whether a notification must fire this cycle and
//! renders its content. The decision is purely functional; flag mutation
//! happens in the runner, and only after a successful delivery.

use chrono::{DateTime, Timelike, Utc};
use thiserror::Error;
use tracing::debug;

use super::probe::ProbeOutcome;
use crate::db::models::Device;

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("notification window value {0} is not a valid HHMM time")]
    InvalidWindow(u16),
}

/// A notification ready for delivery, along with the `notified` value the
/// device must take once delivery succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub notified_after: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    NoOp,
    Notify(Notification),
}

/// Collapses a wall-clock instant to the hour*100+minute form the device
/// windows use.
pub fn now_hhmm(now: DateTime<Utc>) -> u16 {
    (now.hour() * 100 + now.minute()) as u16
}

/// Runs the per-device state machine for one cycle.
///
/// Forward edge: observed state matches the trigger while `notified` is
/// unset. Reverse edge (persistent devices only): observed state is the
/// opposite of the trigger while `notified` is set. Everything else,
/// including any state outside the daily window, is a no-op.
///
/// A window whose start lies after its end never matches; windows wrapping
/// midnight are not supported.
pub fn evaluate(
    device: &Device,
    outcome: ProbeOutcome,
    now_hhmm: u16,
) -> Result<Decision, EvaluationError> {
    for value in [device.window_start, device.window_end] {
        if value > 2359 || value % 100 > 59 {
            return Err(EvaluationError::InvalidWindow(value));
        }
    }

    if !(device.window_start..=device.window_end).contains(&now_hhmm) {
        debug!(
            device = %device.name,
            window_start = device.window_start,
            window_end = device.window_end,
            "outside notification window"
        );
        return Ok(Decision::NoOp);
    }

    let observed = outcome.state();
    if observed == device.trigger && !device.notified {
        Ok(Decision::Notify(Notification {
            subject: format!("[Ping] {}", render_template(device, &device.subject_template)),
            body: render_template(device, &device.body_template),
            notified_after: true,
        }))
    } else if device.persist && observed == device.trigger.opposite() && device.notified {
        // Persistent devices also notify when they cross back out of the
        // triggering state, e.g. a service that was offline is back online.
        Ok(Decision::Notify(Notification {
            subject: format!("[Ping] {} is now {observed}", device.name),
            body: format!("{} is now back {observed}.", device.name),
            notified_after: false,
        }))
    } else {
        Ok(Decision::NoOp)
    }
}

/// Literal substitution of `$field` placeholders. Unknown placeholders are
/// left verbatim rather than treated as errors.
fn render_template(device: &Device, template: &str) -> String {
    let port = device.port.map(|p| p.to_string()).unwrap_or_default();
    let protocol = device.protocol.to_string();
    let trigger = device.trigger.to_string();
    let comments = device.comments.clone().unwrap_or_default();
    let mappings = [
        ("$name", device.name.as_str()),
        ("$identifier", device.identifier.as_str()),
        ("$port", port.as_str()),
        ("$protocol", protocol.as_str()),
        ("$trigger", trigger.as_str()),
        ("$requested_by", device.requested_by.as_str()),
        ("$comments", comments.as_str()),
    ];

    let mut rendered = template.to_string();
    for (placeholder, value) in mappings {
        rendered = rendered.replace(placeholder, value);
    }
    rendered
}
