use async_trait::async_trait;
use thiserror::Error;

pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("failed to send notification: {0}")]
    SendFailed(String),
    #[error("invalid sender configuration: {0}")]
    InvalidConfiguration(String),
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// A transport that delivers a rendered notification to its recipients.
///
/// The engine does not care how delivery happens; it only requires that the
/// call completes within the configured timeout and reports success or
/// failure, since a failed delivery leaves the device's `notified` flag
/// untouched for a retry on the next cycle.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipients: &str, subject: &str, body: &str) -> Result<(), SenderError>;
}
