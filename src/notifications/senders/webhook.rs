use async_trait::async_trait;
use reqwest::{Client, header};
use std::collections::HashMap;

use super::{Notifier, SenderError};

/// Delivers notifications by POSTing a JSON payload to a configured
/// webhook, typically a mail-gateway bridge that fans the message out to
/// the listed recipients.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    headers: Option<HashMap<String, String>>,
}

impl WebhookNotifier {
    pub fn new(url: String, headers: Option<HashMap<String, String>>) -> Self {
        Self {
            client: Client::new(),
            url,
            headers,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, recipients: &str, subject: &str, body: &str) -> Result<(), SenderError> {
        let mut request = self.client.post(&self.url);

        if let Some(extra) = &self.headers {
            let mut header_map = header::HeaderMap::new();
            for (key, value) in extra {
                let name = header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                    SenderError::InvalidConfiguration(format!("invalid header name: {e}"))
                })?;
                let value = header::HeaderValue::from_str(value).map_err(|e| {
                    SenderError::InvalidConfiguration(format!("invalid header value: {e}"))
                })?;
                header_map.insert(name, value);
            }
            request = request.headers(header_map);
        }

        let payload = serde_json::json!({
            "recipients": recipients,
            "subject": subject,
            "body": body,
        });

        let response = request.json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(SenderError::SendFailed(format!(
                "webhook returned non-success status {status}: {error_body}"
            )));
        }

        Ok(())
    }
}
