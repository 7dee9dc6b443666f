//! Outbound registration notifications.
//!
//! When configured via `SCRAMBLE_NOTIFY_WEBHOOK_URL`, the service posts a
//! notice whenever a registrant's payment is confirmed or refunded. The
//! post happens in a background task so payment reconciliation never
//! waits on (or fails because of) the notification target.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use reqwest::Client;
use serde::Serialize;

/// Retry delays in milliseconds. Quick retries so a flapping target
/// doesn't hold the background task open; worst case 300ms of waiting.
const NOTIFY_RETRY_DELAYS: &[u64] = &[100, 200];

/// Notification payload (owned so it can move into the spawned task).
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationNotice {
    /// "payment_confirmed" or "payment_refunded"
    pub event: String,
    pub tournament_id: String,
    pub registrant_id: String,
    pub registrant_name: String,
    pub registrant_email: String,
    pub admission_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
    /// Unix timestamp
    pub timestamp: i64,
}

/// Spawn a fire-and-forget notification.
///
/// No-op when no webhook URL is configured. Panics in the spawned task
/// are logged rather than silently swallowed.
pub fn spawn_notice(client: Client, notify_url: Option<String>, notice: RegistrationNotice) {
    if let Some(url) = notify_url {
        let event = notice.event.clone();
        tokio::spawn(
            AssertUnwindSafe(async move {
                send_notice(&client, &url, &notice).await;
            })
            .catch_unwind()
            .map(move |result| {
                if let Err(panic) = result {
                    let panic_msg = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!("Notify task panicked for event '{}': {}", event, panic_msg);
                }
            }),
        );
    }
}

async fn send_notice(client: &Client, url: &str, notice: &RegistrationNotice) {
    for (attempt, delay_ms) in std::iter::once(&0u64)
        .chain(NOTIFY_RETRY_DELAYS.iter())
        .enumerate()
    {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
        }

        match client
            .post(url)
            .json(notice)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                if attempt > 0 {
                    tracing::debug!("Notify webhook succeeded after {} retries", attempt);
                }
                return;
            }
            Ok(resp) => {
                tracing::debug!("Notify webhook returned {}", resp.status());
            }
            Err(e) => {
                tracing::debug!("Notify webhook failed: {}", e);
            }
        }
    }

    tracing::warn!(
        "Notify webhook failed after {} attempts",
        NOTIFY_RETRY_DELAYS.len() + 1
    );
}
