//! Delivery execution: retry, backoff, timeout and response capture.

use crate::signing::sign_body;
use crate::WebhookEvent;
use chrono::{DateTime, Utc};
use linkforty_core::types::Webhook;
use parking_lot::Mutex;
use reqwest::Client;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const RESPONSE_BODY_CAPTURE_BYTES: usize = 1000;
const DELIVERY_LOG_RING_CAPACITY: usize = 2048;
const MAX_BACKOFF_MS: u64 = 30_000;

/// One attempt's outcome, retained for introspection and for the
/// `test_delivery` synchronous variant.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub attempt: u32,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub success: bool,
    pub attempted_at: DateTime<Utc>,
}

/// A logged delivery attempt, kept in an in-process ring buffer. Never
/// surfaced to the originating public request.
#[derive(Debug, Clone)]
pub struct DeliveryLog {
    pub webhook_id: Uuid,
    pub event_id: Uuid,
    pub outcome: DeliveryOutcome,
}

#[derive(Debug, Clone)]
pub struct TestDeliveryResult {
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub error: Option<String>,
}

/// Executes `(webhook, event)` deliveries independently of one another and
/// of the caller.
pub struct Dispatcher {
    client: Client,
    log: Arc<Mutex<VecDeque<DeliveryLog>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .build()
                .expect("reqwest client with default TLS config"),
            log: Arc::new(Mutex::new(VecDeque::with_capacity(DELIVERY_LOG_RING_CAPACITY))),
        }
    }

    /// Spawn one independent background delivery task for `webhook` x
    /// `event`. Does not block the caller; the task outlives the request
    /// that triggered it.
    pub fn deliver(&self, webhook: Webhook, event: WebhookEvent) {
        let client = self.client.clone();
        let log = self.log.clone();
        tokio::spawn(async move {
            let body = match serde_json::to_vec(&event) {
                Ok(b) => b,
                Err(err) => {
                    warn!(webhook_id = %webhook.id, error = %err, "failed to serialize webhook payload");
                    return;
                }
            };
            let outcome = run_attempts(&client, &webhook, &event, &body).await;
            info!(
                webhook_id = %webhook.id,
                event_id = %event.event_id,
                attempts = outcome.attempt,
                success = outcome.success,
                status = ?outcome.response_status,
                "webhook delivery finished"
            );
            metrics::counter!(
                "webhooks.delivery",
                "success" => outcome.success.to_string()
            )
            .increment(1);
            push_log(&log, DeliveryLog { webhook_id: webhook.id, event_id: event.event_id, outcome });
        });
    }

    /// Synchronous single-attempt delivery used to verify a webhook's
    /// configuration. Returns directly to the caller.
    pub async fn test_delivery(&self, webhook: &Webhook, event: &WebhookEvent) -> TestDeliveryResult {
        let body = match serde_json::to_vec(event) {
            Ok(b) => b,
            Err(err) => {
                return TestDeliveryResult {
                    response_status: None,
                    response_body: None,
                    error: Some(err.to_string()),
                }
            }
        };
        let outcome = attempt_once(&self.client, webhook, event, &body, 1).await;
        TestDeliveryResult {
            response_status: outcome.response_status,
            response_body: outcome.response_body,
            error: outcome.error,
        }
    }

    /// Snapshot of recent delivery attempts, most recent last.
    pub fn recent_deliveries(&self) -> Vec<DeliveryLog> {
        self.log.lock().iter().cloned().collect()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn push_log(log: &Arc<Mutex<VecDeque<DeliveryLog>>>, entry: DeliveryLog) {
    let mut log = log.lock();
    if log.len() == DELIVERY_LOG_RING_CAPACITY {
        log.pop_front();
    }
    log.push_back(entry);
}

async fn run_attempts(
    client: &Client,
    webhook: &Webhook,
    event: &WebhookEvent,
    body: &[u8],
) -> DeliveryOutcome {
    let mut last = None;
    for attempt in 1..=webhook.max_attempts {
        let outcome = attempt_once(client, webhook, event, body, attempt).await;
        let success = outcome.success;
        last = Some(outcome);
        if success {
            break;
        }
        if attempt < webhook.max_attempts {
            let delay_ms = backoff_delay_ms(attempt);
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
    last.expect("max_attempts is at least 1")
}

/// `min(1000 * 2^(attempt-1), 30000)` ms.
fn backoff_delay_ms(attempt: u32) -> u64 {
    let scaled = 1000u64.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(63));
    scaled.min(MAX_BACKOFF_MS)
}

async fn attempt_once(
    client: &Client,
    webhook: &Webhook,
    event: &WebhookEvent,
    body: &[u8],
    attempt: u32,
) -> DeliveryOutcome {
    let signature = sign_body(&webhook.secret, body);

    let mut request = client
        .post(&webhook.url)
        .timeout(Duration::from_millis(webhook.timeout_ms))
        .header("Content-Type", "application/json")
        .header("User-Agent", "LinkForty-Webhook/1.0")
        .header("X-LinkForty-Signature", format!("sha256={signature}"))
        .header("X-LinkForty-Event", event.event.as_str())
        .header("X-LinkForty-Event-ID", event.event_id.to_string());

    // Extra headers merge in after the core headers; they may override
    // User-Agent/Content-Type but never the three X-LinkForty-* keys.
    for (key, value) in &webhook.headers {
        let lower = key.to_ascii_lowercase();
        if lower.starts_with("x-linkforty-") {
            continue;
        }
        request = request.header(key, value);
    }

    let request = request.body(body.to_vec());

    match request.send().await {
        Ok(response) => {
            let status = response.status();
            let bytes = response.bytes().await.unwrap_or_default();
            let captured = String::from_utf8_lossy(&bytes[..bytes.len().min(RESPONSE_BODY_CAPTURE_BYTES)])
                .into_owned();
            DeliveryOutcome {
                attempt,
                response_status: Some(status.as_u16()),
                response_body: Some(captured),
                error: None,
                success: status.is_success(),
                attempted_at: Utc::now(),
            }
        }
        Err(err) if err.is_timeout() => DeliveryOutcome {
            attempt,
            response_status: None,
            response_body: None,
            error: Some(format!("Timeout after {}ms", webhook.timeout_ms)),
            success: false,
            attempted_at: Utc::now(),
        },
        Err(err) => DeliveryOutcome {
            attempt,
            response_status: None,
            response_body: None,
            error: Some(err.to_string()),
            success: false,
            attempted_at: Utc::now(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_exponential_and_capped() {
        assert_eq!(backoff_delay_ms(1), 1000);
        assert_eq!(backoff_delay_ms(2), 2000);
        assert_eq!(backoff_delay_ms(3), 4000);
        assert_eq!(backoff_delay_ms(5), 16000);
        assert_eq!(backoff_delay_ms(6), 30000); // capped
        assert_eq!(backoff_delay_ms(20), 30000);
    }

    fn sample_webhook(url: &str) -> Webhook {
        Webhook {
            id: Uuid::new_v4(),
            owner_id: None,
            name: "test".into(),
            url: url.into(),
            secret: "s3cr3t".into(),
            subscribed_events: vec![],
            is_active: true,
            max_attempts: 3,
            timeout_ms: 2000,
            headers: Default::default(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_delivery_against_unreachable_host_reports_error() {
        let dispatcher = Dispatcher::new();
        let webhook = sample_webhook("http://127.0.0.1:1");
        let event = WebhookEvent::new(
            linkforty_core::types::WebhookEventKind::ClickEvent,
            serde_json::json!({}),
        );
        let result = dispatcher.test_delivery(&webhook, &event).await;
        assert!(result.response_status.is_none());
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn signature_header_matches_hmac_of_serialized_body() {
        let webhook = sample_webhook("http://127.0.0.1:1");
        let event = WebhookEvent::new(
            linkforty_core::types::WebhookEventKind::InstallEvent,
            serde_json::json!({"x": 1}),
        );
        let body = serde_json::to_vec(&event).unwrap();
        let sig = sign_body(&webhook.secret, &body);
        assert_eq!(sig.len(), 64);
    }

    #[tokio::test]
    async fn retries_after_503_and_succeeds_on_second_attempt() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let webhook = sample_webhook(&format!("{}/hook", server.uri()));
        let dispatcher = Dispatcher::new();
        let event = WebhookEvent::new(
            linkforty_core::types::WebhookEventKind::ClickEvent,
            serde_json::json!({"a": 1}),
        );
        let body = serde_json::to_vec(&event).unwrap();
        let outcome = run_attempts(&dispatcher.client, &webhook, &event, &body).await;

        assert!(outcome.success);
        assert_eq!(outcome.attempt, 2);
        assert_eq!(outcome.response_status, Some(200));
    }
}
