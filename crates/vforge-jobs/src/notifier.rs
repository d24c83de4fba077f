//! Terminal-state webhook delivery.

use std::time::Duration;

use tracing::{info, warn};
use vforge_models::{WebhookPayload, WebhookTarget};

use crate::error::{JobsError, JobsResult};

/// Receives a notification whenever a job with a webhook reaches a terminal state.
///
/// Implementations must not block the caller; delivery failures are theirs to log.
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send + Sync {
    fn notify(&self, target: WebhookTarget, payload: WebhookPayload);
}

/// Posts webhook payloads as JSON, once, in a background task.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> JobsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| JobsError::Notification(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Deliver a payload and wait for the receiver's answer.
    pub async fn deliver(&self, target: &WebhookTarget, payload: &WebhookPayload) -> JobsResult<()> {
        let mut request = self.client.post(&target.url).json(payload);
        if let Some(header) = &target.header {
            request = request.header(header.key.as_str(), header.value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| JobsError::Notification(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(JobsError::Notification(format!(
                "webhook returned status {}",
                status.as_u16()
            )));
        }

        info!(job_id = %payload.job_id, status = %payload.status, "Webhook delivered");
        Ok(())
    }
}

impl NotificationSink for WebhookNotifier {
    fn notify(&self, target: WebhookTarget, payload: WebhookPayload) {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.deliver(&target, &payload).await {
                warn!(
                    job_id = %payload.job_id,
                    url = %target.url,
                    "Webhook delivery failed: {}", e
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vforge_models::WebhookHeader;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload() -> WebhookPayload {
        WebhookPayload {
            job_id: "job-1".to_string(),
            status: "completed".to_string(),
            s3_url: Some("https://cdn.test/combined/job-1/job-1.mp4".to_string()),
            error: None,
            timestamp: "2024-05-01T12:00:00Z".to_string(),
        }
    }

    fn target(server: &MockServer) -> WebhookTarget {
        WebhookTarget {
            url: format!("{}/hook", server.uri()),
            header: Some(WebhookHeader {
                key: "X-Webhook-Secret".to_string(),
                value: "s3cret".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_deliver_posts_json_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(header("x-webhook-secret", "s3cret"))
            .and(header("user-agent", concat!("vforge/", env!("CARGO_PKG_VERSION"))))
            .and(body_json(payload()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(Duration::from_secs(5)).unwrap();
        notifier.deliver(&target(&server), &payload()).await.unwrap();
    }

    #[tokio::test]
    async fn test_deliver_non_2xx_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(Duration::from_secs(5)).unwrap();
        let err = notifier.deliver(&target(&server), &payload()).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_notify_delivers_in_background() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(Duration::from_secs(5)).unwrap();
        notifier.notify(target(&server), payload());

        for _ in 0..100 {
            if !server.received_requests().await.unwrap_or_default().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("webhook was never delivered");
    }
}
