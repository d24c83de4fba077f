//! Terminal-state webhook types.

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::job::Job;

/// A custom header sent with webhook requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WebhookHeader {
    pub key: String,
    pub value: String,
}

/// Webhook destination attached to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WebhookTarget {
    /// URL receiving the POST
    pub url: String,
    /// Optional extra header (e.g. an API key for the receiver)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<WebhookHeader>,
}

impl WebhookTarget {
    /// Build a target from optional request fields. Empty URLs yield `None`.
    pub fn from_parts(url: Option<String>, header: Option<WebhookHeader>) -> Option<Self> {
        url.filter(|u| !u.trim().is_empty())
            .map(|url| Self { url, header })
    }
}

/// JSON body delivered to the webhook when a job reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct WebhookPayload {
    pub job_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC3339 UTC timestamp of delivery
    pub timestamp: String,
}

impl WebhookPayload {
    /// Snapshot the terminal fields of a job.
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status.as_str().to_string(),
            s3_url: job.s3_url.clone(),
            error: job.error.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}
