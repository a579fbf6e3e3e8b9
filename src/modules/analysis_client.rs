use futures::future::{BoxFuture, FutureExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::modules::capture::Frame;
use crate::modules::database::CaptureRecord;
use crate::modules::error::{LockInError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentDescription {
    pub timestamp: i64,
    pub description: String,
}

impl From<&CaptureRecord> for RecentDescription {
    fn from(record: &CaptureRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            description: record.description.clone(),
        }
    }
}

/// Wire body for the analysis endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest<'a> {
    pub screenshot: String,
    pub current_goal: Option<&'a str>,
    pub recent_descriptions: Vec<RecentDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisResponse {
    image_description: String,
    #[serde(default)]
    nudge: Option<String>,
    #[serde(default)]
    timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub description: String,
    pub nudge: Option<String>,
    /// Server-side analysis time, if it sent one.
    pub timestamp: Option<i64>,
}

impl From<AnalysisResponse> for Analysis {
    fn from(response: AnalysisResponse) -> Self {
        Self {
            description: response.image_description,
            nudge: normalize_nudge(response.nudge),
            timestamp: response.timestamp,
        }
    }
}

/// Remote judge of whether the user is on task.
pub trait AnalysisClient: Send + Sync {
    fn analyze<'a>(
        &'a self,
        frame: &'a Frame,
        goal: Option<&'a str>,
        recent: &'a [CaptureRecord],
    ) -> BoxFuture<'a, Result<Analysis>>;
}

/// Blank text and a literal "null" both mean "no nudge".
pub fn normalize_nudge(raw: Option<String>) -> Option<String> {
    let text = raw?;
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub struct HttpAnalysisClient {
    client: Client,
    endpoint: String,
}

impl HttpAnalysisClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(1)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether anything answers at the endpoint's origin. Any HTTP status
    /// counts; only transport failures do not.
    pub async fn test_connection(&self) -> bool {
        let origin = match url::Url::parse(&self.endpoint) {
            Ok(url) => url.origin().ascii_serialization(),
            Err(_) => return false,
        };
        self.client.get(origin).send().await.is_ok()
    }

    async fn post_analysis(
        &self,
        frame: &Frame,
        goal: Option<&str>,
        recent: &[CaptureRecord],
    ) -> Result<Analysis> {
        let body = AnalysisRequest {
            screenshot: frame.data_url(),
            current_goal: goal,
            recent_descriptions: recent.iter().map(RecentDescription::from).collect(),
        };

        log::debug!(
            "Sending screenshot for analysis ({} bytes, {} recent descriptions)",
            frame.png.len(),
            body.recent_descriptions.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| LockInError::Transport(format!("Failed to send screenshot: {}", e)))?;

        if !response.status().is_success() {
            return Err(LockInError::Transport(format!(
                "Analysis service returned {}",
                response.status()
            )));
        }

        let parsed: AnalysisResponse = response
            .json()
            .await
            .map_err(|e| LockInError::Transport(format!("Failed to parse analysis: {}", e)))?;

        log::debug!("Analysis received from server");
        Ok(parsed.into())
    }
}

impl AnalysisClient for HttpAnalysisClient {
    fn analyze<'a>(
        &'a self,
        frame: &'a Frame,
        goal: Option<&'a str>,
        recent: &'a [CaptureRecord],
    ) -> BoxFuture<'a, Result<Analysis>> {
        self.post_analysis(frame, goal, recent).boxed()
    }
}
