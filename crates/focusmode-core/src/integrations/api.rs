//! Focus API client -- submits earned XP and completed focus sessions.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use url::Url;

use super::keyring_store;
use super::traits::{RewardSink, StatisticsSink};
use crate::error::{ConfigError, SubmissionError};
use crate::storage::ApiConfig;

/// Keyring entry holding the bearer token.
pub const TOKEN_KEY: &str = "api_token";

const XP_PATH: &str = "api/User/xp";
const DAILY_STATISTICS_PATH: &str = "api/Statistics/daily";

/// Body of a daily statistics update. `id` and `userId` are assigned by
/// the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DailyStatistics {
    id: u64,
    user_id: String,
    date: String,
    total_focus_time: u64,
}

pub struct ApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    /// Build a client for `base_url`. A missing token is allowed; every
    /// submission then fails with `NotAuthenticated`.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url = Url::parse(&normalized).map_err(|e| ConfigError::InvalidValue {
            key: "api.base_url".into(),
            message: e.to_string(),
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                key: "api.timeout_secs".into(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// Build from configuration, reading the token from the OS keyring.
    pub fn from_config(config: &ApiConfig) -> Result<Self, ConfigError> {
        let token = keyring_store::get(TOKEN_KEY).ok().flatten();
        Self::new(
            &config.base_url,
            token,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), SubmissionError> {
        let token = self.token.as_deref().ok_or(SubmissionError::NotAuthenticated)?;
        let url = self
            .base_url
            .join(path)
            .map_err(|e| SubmissionError::Other(format!("invalid endpoint {path}: {e}")))?;

        let resp = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SubmissionError::Rejected {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        debug!(endpoint = path, status = status.as_u16(), "submission accepted");
        Ok(())
    }
}

#[async_trait]
impl RewardSink for ApiClient {
    async fn submit_points(&self, points: u64) -> Result<(), SubmissionError> {
        self.post_json(XP_PATH, &json!({ "xp": points })).await
    }
}

#[async_trait]
impl StatisticsSink for ApiClient {
    async fn submit_focus_session(
        &self,
        elapsed_seconds: u64,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), SubmissionError> {
        let body = DailyStatistics {
            id: 0,
            user_id: String::new(),
            date: occurred_at.to_rfc3339(),
            total_focus_time: elapsed_seconds,
        };
        self.post_json(DAILY_STATISTICS_PATH, &body).await
    }
}
