//! `YouTubeClient` — the injected collaborator of §4.8. A trait so
//! `DestinationLifecycle`'s reconciliation algorithm is unit-testable
//! without OAuth or network access; the real implementation talks to the
//! YouTube Live Streaming API the way the pack's reference broadcast client
//! does (status polling, explicit transition calls, refresh-on-401).

use crate::error::Secret;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastStatus {
    Created,
    Ready,
    Testing,
    Live,
    Complete,
    Revoked,
}

#[derive(Debug, Error)]
pub enum YouTubeClientError {
    #[error("YouTube API request failed: {0}")]
    Request(String),
    #[error("YouTube API returned an unexpected response: {0}")]
    MalformedResponse(String),
    #[error("YouTube OAuth token refresh failed")]
    TokenRefreshFailed,
    #[error("no YouTube OAuth credentials configured for this appliance")]
    NotConfigured,
}

#[async_trait]
pub trait YouTubeClient: Send + Sync {
    async fn get_broadcast_status(&self, broadcast_id: &str) -> Result<BroadcastStatus, YouTubeClientError>;
    async fn transition_broadcast(&self, broadcast_id: &str, to: BroadcastStatus) -> Result<(), YouTubeClientError>;
}

/// Obtains and caches an access token from a stored OAuth refresh token,
/// per §6.4's `youtube_oauth_*` fallback credentials.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, YouTubeClientError>;
    async fn refresh(&self) -> Result<String, YouTubeClientError>;
}

pub struct HttpYouTubeClient {
    http: Client,
    base_url: String,
    token_provider: Arc<dyn AccessTokenProvider>,
    cached_token: RwLock<Option<String>>,
}

impl HttpYouTubeClient {
    pub fn new(base_url: String, token_provider: Arc<dyn AccessTokenProvider>) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client construction with a fixed timeout never fails"),
            base_url,
            token_provider,
            cached_token: RwLock::new(None),
        }
    }

    async fn token(&self) -> Result<String, YouTubeClientError> {
        if let Some(token) = self.cached_token.read().await.clone() {
            return Ok(token);
        }
        let token = self.token_provider.access_token().await?;
        *self.cached_token.write().await = Some(token.clone());
        Ok(token)
    }

    /// Retries exactly once on 401, refreshing the token first, per §4.8's
    /// token-refresh policy.
    async fn send_with_retry(
        &self,
        build: impl Fn(&str) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, YouTubeClientError> {
        let token = self.token().await?;
        let response = build(&token)
            .send()
            .await
            .map_err(|e| YouTubeClientError::Request(e.to_string()))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let refreshed = self.token_provider.refresh().await?;
        *self.cached_token.write().await = Some(refreshed.clone());
        build(&refreshed)
            .send()
            .await
            .map_err(|e| YouTubeClientError::Request(e.to_string()))
    }
}

#[async_trait]
impl YouTubeClient for HttpYouTubeClient {
    async fn get_broadcast_status(&self, broadcast_id: &str) -> Result<BroadcastStatus, YouTubeClientError> {
        let url = format!("{}/liveBroadcasts?id={}", self.base_url, broadcast_id);
        let response = self
            .send_with_retry(|token| self.http.get(&url).bearer_auth(token))
            .await?;

        #[derive(serde::Deserialize)]
        struct Item {
            status: ItemStatus,
        }
        #[derive(serde::Deserialize)]
        struct ItemStatus {
            #[serde(rename = "lifeCycleStatus")]
            life_cycle_status: BroadcastStatus,
        }
        #[derive(serde::Deserialize)]
        struct ListResponse {
            items: Vec<Item>,
        }

        let parsed: ListResponse = response
            .json()
            .await
            .map_err(|e| YouTubeClientError::MalformedResponse(e.to_string()))?;
        parsed
            .items
            .into_iter()
            .next()
            .map(|i| i.status.life_cycle_status)
            .ok_or_else(|| YouTubeClientError::MalformedResponse("empty items list".to_string()))
    }

    async fn transition_broadcast(&self, broadcast_id: &str, to: BroadcastStatus) -> Result<(), YouTubeClientError> {
        let status_param = match to {
            BroadcastStatus::Testing => "testing",
            BroadcastStatus::Live => "live",
            BroadcastStatus::Complete => "complete",
            _ => return Err(YouTubeClientError::MalformedResponse("unsupported transition target".to_string())),
        };
        let url = format!(
            "{}/liveBroadcasts/transition?broadcastStatus={}&id={}",
            self.base_url, status_param, broadcast_id
        );
        let response = self
            .send_with_retry(|token| self.http.post(&url).bearer_auth(token))
            .await?;

        if !response.status().is_success() {
            return Err(YouTubeClientError::Request(format!("status {}", response.status())));
        }
        Ok(())
    }
}

/// Refreshes an access token from a standing OAuth refresh token via
/// Google's token endpoint, per §6.4's `youtube-oauth` config block. A
/// single instance is shared across all YouTube destinations reconciled by
/// this process — the engine keeps one app-level OAuth client, not a
/// separate one per destination.
pub struct GoogleOAuthTokenProvider {
    http: Client,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    refresh_token: Secret,
}

impl GoogleOAuthTokenProvider {
    pub fn new(client_id: String, client_secret: String, refresh_token: Secret) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client construction with a fixed timeout never fails"),
            token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
            client_id,
            client_secret,
            refresh_token,
        }
    }
}

#[async_trait]
impl AccessTokenProvider for GoogleOAuthTokenProvider {
    async fn access_token(&self) -> Result<String, YouTubeClientError> {
        self.refresh().await
    }

    async fn refresh(&self) -> Result<String, YouTubeClientError> {
        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.expose()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| YouTubeClientError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(YouTubeClientError::TokenRefreshFailed);
        }

        response
            .json::<TokenResponse>()
            .await
            .map(|t| t.access_token)
            .map_err(|e| YouTubeClientError::MalformedResponse(e.to_string()))
    }
}

/// Used when the appliance has no YouTube OAuth credentials configured.
/// Every destination reconciliation against it returns a failed status
/// lookup, which `DestinationLifecycle::reconcile` turns into a `Warning`
/// rather than blocking `GoLive` — reconciliation is best-effort.
pub struct NullYouTubeClient;

#[async_trait]
impl YouTubeClient for NullYouTubeClient {
    async fn get_broadcast_status(&self, _broadcast_id: &str) -> Result<BroadcastStatus, YouTubeClientError> {
        Err(YouTubeClientError::NotConfigured)
    }

    async fn transition_broadcast(&self, _broadcast_id: &str, _to: BroadcastStatus) -> Result<(), YouTubeClientError> {
        Err(YouTubeClientError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct StaticTokenProvider;

    #[async_trait]
    impl AccessTokenProvider for StaticTokenProvider {
        async fn access_token(&self) -> Result<String, YouTubeClientError> {
            Ok("token-1".to_string())
        }
        async fn refresh(&self) -> Result<String, YouTubeClientError> {
            Ok("token-2".to_string())
        }
    }

    #[tokio::test]
    async fn retries_once_on_401_with_refreshed_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/liveBroadcasts"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/liveBroadcasts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [{"status": {"lifeCycleStatus": "testing"}}]
            })))
            .mount(&server)
            .await;

        let client = HttpYouTubeClient::new(server.uri(), Arc::new(StaticTokenProvider));
        let status = client.get_broadcast_status("b1").await.unwrap();
        assert_eq!(status, BroadcastStatus::Testing);
    }
}
