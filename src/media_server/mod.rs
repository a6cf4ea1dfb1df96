//! Local RTMP/HLS Server (§4.3) — admin-query client.
//!
//! The engine does not embed an RTMP/HLS server; it talks to one running
//! alongside it (its admin API on `preview_api_port`) the same way the
//! YouTube API client in the pack's reference example talks to a remote
//! service: a thin `reqwest`-backed client with a short timeout and typed
//! errors, never a raw socket.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum MediaServerError {
    #[error("local RTMP/HLS server unreachable: {0}")]
    Unreachable(String),
    #[error("local RTMP/HLS server returned malformed admin response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivePath {
    pub name: String,
    pub ready: bool,
    pub readers: u32,
}

/// `preview.health()`'s `active_streams[]`.
#[derive(Debug, Clone)]
pub struct ServerHealth {
    pub healthy: bool,
    pub active_paths: Vec<ActivePath>,
}

pub struct MediaServerClient {
    http: Client,
    admin_base_url: String,
    rtmp_host: String,
    hls_port: u16,
}

impl MediaServerClient {
    pub fn new(rtmp_host: String, hls_port: u16, admin_api_port: u16) -> Self {
        let http = Client::builder()
            .timeout(HEALTH_PROBE_TIMEOUT)
            .build()
            .expect("reqwest client construction with a fixed timeout never fails");
        Self {
            http,
            admin_base_url: format!("http://{}:{}", rtmp_host, admin_api_port),
            rtmp_host,
            hls_port,
        }
    }

    pub fn preview_hls_url(&self) -> String {
        format!("http://{}:{}/preview/index.m3u8", self.rtmp_host, self.hls_port)
    }

    pub fn relay_hls_url(&self, camera_id: i64) -> String {
        format!("http://{}:{}/live/camera_{}/index.m3u8", self.rtmp_host, self.hls_port, camera_id)
    }

    /// Probed by the Stream Router before entering preview mode (§4.3's
    /// contract: "the Stream Router must probe it before entering preview
    /// mode").
    pub async fn health(&self) -> ServerHealth {
        match self.active_paths().await {
            Ok(paths) => ServerHealth { healthy: true, active_paths: paths },
            Err(_) => ServerHealth { healthy: false, active_paths: Vec::new() },
        }
    }

    /// Administrative query: which paths are currently being published.
    pub async fn active_paths(&self) -> Result<Vec<ActivePath>, MediaServerError> {
        let url = format!("{}/v3/paths/list", self.admin_base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| MediaServerError::Unreachable(e.to_string()))?;

        #[derive(Deserialize)]
        struct PathsList {
            items: Vec<ActivePath>,
        }

        let parsed: PathsList = response
            .json()
            .await
            .map_err(|e| MediaServerError::MalformedResponse(e.to_string()))?;
        Ok(parsed.items)
    }

    pub async fn is_path_publishing(&self, path: &str) -> bool {
        self.active_paths()
            .await
            .map(|paths| paths.iter().any(|p| p.name == path && p.ready))
            .unwrap_or(false)
    }
}
