//! Process-wide configuration (§6.4).
//!
//! Follows the teacher's `config.rs` shape: a `serde`-deserializable TOML
//! struct with a `default_*()` function per optional field, loaded through
//! `Config::from_file` and wrapped in `anyhow::Context`.

use crate::error::Secret;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub server: ServerConfig,
    pub database_url: String,
    pub uploads_dir: String,
    pub relay: RelayConfig,
    pub preview: PreviewConfig,
    #[serde(default)]
    pub onvif: OnvifConfig,
    #[serde(default)]
    pub youtube_oauth: YoutubeOauthConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    #[serde(default = "default_web_port")]
    pub web_port: u16,

    #[serde(default = "default_bind_ip")]
    pub bind_ip: String,

    #[serde(default)]
    pub cors_allow_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelayConfig {
    #[serde(default = "default_relay_host")]
    pub rtmp_relay_host: String,

    #[serde(default = "default_relay_port")]
    pub rtmp_relay_port: u16,

    #[serde(default = "default_encoder_binary")]
    pub encoder_binary: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PreviewConfig {
    #[serde(default = "default_relay_host")]
    pub preview_rtmp_host: String,

    #[serde(default = "default_preview_rtmp_port")]
    pub preview_rtmp_port: u16,

    #[serde(default = "default_preview_hls_port")]
    pub preview_hls_port: u16,

    #[serde(default = "default_preview_api_port")]
    pub preview_api_port: u16,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OnvifConfig {
    /// Global ONVIF URL override (optional).
    #[serde(default)]
    pub onvif_device_url: Option<String>,

    #[serde(default)]
    pub ptz_debug: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct YoutubeOauthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Refresh token for the appliance's own connected YouTube account. The
    /// per-destination `oauth_refresh_token` field exists for forward
    /// compatibility with multiple connected accounts; today's engine holds
    /// one `YouTubeClient` for its process lifetime, so this is the
    /// credential that client actually uses.
    #[serde(default)]
    pub refresh_token: Option<Secret>,
}

fn default_web_port() -> u16 {
    8080
}
fn default_bind_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_relay_host() -> String {
    "127.0.0.1".to_string()
}
fn default_relay_port() -> u16 {
    1935
}
fn default_encoder_binary() -> String {
    "ffmpeg".to_string()
}
fn default_preview_rtmp_port() -> u16 {
    1936
}
fn default_preview_hls_port() -> u16 {
    8888
}
fn default_preview_api_port() -> u16 {
    9997
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    pub fn relay_publish_url(&self, camera_id: i64) -> String {
        format!(
            "rtmp://{}:{}/live/camera_{}",
            self.relay.rtmp_relay_host, self.relay.rtmp_relay_port, camera_id
        )
    }

    pub fn preview_hls_url(&self) -> String {
        format!(
            "http://{}:{}/preview/index.m3u8",
            self.preview.preview_rtmp_host, self.preview.preview_hls_port
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                web_port: default_web_port(),
                bind_ip: default_bind_ip(),
                cors_allow_origins: Vec::new(),
            },
            database_url: "sqlite://vistterstream.db".to_string(),
            uploads_dir: "./uploads".to_string(),
            relay: RelayConfig {
                rtmp_relay_host: default_relay_host(),
                rtmp_relay_port: default_relay_port(),
                encoder_binary: default_encoder_binary(),
            },
            preview: PreviewConfig {
                preview_rtmp_host: default_relay_host(),
                preview_rtmp_port: default_preview_rtmp_port(),
                preview_hls_port: default_preview_hls_port(),
                preview_api_port: default_preview_api_port(),
            },
            onvif: OnvifConfig::default(),
            youtube_oauth: YoutubeOauthConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.web_port, 8080);
        assert_eq!(config.relay.rtmp_relay_port, 1935);
    }

    #[test]
    fn relay_publish_url_is_deterministic_from_camera_id() {
        let config = Config::default();
        assert_eq!(
            config.relay_publish_url(7),
            "rtmp://127.0.0.1:1935/live/camera_7"
        );
    }

    #[test]
    fn parses_minimal_toml() {
        let toml_src = r#"
            database-url = "sqlite://test.db"
            uploads-dir = "./uploads"

            [server]
            web-port = 9090

            [relay]

            [preview]
        "#;
        let config: Config = toml::from_str(toml_src).unwrap();
        assert_eq!(config.server.web_port, 9090);
        assert_eq!(config.relay.rtmp_relay_port, 1935);
    }
}
