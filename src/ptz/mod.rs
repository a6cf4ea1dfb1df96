//! PTZ Controller (§4.4): ONVIF SOAP-over-HTTP with WS-Security digest auth.
//!
//! Grounded on the pack's `reqwest`-based device-control clients (the
//! Hikvision/Dahua logic module's request/response shape) for the overall
//! client structure, and on the YouTube API reference client for the
//! "typed errors + retry-once" posture. Endpoint discovery and the SOAP
//! envelope builders are pure/isolated so they are testable without a real
//! camera.

mod envelope;

pub use envelope::{build_ws_security_header, soap_envelope};

use crate::error::Secret;
use crate::model::{Camera, Preset, PtzCoordinates};
use rand::RngCore;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const DISCOVERY_PORTS: [u16; 3] = [8899, 80, 8000];
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const OPERATION_TIMEOUT: Duration = Duration::from_secs(10);
/// Default mechanical-settling delay after a motion operation acknowledges.
pub const DEFAULT_SETTLING_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum PtzError {
    #[error("camera {camera_id} PTZ endpoint unreachable")]
    Unreachable { camera_id: i64 },
    #[error("camera {camera_id} rejected PTZ credentials")]
    AuthFailed { camera_id: i64 },
    #[error("camera {camera_id} does not support the requested PTZ profile")]
    UnsupportedProfile { camera_id: i64 },
    #[error("camera {camera_id} PTZ operation timed out")]
    Timeout { camera_id: i64 },
}

pub struct PtzController {
    http: Client,
    settling_delay: Duration,
    /// Endpoint cache: first discovered URL per camera, for the process
    /// lifetime, per §4.4's "cache the first success" contract.
    endpoint_cache: RwLock<HashMap<i64, String>>,
}

impl PtzController {
    pub fn new() -> Self {
        Self {
            http: Client::builder()
                .timeout(OPERATION_TIMEOUT)
                .build()
                .expect("reqwest client construction with a fixed timeout never fails"),
            settling_delay: DEFAULT_SETTLING_DELAY,
            endpoint_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_settling_delay(mut self, delay: Duration) -> Self {
        self.settling_delay = delay;
        self
    }

    /// Resolves and caches the device service URL for a camera: explicit
    /// override first, then discovery across `DISCOVERY_PORTS`.
    async fn resolve_endpoint(&self, camera: &Camera, global_override: Option<&str>) -> Result<String, PtzError> {
        if let Some(cached) = self.endpoint_cache.read().await.get(&camera.id) {
            return Ok(cached.clone());
        }

        if let Some(explicit) = camera.onvif_device_url.as_deref().or(global_override) {
            self.endpoint_cache.write().await.insert(camera.id, explicit.to_string());
            return Ok(explicit.to_string());
        }

        let mut ports = Vec::new();
        if let Some(port) = camera.onvif_port_override {
            ports.push(port);
        }
        ports.extend(DISCOVERY_PORTS);

        for port in ports {
            let candidate = format!("http://{}:{}/onvif/device_service", camera.host, port);
            let probe = self
                .http
                .get(&candidate)
                .timeout(PROBE_TIMEOUT)
                .send()
                .await;
            if probe.is_ok() {
                debug!(camera_id = camera.id, url = %candidate, "ONVIF endpoint discovered");
                self.endpoint_cache.write().await.insert(camera.id, candidate.clone());
                return Ok(candidate);
            }
        }

        warn!(camera_id = camera.id, "ONVIF endpoint discovery exhausted all ports");
        Err(PtzError::Unreachable { camera_id: camera.id })
    }

    /// One retry on auth failure (§7): a fresh nonce/digest is built per
    /// attempt, since a stale nonce is the usual cause of a spurious 401.
    async fn send_soap(
        &self,
        camera: &Camera,
        endpoint: &str,
        soap_action: &str,
        body: &str,
    ) -> Result<String, PtzError> {
        const MAX_ATTEMPTS: u32 = 2;

        for attempt in 1..=MAX_ATTEMPTS {
            let nonce = random_nonce();
            let created = chrono::Utc::now().to_rfc3339();
            let security_header =
                build_ws_security_header(&camera.username, camera.password.expose(), &nonce, &created);
            let envelope = soap_envelope(&security_header, body);

            let response = self
                .http
                .post(endpoint)
                .header("Content-Type", "application/soap+xml; charset=utf-8")
                .header("SOAPAction", soap_action)
                .body(envelope)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        PtzError::Timeout { camera_id: camera.id }
                    } else {
                        PtzError::Unreachable { camera_id: camera.id }
                    }
                })?;

            if response.status() == reqwest::StatusCode::UNAUTHORIZED {
                if attempt < MAX_ATTEMPTS {
                    warn!(camera_id = camera.id, attempt, "ONVIF auth failed, retrying once with a fresh nonce");
                    continue;
                }
                return Err(PtzError::AuthFailed { camera_id: camera.id });
            }
            if response.status() == reqwest::StatusCode::NOT_IMPLEMENTED {
                return Err(PtzError::UnsupportedProfile { camera_id: camera.id });
            }

            return response
                .text()
                .await
                .map_err(|_| PtzError::Unreachable { camera_id: camera.id });
        }

        Err(PtzError::AuthFailed { camera_id: camera.id })
    }

    /// `MoveToPreset(camera, preset)` — absolute-move then GotoPreset.
    pub async fn move_to_preset(
        &self,
        camera: &Camera,
        preset: &Preset,
        global_endpoint_override: Option<&str>,
    ) -> Result<(), PtzError> {
        let endpoint = self.resolve_endpoint(camera, global_endpoint_override).await?;

        let absolute_move = envelope::absolute_move_body(&preset.coordinates);
        self.send_soap(camera, &endpoint, "AbsoluteMove", &absolute_move).await?;

        let goto_preset = envelope::goto_preset_body(&preset.device_token());
        self.send_soap(camera, &endpoint, "GotoPreset", &goto_preset).await?;

        tokio::time::sleep(self.settling_delay).await;
        Ok(())
    }

    /// `SetPreset(camera, name, coords)` → device token (falls back to the
    /// caller-supplied id-as-string when the device omits one).
    pub async fn set_preset(
        &self,
        camera: &Camera,
        name: &str,
        coords: PtzCoordinates,
        fallback_token: &str,
        global_endpoint_override: Option<&str>,
    ) -> Result<String, PtzError> {
        let endpoint = self.resolve_endpoint(camera, global_endpoint_override).await?;

        let absolute_move = envelope::absolute_move_body(&coords);
        self.send_soap(camera, &endpoint, "AbsoluteMove", &absolute_move).await?;

        let set_preset = envelope::set_preset_body(name);
        let response = self.send_soap(camera, &endpoint, "SetPreset", &set_preset).await?;

        tokio::time::sleep(self.settling_delay).await;

        Ok(envelope::extract_preset_token(&response).unwrap_or_else(|| fallback_token.to_string()))
    }

    /// `GetStatus(camera) → (pan, tilt, zoom)`.
    pub async fn get_status(
        &self,
        camera: &Camera,
        global_endpoint_override: Option<&str>,
    ) -> Result<PtzCoordinates, PtzError> {
        let endpoint = self.resolve_endpoint(camera, global_endpoint_override).await?;
        let body = envelope::get_status_body();
        let response = self.send_soap(camera, &endpoint, "GetStatus", &body).await?;
        envelope::extract_position(&response).ok_or(PtzError::UnsupportedProfile { camera_id: camera.id })
    }

    /// `CapturePosition(camera) → coords` — read-only form of `GetStatus`.
    pub async fn capture_position(
        &self,
        camera: &Camera,
        global_endpoint_override: Option<&str>,
    ) -> Result<PtzCoordinates, PtzError> {
        self.get_status(camera, global_endpoint_override).await
    }
}

impl Default for PtzController {
    fn default() -> Self {
        Self::new()
    }
}

fn random_nonce() -> [u8; 16] {
    let mut nonce = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}
