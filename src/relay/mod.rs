//! RTMP Relay Pool (§4.2).
//!
//! Maintains exactly one persistent relay process per active camera,
//! republishing RTSP (TCP transport) losslessly (stream copy) to a local
//! RTMP mount point. Grounded on `ephyr`'s `RestreamersPool` (a `HashMap` of
//! per-id supervised subprocesses, reconciled against desired state) and on
//! the teacher's per-camera `tokio::spawn` supervisor pattern in `main.rs`.

mod backoff;

pub use backoff::BackoffSequence;

use crate::encoder::{EncoderDriver, EncoderEvent, EncoderSpec};
use crate::events::{Event, EventBus};
use crate::model::{Camera, CameraId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RelayStatus {
    Idle,
    Starting,
    Publishing,
    Degraded,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("no relay exists for camera {0}")]
    NotFound(CameraId),
}

/// §4.2's second DEGRADED trigger: no encoder stderr activity at all for
/// this long.
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
struct RelayState {
    status: RelayStatus,
    publish_url: String,
}

/// Builds the argv for a lossless (stream-copy) RTSP→RTMP relay. A pure
/// function so cue/camera-to-argv mapping is testable without spawning a
/// process, per SPEC_FULL's §4.1a.
pub fn build_relay_argv(encoder_binary: &str, camera: &Camera, publish_url: &str) -> Vec<String> {
    vec![
        encoder_binary.to_string(),
        "-rtsp_transport".to_string(),
        "tcp".to_string(),
        "-i".to_string(),
        camera.rtsp_url_with_credentials(),
        "-c".to_string(),
        "copy".to_string(),
        "-f".to_string(),
        "flv".to_string(),
        publish_url.to_string(),
    ]
}

pub struct RelayPool {
    driver: Arc<EncoderDriver>,
    bus: Arc<EventBus>,
    encoder_binary: String,
    startup_timeout: Duration,
    states: RwLock<HashMap<CameraId, RelayState>>,
    stop_signals: RwLock<HashMap<CameraId, Arc<Notify>>>,
}

impl RelayState {
    fn new(publish_url: String) -> Self {
        Self { status: RelayStatus::Idle, publish_url }
    }
}

impl RelayPool {
    pub fn new(driver: Arc<EncoderDriver>, bus: Arc<EventBus>, encoder_binary: String) -> Self {
        Self {
            driver,
            bus,
            encoder_binary,
            startup_timeout: Duration::from_secs(10),
            states: RwLock::new(HashMap::new()),
            stop_signals: RwLock::new(HashMap::new()),
        }
    }

    pub fn status(&self, camera_id: CameraId) -> Option<RelayStatus> {
        self.states.read().get(&camera_id).map(|s| s.status)
    }

    pub fn publish_url(&self, camera_id: CameraId) -> Option<String> {
        self.states.read().get(&camera_id).map(|s| s.publish_url.clone())
    }

    /// StartAll() — enumerate cameras and ensure each has a relay.
    pub fn start_all(self: &Arc<Self>, cameras: &[(Camera, String)]) {
        for (camera, publish_url) in cameras {
            self.ensure_started(camera.clone(), publish_url.clone());
        }
    }

    /// EnsureStarted(camera) — idempotent.
    pub fn ensure_started(self: &Arc<Self>, camera: Camera, publish_url: String) {
        {
            let mut states = self.states.write();
            if let Some(existing) = states.get(&camera.id) {
                if !matches!(existing.status, RelayStatus::Failed) {
                    debug!(camera_id = camera.id, "relay already running, EnsureStarted is a no-op");
                    return;
                }
            }
            states.insert(camera.id, RelayState::new(publish_url.clone()));
        }

        let notify = Arc::new(Notify::new());
        self.stop_signals.write().insert(camera.id, notify.clone());

        let pool = self.clone();
        tokio::spawn(async move {
            pool.supervise(camera, publish_url, notify).await;
        });
    }

    /// Stop(camera_id) — terminate relay, mark offline.
    pub fn stop(&self, camera_id: CameraId) -> Result<(), RelayError> {
        let notify = self
            .stop_signals
            .read()
            .get(&camera_id)
            .cloned()
            .ok_or(RelayError::NotFound(camera_id))?;
        notify.notify_waiters();
        Ok(())
    }

    fn set_status(&self, camera_id: CameraId, status: RelayStatus) {
        if let Some(state) = self.states.write().get_mut(&camera_id) {
            state.status = status;
        }
        self.bus.publish(Event::RelayStateChanged { camera_id, state: status });
    }

    /// Per-camera supervisor loop: state machine of §4.2, restart on failure
    /// with exponential backoff (2s,4s,8s,16s,32s,60s,60s,...), reset after
    /// 60s of sustained PUBLISHING.
    async fn supervise(self: Arc<Self>, camera: Camera, publish_url: String, stop: Arc<Notify>) {
        let mut backoff = BackoffSequence::new();

        loop {
            self.set_status(camera.id, RelayStatus::Starting);
            let argv = build_relay_argv(&self.encoder_binary, &camera, &publish_url);
            let spec = EncoderSpec {
                argv,
                working_dir: None,
                startup_timeout: self.startup_timeout,
            };

            let handle = match self.driver.start(spec) {
                Ok(h) => h,
                Err(e) => {
                    warn!(camera_id = camera.id, error = %e, "failed to spawn relay process");
                    self.set_status(camera.id, RelayStatus::Failed);
                    if self.wait_backoff_or_stop(backoff.next(), &stop).await {
                        return;
                    }
                    continue;
                }
            };

            let published_at = self.run_until_exit(camera.id, handle, &stop).await;
            if published_at.stopped {
                self.set_status(camera.id, RelayStatus::Idle);
                return;
            }

            self.set_status(camera.id, RelayStatus::Failed);
            if published_at.sustained_publishing {
                backoff.reset();
            }
            if self.wait_backoff_or_stop(backoff.next(), &stop).await {
                return;
            }
        }
    }

    async fn wait_backoff_or_stop(&self, delay: Duration, stop: &Arc<Notify>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = stop.notified() => true,
        }
    }

    async fn run_until_exit(
        &self,
        camera_id: CameraId,
        mut handle: crate::encoder::EncoderHandle,
        stop: &Arc<Notify>,
    ) -> RunOutcome {
        let mut zero_fps_ticks = 0u32;
        let mut publishing_since: Option<Instant> = None;

        loop {
            tokio::select! {
                event = handle.events.recv() => {
                    match event {
                        Some(EncoderEvent::FirstFrame) => {
                            self.set_status(camera_id, RelayStatus::Publishing);
                            publishing_since = Some(Instant::now());
                        }
                        Some(EncoderEvent::ProgressTick { fps, .. }) => {
                            if fps == 0.0 {
                                zero_fps_ticks += 1;
                                if zero_fps_ticks >= 2 {
                                    self.set_status(camera_id, RelayStatus::Degraded);
                                }
                            } else {
                                if zero_fps_ticks >= 2 {
                                    self.set_status(camera_id, RelayStatus::Publishing);
                                }
                                zero_fps_ticks = 0;
                            }
                        }
                        Some(EncoderEvent::StartupError) => {
                            handle.stop(Duration::from_secs(5));
                        }
                        Some(EncoderEvent::Exited(_)) | None => {
                            let sustained = publishing_since
                                .map(|t| t.elapsed() >= Duration::from_secs(60))
                                .unwrap_or(false);
                            return RunOutcome { stopped: false, sustained_publishing: sustained };
                        }
                        _ => {}
                    }
                }
                _ = stop.notified() => {
                    handle.stop(Duration::from_secs(5));
                    // Drain until the process actually exits so no zombie
                    // remains, then report a clean stop.
                    while let Some(event) = handle.events.recv().await {
                        if matches!(event, EncoderEvent::Exited(_)) {
                            break;
                        }
                    }
                    info!(camera_id, "relay stopped on request");
                    return RunOutcome { stopped: true, sustained_publishing: false };
                }
                _ = tokio::time::sleep(IDLE_TIMEOUT) => {
                    warn!(camera_id, "no encoder stderr activity for {}s, marking relay degraded", IDLE_TIMEOUT.as_secs());
                    self.set_status(camera_id, RelayStatus::Degraded);
                }
            }
        }
    }
}

struct RunOutcome {
    stopped: bool,
    sustained_publishing: bool,
}
