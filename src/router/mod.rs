//! Stream Router (§4.7): the only component permitted to start a Timeline
//! Executor, enforcing the ≤1-active-execution invariant and serializing
//! mode transitions behind a single mutex (§5's explicit "no two
//! transitions interleave" rule).

use crate::destinations::{DestinationLifecycle, ReconciliationOutcome};
use crate::events::{Event, EventBus};
use crate::media_server::MediaServerClient;
use crate::model::{Destination, DestinationId, TimelineId};
use crate::timeline::{OutputTarget, TimelineExecutor, TimelineHandle, TimelineRunRequest};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Mode {
    Idle,
    Preview,
    Live,
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("StartPreview is only valid from IDLE, router is in {0:?}")]
    NotIdle(Mode),
    #[error("GoLive is only valid from PREVIEW, router is in {0:?}")]
    NotPreview(Mode),
    #[error("Stop is only valid from PREVIEW or LIVE, router is in {0:?}")]
    NotActive(Mode),
    #[error("local RTMP/HLS server is unhealthy")]
    ServerUnhealthy,
    #[error("destination list must not be empty")]
    EmptyDestinations,
    #[error(transparent)]
    Timeline(#[from] crate::timeline::TimelineError),
}

struct RouterState {
    mode: Mode,
    timeline_id: Option<TimelineId>,
    handle: Option<TimelineHandle>,
}

pub struct StreamRouter {
    executor: Arc<TimelineExecutor>,
    media_server: Arc<MediaServerClient>,
    destinations: Arc<DestinationLifecycle>,
    bus: Arc<EventBus>,
    state: Mutex<RouterState>,
}

impl StreamRouter {
    pub fn new(
        executor: Arc<TimelineExecutor>,
        media_server: Arc<MediaServerClient>,
        destinations: Arc<DestinationLifecycle>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            executor,
            media_server,
            destinations,
            bus,
            state: Mutex::new(RouterState { mode: Mode::Idle, timeline_id: None, handle: None }),
        }
    }

    pub async fn mode(&self) -> Mode {
        self.state.lock().await.mode
    }

    pub async fn active_timeline_id(&self) -> Option<TimelineId> {
        self.state.lock().await.timeline_id
    }

    pub async fn playback_position(&self) -> Option<crate::timeline::PlaybackPosition> {
        self.state.lock().await.handle.as_ref().and_then(|h| h.position())
    }

    /// `preview.health()` — the local RTMP/HLS server's own health, probed
    /// on demand rather than cached.
    pub async fn server_health(&self) -> crate::media_server::ServerHealth {
        self.media_server.health().await
    }

    pub fn preview_hls_url(&self) -> String {
        self.media_server.preview_hls_url()
    }

    /// `StartPreview(timeline_id)` — valid from IDLE.
    pub async fn start_preview(&self, mut request: TimelineRunRequest) -> Result<String, RouterError> {
        let mut state = self.state.lock().await;
        if state.mode != Mode::Idle {
            return Err(RouterError::NotIdle(state.mode));
        }

        let health = self.media_server.health().await;
        if !health.healthy {
            return Err(RouterError::ServerUnhealthy);
        }

        let hls_mount_url = format!(
            "rtmp://preview-mount/preview/{}",
            request.timeline.id
        );
        request.output = OutputTarget::Preview { hls_mount_url: hls_mount_url.clone() };
        let timeline_id = request.timeline.id;

        let handle = self.executor.start(request).await?;
        state.mode = Mode::Preview;
        state.timeline_id = Some(timeline_id);
        state.handle = Some(handle);
        self.bus.publish(Event::ModeChanged { mode: Mode::Preview });
        info!(timeline_id, "router entered PREVIEW");

        Ok(self.media_server.preview_hls_url())
    }

    /// `GoLive(destination_ids)` — valid from PREVIEW. `PREVIEW → IDLE →
    /// LIVE`; the IDLE window is observable per §4.7.
    pub async fn go_live(
        &self,
        destinations: Vec<Destination>,
        mut rebuild: impl FnMut(OutputTarget) -> TimelineRunRequest,
    ) -> Result<Vec<DestinationId>, RouterError> {
        if destinations.is_empty() {
            return Err(RouterError::EmptyDestinations);
        }

        let mut state = self.state.lock().await;
        if state.mode != Mode::Preview {
            return Err(RouterError::NotPreview(state.mode));
        }

        if let Some(handle) = state.handle.take() {
            handle.stop().await;
        }
        state.mode = Mode::Idle;
        state.timeline_id = None;
        self.bus.publish(Event::ModeChanged { mode: Mode::Idle });

        for destination in &destinations {
            match self.destinations.reconcile(destination).await {
                ReconciliationOutcome::Ready | ReconciliationOutcome::Skipped => {}
                ReconciliationOutcome::Warning(reason) => {
                    warn!(destination_id = destination.id, reason, "destination reconciliation warned, proceeding anyway");
                }
            }
        }

        let urls: Vec<String> = destinations.iter().map(|d| d.full_rtmp_url()).collect();
        let ids: Vec<DestinationId> = destinations.iter().map(|d| d.id).collect();
        let request = rebuild(OutputTarget::Destinations(urls));
        let timeline_id = request.timeline.id;

        let handle = self.executor.start(request).await?;
        state.mode = Mode::Live;
        state.timeline_id = Some(timeline_id);
        state.handle = Some(handle);
        self.bus.publish(Event::ModeChanged { mode: Mode::Live });
        info!(timeline_id, "router entered LIVE");

        Ok(ids)
    }

    /// `Stop()` — valid from PREVIEW or LIVE; idempotent when already IDLE
    /// per testable property S6.
    pub async fn stop(&self) -> Result<(), RouterError> {
        let mut state = self.state.lock().await;
        if state.mode == Mode::Idle {
            return Ok(());
        }

        if let Some(handle) = state.handle.take() {
            handle.stop().await;
        }
        state.mode = Mode::Idle;
        state.timeline_id = None;
        self.bus.publish(Event::ModeChanged { mode: Mode::Idle });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_equality() {
        assert_eq!(Mode::Idle, Mode::Idle);
        assert_ne!(Mode::Idle, Mode::Preview);
    }
}
