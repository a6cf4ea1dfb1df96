//! Event Bus (§2 component 9, §4.6.5, §4.8): in-memory publication of
//! executor/position/health events. Consumers subscribe with
//! `EventBus::subscribe` and receive a `tokio::sync::broadcast::Receiver`;
//! a slow consumer lags rather than blocking publishers, the same trade-off
//! the teacher's `FrameDistributor` makes for video frames.

use crate::model::{CameraId, DestinationId, TimelineId};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum Event {
    // Encoder Driver (§4.1) — namespaced by handle id so consumers can
    // correlate with the relay or timeline that owns the handle.
    EncoderStarted { handle_id: u64 },
    EncoderFirstFrame { handle_id: u64 },
    EncoderProgress { handle_id: u64, fps: f64, dropped_frames: u64, speed: f64 },
    EncoderWarning { handle_id: u64, message: String },
    EncoderError { handle_id: u64, message: String },
    EncoderExited { handle_id: u64, code: Option<i32> },

    // Relay Pool (§4.2)
    RelayStateChanged { camera_id: CameraId, state: crate::relay::RelayStatus },

    // Camera Health Monitor (§4.5)
    CameraHealth {
        camera_id: CameraId,
        rtsp_ok: bool,
        onvif_ok: bool,
        relay_state: crate::relay::RelayStatus,
        last_error: Option<String>,
    },

    // Timeline Executor (§4.6)
    TimelineStarted { timeline_id: TimelineId },
    CueStarted { timeline_id: TimelineId, loop_count: u64, cue_index: usize, cue_id: i64 },
    CameraDegraded { timeline_id: TimelineId, camera_id: CameraId },
    TimelineCompleted { timeline_id: TimelineId },
    TimelineFailed { timeline_id: TimelineId, reason: String },
    TimelineStopped { timeline_id: TimelineId },

    // Stream Router (§4.7)
    ModeChanged { mode: crate::router::Mode },

    // Destination Lifecycle / watchdog (§4.8)
    DestinationReconciled { destination_id: DestinationId, outcome: String },
}

/// Default channel capacity; a slow subscriber falls behind rather than
/// stalling the publisher, mirroring the teacher's broadcast-based
/// `FrameDistributor`.
const CHANNEL_CAPACITY: usize = 1024;

pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: Event) {
        // No subscribers is a legitimate state (e.g. no UI connected); the
        // send error is not a fault.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
