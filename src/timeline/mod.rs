//! Timeline Executor (§4.6) — "the hard part."
//!
//! Runs a timeline as one continuous outbound program stream: the program
//! encoder is long-lived for the run's duration and is never restarted
//! between cues (§4.6.1). Grounded on the teacher's single run-task +
//! single position-task split for a long-lived stream, generalized from
//! "one WebRTC session" to "one timeline execution."

mod filtergraph;
mod position;
mod validate;

pub use filtergraph::{build_argv, OutputTarget, ProgramEncoderInputs};
pub use position::PlaybackPosition;
pub use validate::{validate, ValidationError};

use crate::encoder::{EncoderDriver, EncoderEvent, EncoderSpec};
use crate::events::{Event, EventBus};
use crate::model::{Asset, AssetId, Camera, CameraId, CueAction, Preset, PresetId, Timeline, TimelineId, TrackKind};
use crate::ptz::PtzController;
use crate::relay::{RelayPool, RelayStatus};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("preroll failed: cameras not publishing: {0:?}")]
    PrerollFailed(Vec<CameraId>),
    #[error("timeline {0} already has an active execution")]
    AlreadyRunning(TimelineId),
    #[error("failed to start program encoder: {0}")]
    EncoderStartFailed(String),
    #[error("program encoder did not reach FirstFrame before startup timeout")]
    StartupTimeout,
}

pub struct TimelineRunRequest {
    pub timeline: Timeline,
    pub cameras: HashMap<CameraId, Camera>,
    pub presets: HashMap<PresetId, Preset>,
    pub assets: HashMap<AssetId, Asset>,
    pub camera_relay_urls: HashMap<CameraId, String>,
    pub output: OutputTarget,
    pub global_onvif_override: Option<String>,
}

const PREROLL_DEADLINE: Duration = Duration::from_secs(15);
const PREROLL_POLL_INTERVAL: Duration = Duration::from_millis(250);
/// Grace period publications must hold `PUBLISHING` before the program
/// encoder launches (§4.6.1).
const PREROLL_GRACE: Duration = Duration::from_secs(3);
const PROGRAM_ENCODER_STARTUP_TIMEOUT: Duration = Duration::from_secs(15);
const POSITION_TICK: Duration = Duration::from_millis(500);

pub struct TimelineHandle {
    pub timeline_id: TimelineId,
    position: Arc<RwLock<Option<PlaybackPosition>>>,
    stop: Arc<Notify>,
    join: tokio::task::JoinHandle<()>,
}

impl TimelineHandle {
    pub fn position(&self) -> Option<PlaybackPosition> {
        self.position.read().clone()
    }

    /// `Stop(timeline_id, grace)` — idempotent.
    pub async fn stop(self) {
        self.stop.notify_waiters();
        let _ = self.join.await;
    }
}

pub struct TimelineExecutor {
    driver: Arc<EncoderDriver>,
    bus: Arc<EventBus>,
    relay_pool: Arc<RelayPool>,
    ptz: Arc<PtzController>,
    encoder_binary: String,
    running: RwLock<HashSet<TimelineId>>,
}

impl TimelineExecutor {
    pub fn new(
        driver: Arc<EncoderDriver>,
        bus: Arc<EventBus>,
        relay_pool: Arc<RelayPool>,
        ptz: Arc<PtzController>,
        encoder_binary: String,
    ) -> Self {
        Self {
            driver,
            bus,
            relay_pool,
            ptz,
            encoder_binary,
            running: RwLock::new(HashSet::new()),
        }
    }

    pub async fn start(self: &Arc<Self>, request: TimelineRunRequest) -> Result<TimelineHandle, TimelineError> {
        validate::validate(&request.timeline)?;
        let timeline_id = request.timeline.id;

        {
            let mut running = self.running.write();
            if running.contains(&timeline_id) {
                return Err(TimelineError::AlreadyRunning(timeline_id));
            }
            running.insert(timeline_id);
        }

        match self.start_inner(request).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                // start_inner only fails before the run task takes over
                // bookkeeping, so the entry must be released here.
                self.running.write().remove(&timeline_id);
                Err(e)
            }
        }
    }

    async fn start_inner(self: &Arc<Self>, request: TimelineRunRequest) -> Result<TimelineHandle, TimelineError> {
        let timeline_id = request.timeline.id;
        let referenced_cameras = referenced_camera_ids(&request.timeline);

        self.warm_up_ptz(&request).await;
        self.wait_for_preroll(&referenced_cameras).await?;

        let argv = self.build_program_argv(&request);
        let spec = EncoderSpec {
            argv,
            working_dir: None,
            startup_timeout: PROGRAM_ENCODER_STARTUP_TIMEOUT,
        };

        let mut handle = self
            .driver
            .start(spec)
            .map_err(|e| TimelineError::EncoderStartFailed(e.to_string()))?;

        loop {
            match handle.events.recv().await {
                Some(EncoderEvent::FirstFrame) => break,
                Some(EncoderEvent::StartupError) => return Err(TimelineError::StartupTimeout),
                Some(_) => continue,
                None => return Err(TimelineError::StartupTimeout),
            }
        }

        self.bus.publish(Event::TimelineStarted { timeline_id });
        info!(timeline_id, "timeline program encoder reached first frame");

        let position = Arc::new(RwLock::new(None));
        let stop = Arc::new(Notify::new());

        let executor = self.clone();
        let position_for_task = position.clone();
        let stop_for_task = stop.clone();
        let timeline = request.timeline.clone();
        let join = tokio::spawn(async move {
            executor
                .run(timeline, referenced_cameras, handle, position_for_task, stop_for_task)
                .await;
        });

        Ok(TimelineHandle { timeline_id, position, stop, join })
    }

    async fn warm_up_ptz(&self, request: &TimelineRunRequest) {
        let mut seen = HashSet::new();
        for track in &request.timeline.tracks {
            if track.kind != TrackKind::Video {
                continue;
            }
            for cue in &track.cues {
                if let CueAction::ShowCamera { camera_id, preset_id: Some(preset_id) } = &cue.action {
                    if !seen.insert((*camera_id, *preset_id)) {
                        continue;
                    }
                    let (Some(camera), Some(preset)) =
                        (request.cameras.get(camera_id), request.presets.get(preset_id))
                    else {
                        continue;
                    };
                    if let Err(e) = self
                        .ptz
                        .move_to_preset(camera, preset, request.global_onvif_override.as_deref())
                        .await
                    {
                        warn!(camera_id, "PTZ warm-up failed: {}", e);
                    }
                }
            }
        }
    }

    async fn wait_for_preroll(&self, cameras: &[CameraId]) -> Result<(), TimelineError> {
        if cameras.is_empty() {
            return Ok(());
        }

        let deadline = Instant::now() + PREROLL_DEADLINE;
        let mut ready_since: HashMap<CameraId, Instant> = HashMap::new();

        loop {
            let mut not_ready = Vec::new();
            let now = Instant::now();
            for &camera_id in cameras {
                let status = self.relay_pool.status(camera_id).unwrap_or(RelayStatus::Idle);
                if matches!(status, RelayStatus::Publishing | RelayStatus::Degraded) {
                    let since = *ready_since.entry(camera_id).or_insert(now);
                    if now.duration_since(since) < PREROLL_GRACE {
                        not_ready.push(camera_id);
                    }
                } else {
                    ready_since.remove(&camera_id);
                    not_ready.push(camera_id);
                }
            }

            if not_ready.is_empty() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(TimelineError::PrerollFailed(not_ready));
            }
            tokio::time::sleep(PREROLL_POLL_INTERVAL).await;
        }
    }

    fn build_program_argv(&self, request: &TimelineRunRequest) -> Vec<String> {
        let camera_relay_urls: BTreeMap<CameraId, String> = request.camera_relay_urls.clone().into_iter().collect();
        let assets: BTreeMap<AssetId, Asset> = request.assets.clone().into_iter().collect();
        let inputs = ProgramEncoderInputs {
            timeline: &request.timeline,
            encoder_binary: &self.encoder_binary,
            camera_relay_urls,
            assets,
            output: clone_output(&request.output),
        };
        build_argv(&inputs)
    }

    async fn run(
        self: Arc<Self>,
        timeline: Timeline,
        referenced_cameras: Vec<CameraId>,
        mut handle: crate::encoder::EncoderHandle,
        position: Arc<RwLock<Option<PlaybackPosition>>>,
        stop: Arc<Notify>,
    ) {
        let timeline_id = timeline.id;
        let video_cues = sorted_video_cues(&timeline);
        let started_at = Instant::now();
        let mut last_key: Option<(u64, i64)> = None;
        let mut degraded: HashSet<CameraId> = HashSet::new();
        let mut bus_rx = self.bus.subscribe();
        let mut ticker = tokio::time::interval(POSITION_TICK);

        let outcome = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let elapsed = started_at.elapsed().as_secs_f64();
                    if !timeline.loop_playback && elapsed >= timeline.duration_secs {
                        break RunOutcome::Completed;
                    }
                    let loop_count = if timeline.loop_playback {
                        (elapsed / timeline.duration_secs).floor() as u64
                    } else {
                        0
                    };
                    let cycle_time = if timeline.loop_playback {
                        elapsed % timeline.duration_secs
                    } else {
                        elapsed
                    };

                    if let Some((index, cue)) = video_cues.iter().enumerate().find(|(_, c)| c.covers(cycle_time)) {
                        let key = (loop_count, cue.id);
                        if last_key != Some(key) {
                            self.bus.publish(Event::CueStarted {
                                timeline_id,
                                loop_count,
                                cue_index: index,
                                cue_id: cue.id,
                            });
                            last_key = Some(key);
                        }
                        *position.write() = Some(PlaybackPosition {
                            timeline_id,
                            current_time: cycle_time,
                            current_cue_id: cue.id,
                            current_cue_index: index,
                            loop_count,
                            total_cues: video_cues.len(),
                            updated_at: Utc::now(),
                        });
                    }
                }
                event = handle.events.recv() => {
                    match event {
                        Some(EncoderEvent::Exited(code)) => {
                            break RunOutcome::EncoderExited(code);
                        }
                        None => break RunOutcome::EncoderExited(None),
                        _ => {}
                    }
                }
                bus_event = bus_rx.recv() => {
                    if let Ok(Event::RelayStateChanged { camera_id, state }) = bus_event {
                        if referenced_cameras.contains(&camera_id) {
                            if matches!(state, RelayStatus::Failed) {
                                if degraded.insert(camera_id) {
                                    self.bus.publish(Event::CameraDegraded { timeline_id, camera_id });
                                }
                            } else {
                                degraded.remove(&camera_id);
                            }
                        }
                    }
                }
                _ = stop.notified() => {
                    break RunOutcome::Stopped;
                }
            }
        };

        *position.write() = None;
        self.running.write().remove(&timeline_id);

        match outcome {
            RunOutcome::Completed => {
                handle.stop(Duration::from_secs(5));
                self.bus.publish(Event::TimelineCompleted { timeline_id });
            }
            RunOutcome::Stopped => {
                handle.stop(Duration::from_secs(5));
                self.bus.publish(Event::TimelineStopped { timeline_id });
            }
            RunOutcome::EncoderExited(code) => {
                self.bus.publish(Event::TimelineFailed {
                    timeline_id,
                    reason: format!("program encoder exited unexpectedly (code={code:?})"),
                });
            }
        }
    }
}

enum RunOutcome {
    Completed,
    Stopped,
    EncoderExited(Option<i32>),
}

fn clone_output(output: &OutputTarget) -> OutputTarget {
    match output {
        OutputTarget::Preview { hls_mount_url } => OutputTarget::Preview { hls_mount_url: hls_mount_url.clone() },
        OutputTarget::Destinations(urls) => OutputTarget::Destinations(urls.clone()),
    }
}

fn referenced_camera_ids(timeline: &Timeline) -> Vec<CameraId> {
    let mut ids: Vec<CameraId> = timeline
        .tracks
        .iter()
        .filter(|t| t.kind == TrackKind::Video)
        .flat_map(|t| t.cues.iter())
        .filter_map(|c| match &c.action {
            CueAction::ShowCamera { camera_id, .. } => Some(*camera_id),
            _ => None,
        })
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn sorted_video_cues(timeline: &Timeline) -> Vec<crate::model::Cue> {
    let mut cues: Vec<crate::model::Cue> = timeline
        .tracks
        .iter()
        .filter(|t| t.kind == TrackKind::Video)
        .flat_map(|t| t.cues.iter().cloned())
        .collect();
    cues.sort_by(|a, b| a.start_time.partial_cmp(&b.start_time).unwrap());
    cues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referenced_camera_ids_are_deduped_and_sorted() {
        use crate::model::{Cue, CueAction, Resolution, Track, TransitionKind};
        let timeline = Timeline {
            id: 1,
            name: "t".into(),
            duration_secs: 20.0,
            frame_rate: 30,
            resolution: Resolution { width: 1920, height: 1080 },
            loop_playback: false,
            tracks: vec![Track {
                id: 1,
                kind: TrackKind::Video,
                layer: 0,
                cues: vec![
                    Cue {
                        id: 1,
                        start_time: 0.0,
                        duration: 10.0,
                        action: CueAction::ShowCamera { camera_id: 2, preset_id: None },
                        transition: TransitionKind::Cut,
                        transition_duration: 0.0,
                    },
                    Cue {
                        id: 2,
                        start_time: 10.0,
                        duration: 10.0,
                        action: CueAction::ShowCamera { camera_id: 1, preset_id: None },
                        transition: TransitionKind::Cut,
                        transition_duration: 0.0,
                    },
                ],
            }],
        };
        assert_eq!(referenced_camera_ids(&timeline), vec![1, 2]);
    }
}
