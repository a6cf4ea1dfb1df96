//! Encoder Driver (§4.1).
//!
//! Spawns an external encoder process (ffmpeg-class binary) with a precisely
//! constructed argv, streams its stderr into a line-oriented progress parser,
//! and exposes lifecycle operations. The driver never retries or restarts on
//! its own — callers (Relay Pool, Timeline Executor) decide policy.
//!
//! Grounded on the teacher's `CameraPipeline` (bus-watch driving state
//! transitions off element/process output) and on the subprocess-supervision
//! shape of `ephyr`'s `RestreamersPool` (spawn, read output, emit status),
//! adapted from an embedded GStreamer pipeline to an external process because
//! §4.1 describes the encoder as a spawned binary, not an in-process pipeline.

mod parse;
mod spawner;

pub use parse::{parse_stderr_line, ProgressUpdate};
pub use spawner::{ManagedChild, ProcessSpawner, TokioProcessSpawner};

use crate::events::{Event, EventBus};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("failed to spawn encoder process: {0}")]
    SpawnError(String),
}

/// Full description of one encoder invocation (§4.1: "Start(spec) → handle").
#[derive(Debug, Clone)]
pub struct EncoderSpec {
    pub argv: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Time to reach the "publishing" (`FirstFrame`) state before a
    /// `StartupError` is raised on the handle's event channel.
    pub startup_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderStatus {
    Starting,
    Running,
    Exited(Option<i32>),
    Killed,
}

/// Per-handle event, mirrored onto the shared `EventBus` by the driver and
/// also delivered on the handle's own channel so a caller that only cares
/// about one handle doesn't have to filter the global bus.
#[derive(Debug, Clone)]
pub enum EncoderEvent {
    Started,
    FirstFrame,
    ProgressTick { fps: f64, dropped_frames: u64, speed: f64 },
    Warning(String),
    Error(String),
    /// Spawn succeeded but no `FirstFrame` arrived before `startup_timeout`.
    StartupError,
    Exited(Option<i32>),
}

pub struct EncoderHandle {
    pub id: u64,
    pub pid: Option<u32>,
    pub events: mpsc::UnboundedReceiver<EncoderEvent>,
    status: Arc<RwLock<EncoderStatus>>,
    kill_tx: Option<mpsc::UnboundedSender<KillRequest>>,
}

enum KillRequest {
    Graceful(Duration),
}

impl EncoderHandle {
    pub fn status(&self) -> EncoderStatus {
        self.status.read().clone()
    }

    /// Stop(handle, grace) — idempotent: a second call after the process has
    /// already exited is a no-op.
    pub fn stop(&self, grace: Duration) {
        if let Some(tx) = &self.kill_tx {
            let _ = tx.send(KillRequest::Graceful(grace));
        }
    }
}

pub struct EncoderDriver {
    spawner: Arc<dyn ProcessSpawner>,
    bus: Arc<EventBus>,
    next_id: AtomicU64,
}

impl EncoderDriver {
    pub fn new(spawner: Arc<dyn ProcessSpawner>, bus: Arc<EventBus>) -> Self {
        Self { spawner, bus, next_id: AtomicU64::new(1) }
    }

    pub fn with_tokio_spawner(bus: Arc<EventBus>) -> Self {
        Self::new(Arc::new(TokioProcessSpawner), bus)
    }

    /// Start(spec) → handle.
    pub fn start(&self, spec: EncoderSpec) -> Result<EncoderHandle, EncoderError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut child = self
            .spawner
            .spawn(&spec.argv, spec.working_dir.as_deref())
            .map_err(|e| EncoderError::SpawnError(e.to_string()))?;
        let pid = child.id();

        let status = Arc::new(RwLock::new(EncoderStatus::Starting));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (kill_tx, mut kill_rx) = mpsc::unbounded_channel::<KillRequest>();

        self.bus.publish(Event::EncoderStarted { handle_id: id });
        let _ = event_tx.send(EncoderEvent::Started);

        let stderr = child.take_stderr();
        let bus = self.bus.clone();
        let status_for_reader = status.clone();
        let event_tx_reader = event_tx.clone();
        let got_first_frame = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let got_first_frame_reader = got_first_frame.clone();

        // stderr reader task: best-effort parsing, never fails the handle.
        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            debug!(handle_id = id, "encoder stderr: {}", line);
                            match parse_stderr_line(&line) {
                                Some(ProgressUpdate::Progress { fps, dropped_frames, speed }) => {
                                    if !got_first_frame_reader.swap(true, Ordering::SeqCst) {
                                        *status_for_reader.write() = EncoderStatus::Running;
                                        bus.publish(Event::EncoderFirstFrame { handle_id: id });
                                        let _ = event_tx_reader.send(EncoderEvent::FirstFrame);
                                    } else {
                                        bus.publish(Event::EncoderProgress {
                                            handle_id: id,
                                            fps,
                                            dropped_frames,
                                            speed,
                                        });
                                        let _ = event_tx_reader.send(EncoderEvent::ProgressTick {
                                            fps,
                                            dropped_frames,
                                            speed,
                                        });
                                    }
                                }
                                Some(ProgressUpdate::Warning(msg)) => {
                                    warn!(handle_id = id, "{}", msg);
                                    bus.publish(Event::EncoderWarning { handle_id: id, message: msg.clone() });
                                    let _ = event_tx_reader.send(EncoderEvent::Warning(msg));
                                }
                                Some(ProgressUpdate::Error(msg)) => {
                                    error!(handle_id = id, "{}", msg);
                                    bus.publish(Event::EncoderError { handle_id: id, message: msg.clone() });
                                    let _ = event_tx_reader.send(EncoderEvent::Error(msg));
                                }
                                None => {}
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            debug!(handle_id = id, "stderr read error: {}", e);
                            break;
                        }
                    }
                }
            });
        }

        // startup-timeout watchdog: fires StartupError if FirstFrame never
        // arrives, per §4.1's "Spawn success + exit within the starting
        // timeout without FirstFrame" contract (generalized to "timeout
        // elapses" since we must signal even if the process never exits).
        {
            let got_first_frame = got_first_frame.clone();
            let event_tx = event_tx.clone();
            let status = status.clone();
            let timeout = spec.startup_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if !got_first_frame.load(Ordering::SeqCst)
                    && matches!(*status.read(), EncoderStatus::Starting)
                {
                    let _ = event_tx.send(EncoderEvent::StartupError);
                }
            });
        }

        // wait/kill task: owns the child, reaps it on exit, honors Stop().
        let status_for_wait = status.clone();
        let bus_for_wait = self.bus.clone();
        let event_tx_wait = event_tx;
        tokio::spawn(async move {
            let grace_request = tokio::select! {
                result = child.wait() => {
                    let code = result.ok().and_then(|s| s);
                    *status_for_wait.write() = EncoderStatus::Exited(code);
                    bus_for_wait.publish(Event::EncoderExited { handle_id: id, code });
                    let _ = event_tx_wait.send(EncoderEvent::Exited(code));
                    info!(handle_id = id, code = ?code, "encoder process exited");
                    return;
                }
                Some(KillRequest::Graceful(grace)) = kill_rx.recv() => grace,
            };

            child.terminate();
            let exited = tokio::time::timeout(grace_request, child.wait()).await;
            let code = match exited {
                Ok(result) => result.ok().and_then(|s| s),
                Err(_) => {
                    child.kill();
                    let _ = child.wait().await;
                    *status_for_wait.write() = EncoderStatus::Killed;
                    bus_for_wait.publish(Event::EncoderExited { handle_id: id, code: None });
                    let _ = event_tx_wait.send(EncoderEvent::Exited(None));
                    return;
                }
            };
            *status_for_wait.write() = EncoderStatus::Exited(code);
            bus_for_wait.publish(Event::EncoderExited { handle_id: id, code });
            let _ = event_tx_wait.send(EncoderEvent::Exited(code));
        });

        Ok(EncoderHandle {
            id,
            pid,
            events: event_rx,
            status,
            kill_tx: Some(kill_tx),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::spawner::tests::{FakeChild, FakeSpawner};

    #[tokio::test]
    async fn start_emits_started_then_first_frame_on_matching_stderr() {
        let bus = Arc::new(EventBus::new());
        let spawner = Arc::new(FakeSpawner::new(FakeChild::with_stderr_lines(vec![
            "frame=    1 fps=0.0 q=-1.0 size=N/A time=00:00:00.00 bitrate=N/A speed=N/A".into(),
        ])));
        let driver = EncoderDriver::new(spawner, bus);
        let mut handle = driver
            .start(EncoderSpec {
                argv: vec!["ffmpeg".into()],
                working_dir: None,
                startup_timeout: Duration::from_secs(2),
            })
            .unwrap();

        assert!(matches!(handle.events.recv().await, Some(EncoderEvent::Started)));
        assert!(matches!(handle.events.recv().await, Some(EncoderEvent::FirstFrame)));
    }

    #[tokio::test]
    async fn startup_timeout_without_first_frame_raises_startup_error() {
        let bus = Arc::new(EventBus::new());
        let spawner = Arc::new(FakeSpawner::new(FakeChild::with_stderr_lines(vec![])));
        let driver = EncoderDriver::new(spawner, bus);
        let mut handle = driver
            .start(EncoderSpec {
                argv: vec!["ffmpeg".into()],
                working_dir: None,
                startup_timeout: Duration::from_millis(20),
            })
            .unwrap();

        assert!(matches!(handle.events.recv().await, Some(EncoderEvent::Started)));
        let next = tokio::time::timeout(Duration::from_secs(1), handle.events.recv())
            .await
            .unwrap();
        assert!(matches!(next, Some(EncoderEvent::StartupError)));
    }

    #[tokio::test]
    async fn stop_is_idempotent_after_exit() {
        let bus = Arc::new(EventBus::new());
        let spawner = Arc::new(FakeSpawner::new(FakeChild::exits_immediately(0)));
        let driver = EncoderDriver::new(spawner, bus);
        let mut handle = driver
            .start(EncoderSpec {
                argv: vec!["ffmpeg".into()],
                working_dir: None,
                startup_timeout: Duration::from_secs(2),
            })
            .unwrap();

        while let Some(event) = handle.events.recv().await {
            if matches!(event, EncoderEvent::Exited(_)) {
                break;
            }
        }
        handle.stop(Duration::from_millis(10));
        handle.stop(Duration::from_millis(10));
    }
}
