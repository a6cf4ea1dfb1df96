//! `PlaybackPosition` — the runtime (never persisted) position snapshot of
//! §4.6.5 / §6.1. Reads are lock-free snapshots per §5 ("reads are
//! lock-free snapshots"); a `parking_lot::RwLock` over a small `Copy`-free
//! struct is the pragmatic equivalent the teacher reaches for elsewhere in
//! this codebase rather than pulling in a dedicated atomic-swap crate for a
//! value this small and this rarely contended.

use crate::model::{CueId, TimelineId};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackPosition {
    pub timeline_id: TimelineId,
    pub current_time: f64,
    pub current_cue_id: CueId,
    pub current_cue_index: usize,
    pub loop_count: u64,
    pub total_cues: usize,
    pub updated_at: DateTime<Utc>,
}
