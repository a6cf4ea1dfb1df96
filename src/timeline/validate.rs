//! Timeline validation (§4.6.1, §4.6.2 step 1, testable properties #2/#3).
//!
//! Pure functions over the data model — no I/O, no entity lookups beyond
//! what's passed in — so preroll's validation step is exercised without a
//! camera, asset store, or encoder.

use crate::model::{Timeline, TrackKind};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("timeline duration must be positive, got {0}")]
    NonPositiveDuration(f64),
    #[error("timeline has no video track cues")]
    NoVideoCues,
    #[error("cues {0} and {1} on the same track overlap")]
    OverlappingCues(i64, i64),
    #[error("video track does not cover the full timeline duration: gap at t={0}")]
    VideoCoverageGap(f64),
}

/// Validates invariants #2 and #3 of §8, plus "duration > 0" and "at least
/// one video cue" from §4.6.2 step 1.
pub fn validate(timeline: &Timeline) -> Result<(), ValidationError> {
    if timeline.duration_secs <= 0.0 {
        return Err(ValidationError::NonPositiveDuration(timeline.duration_secs));
    }

    let mut has_video_cue = false;
    for track in &timeline.tracks {
        let mut cues: Vec<_> = track.cues.iter().collect();
        cues.sort_by(|a, b| a.start_time.partial_cmp(&b.start_time).unwrap());

        for pair in cues.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a.start_time + a.duration > b.start_time {
                return Err(ValidationError::OverlappingCues(a.id, b.id));
            }
        }

        if track.kind == TrackKind::Video {
            has_video_cue |= !cues.is_empty();
            check_video_coverage(&cues, timeline.duration_secs)?;
        }
    }

    if !has_video_cue {
        return Err(ValidationError::NoVideoCues);
    }

    Ok(())
}

fn check_video_coverage(
    cues: &[&crate::model::Cue],
    duration: f64,
) -> Result<(), ValidationError> {
    if cues.is_empty() {
        return Ok(());
    }

    if cues[0].start_time > 1e-9 {
        return Err(ValidationError::VideoCoverageGap(0.0));
    }

    for pair in cues.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if (b.start_time - a.end_time()).abs() > 1e-9 {
            return Err(ValidationError::VideoCoverageGap(a.end_time()));
        }
    }

    let last = cues.last().unwrap();
    if (last.end_time() - duration).abs() > 1e-6 {
        return Err(ValidationError::VideoCoverageGap(last.end_time()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cue, CueAction, Resolution, Track, TransitionKind};

    fn video_track(cues: Vec<Cue>) -> Track {
        Track { id: 1, kind: TrackKind::Video, layer: 0, cues }
    }

    fn cue(id: i64, start: f64, duration: f64) -> Cue {
        Cue {
            id,
            start_time: start,
            duration,
            action: CueAction::ShowCamera { camera_id: 1, preset_id: None },
            transition: TransitionKind::Cut,
            transition_duration: 0.0,
        }
    }

    fn timeline_with(tracks: Vec<Track>, duration: f64) -> Timeline {
        Timeline {
            id: 1,
            name: "t".into(),
            duration_secs: duration,
            frame_rate: 30,
            resolution: Resolution { width: 1920, height: 1080 },
            loop_playback: false,
            tracks,
        }
    }

    #[test]
    fn gapless_single_cue_timeline_is_valid() {
        let t = timeline_with(vec![video_track(vec![cue(1, 0.0, 60.0)])], 60.0);
        assert!(validate(&t).is_ok());
    }

    #[test]
    fn gapless_multi_cue_timeline_is_valid() {
        let t = timeline_with(
            vec![video_track(vec![cue(1, 0.0, 10.0), cue(2, 10.0, 20.0)])],
            30.0,
        );
        assert!(validate(&t).is_ok());
    }

    #[test]
    fn overlapping_cues_are_rejected() {
        let t = timeline_with(
            vec![video_track(vec![cue(1, 0.0, 10.0), cue(2, 5.0, 10.0)])],
            15.0,
        );
        assert!(matches!(validate(&t), Err(ValidationError::OverlappingCues(1, 2))));
    }

    #[test]
    fn gap_in_video_coverage_is_rejected() {
        let t = timeline_with(
            vec![video_track(vec![cue(1, 0.0, 10.0), cue(2, 15.0, 10.0)])],
            25.0,
        );
        assert!(matches!(validate(&t), Err(ValidationError::VideoCoverageGap(_))));
    }

    #[test]
    fn zero_duration_timeline_is_rejected() {
        let t = timeline_with(vec![video_track(vec![])], 0.0);
        assert!(matches!(validate(&t), Err(ValidationError::NonPositiveDuration(_))));
    }

    #[test]
    fn timeline_with_no_video_cues_is_rejected() {
        let t = timeline_with(vec![video_track(vec![])], 10.0);
        assert!(matches!(validate(&t), Err(ValidationError::NoVideoCues)));
    }

    #[test]
    fn overlay_track_may_have_gaps_and_overlaps_are_still_checked_within_track() {
        let overlay = Track {
            id: 2,
            kind: TrackKind::Overlay,
            layer: 1,
            cues: vec![cue(3, 2.0, 3.0)],
        };
        let t = timeline_with(
            vec![video_track(vec![cue(1, 0.0, 10.0)]), overlay],
            10.0,
        );
        assert!(validate(&t).is_ok());
    }
}
