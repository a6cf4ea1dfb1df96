//! Program encoder command construction (§4.6.3) — a pure function from a
//! validated `Timeline` plus its resolved inputs to an encoder argv.
//!
//! Grounded on the restreamer example's `setup_ffmpeg` (building an argv as
//! plain `Vec<String>` rather than shelling out to a templated string) and
//! on §9's directive to isolate anything filter-graph/string-shaped as a
//! pure, independently testable function.

use crate::model::{Asset, AssetId, AssetVariant, CameraId, Cue, CueAction, Timeline, TrackKind, TransitionKind};
use std::collections::BTreeMap;

pub enum OutputTarget {
    Preview { hls_mount_url: String },
    Destinations(Vec<String>),
}

pub struct ProgramEncoderInputs<'a> {
    pub timeline: &'a Timeline,
    pub encoder_binary: &'a str,
    /// Local relay RTMP URL per camera referenced by the timeline.
    pub camera_relay_urls: BTreeMap<CameraId, String>,
    pub assets: BTreeMap<i64, Asset>,
    pub output: OutputTarget,
}

/// Builds the full program-encoder argv. Deterministic with respect to cue
/// ordering: cameras/overlays are addressed by sorted id, not by the order
/// cues appear in the timeline, satisfying the idempotence property of
/// §4.6.3.
pub fn build_argv(inputs: &ProgramEncoderInputs) -> Vec<String> {
    let timeline = inputs.timeline;

    let video_track = timeline.tracks.iter().find(|t| t.kind == TrackKind::Video);
    let overlay_tracks: Vec<_> = timeline.tracks.iter().filter(|t| t.kind == TrackKind::Overlay).collect();

    let camera_ids = distinct_camera_ids(video_track.map(|t| t.cues.as_slice()).unwrap_or(&[]));
    let media_asset_ids = distinct_media_asset_ids(video_track.map(|t| t.cues.as_slice()).unwrap_or(&[]));
    let overlay_asset_ids = distinct_overlay_asset_ids(&overlay_tracks);

    let mut argv = vec![inputs.encoder_binary.to_string(), "-y".to_string()];

    let mut camera_input_index = BTreeMap::new();
    for (idx, camera_id) in camera_ids.iter().enumerate() {
        let url = inputs
            .camera_relay_urls
            .get(camera_id)
            .cloned()
            .unwrap_or_else(|| format!("rtmp://127.0.0.1/live/camera_{camera_id}"));
        argv.push("-i".to_string());
        argv.push(url);
        camera_input_index.insert(*camera_id, idx);
    }

    let camera_count = camera_ids.len();
    let mut media_input_index = BTreeMap::new();
    for (offset, asset_id) in media_asset_ids.iter().enumerate() {
        if let Some(asset) = inputs.assets.get(asset_id) {
            push_asset_input(&mut argv, asset);
            media_input_index.insert(*asset_id, camera_count + offset);
        }
    }

    let media_count = media_input_index.len();
    let mut overlay_input_index = BTreeMap::new();
    for (offset, asset_id) in overlay_asset_ids.iter().enumerate() {
        if let Some(asset) = inputs.assets.get(asset_id) {
            push_asset_input(&mut argv, asset);
            overlay_input_index.insert(*asset_id, camera_count + media_count + offset);
        }
    }

    let filter_complex = build_filter_complex(
        timeline,
        video_track,
        &overlay_tracks,
        &camera_input_index,
        &media_input_index,
        &overlay_input_index,
        &inputs.assets,
    );

    argv.push("-filter_complex".to_string());
    argv.push(filter_complex);
    argv.push("-map".to_string());
    argv.push("[vout]".to_string());
    argv.push("-map".to_string());
    argv.push("[aout]".to_string());

    argv.push("-c:v".to_string());
    argv.push("h264_videotoolbox".to_string());
    argv.push("-b:v".to_string());
    argv.push("4500k".to_string());
    argv.push("-g".to_string());
    argv.push((timeline.frame_rate * 2).to_string());
    argv.push("-c:a".to_string());
    argv.push("aac".to_string());
    argv.push("-b:a".to_string());
    argv.push("128k".to_string());
    argv.push("-ar".to_string());
    argv.push("44100".to_string());

    match &inputs.output {
        OutputTarget::Preview { hls_mount_url } => {
            argv.push("-f".to_string());
            argv.push("flv".to_string());
            argv.push(hls_mount_url.clone());
        }
        OutputTarget::Destinations(urls) => {
            argv.push("-f".to_string());
            argv.push("tee".to_string());
            let tee_spec = urls
                .iter()
                .map(|u| format!("[f=flv]{u}"))
                .collect::<Vec<_>>()
                .join("|");
            argv.push(tee_spec);
        }
    }

    argv
}

fn distinct_camera_ids(cues: &[Cue]) -> Vec<CameraId> {
    let mut ids: Vec<CameraId> = cues
        .iter()
        .filter_map(|c| match &c.action {
            CueAction::ShowCamera { camera_id, .. } => Some(*camera_id),
            _ => None,
        })
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn distinct_media_asset_ids(cues: &[Cue]) -> Vec<AssetId> {
    let mut ids: Vec<AssetId> = cues
        .iter()
        .filter_map(|c| match &c.action {
            CueAction::ShowMedia { asset_id } => Some(*asset_id),
            _ => None,
        })
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn distinct_overlay_asset_ids(overlay_tracks: &[&crate::model::Track]) -> Vec<i64> {
    let mut ids: Vec<i64> = overlay_tracks
        .iter()
        .flat_map(|t| t.cues.iter())
        .filter_map(|c| match &c.action {
            CueAction::ShowOverlay { asset_id, .. } => Some(*asset_id),
            _ => None,
        })
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Pushes the `-i` (and `-loop 1` for stills) for one overlay/media asset.
fn push_asset_input(argv: &mut Vec<String>, asset: &Asset) {
    let path = match &asset.variant {
        AssetVariant::StaticImage { path } => path.clone(),
        AssetVariant::ApiImage { url } => url.clone(),
        AssetVariant::Video { path } => path.clone(),
    };
    if matches!(asset.variant, AssetVariant::StaticImage { .. } | AssetVariant::ApiImage { .. }) {
        argv.push("-loop".to_string());
        argv.push("1".to_string());
    }
    argv.push("-i".to_string());
    argv.push(path);
}

/// Resolves a video-track cue to its program input: the camera's stream for
/// `ShowCamera`, or the asset's input for `ShowMedia` (§3, §4.6.3). Returns
/// `(video_input_idx, audio_input_idx)` — `audio_input_idx` is `None` when
/// the source has no embedded audio track (image-backed media), in which
/// case the caller falls back to a silent audio source.
fn cue_video_source(
    cue: &Cue,
    camera_input_index: &BTreeMap<CameraId, usize>,
    media_input_index: &BTreeMap<AssetId, usize>,
    assets: &BTreeMap<i64, Asset>,
) -> Option<(usize, Option<usize>)> {
    match &cue.action {
        CueAction::ShowCamera { camera_id, .. } => {
            camera_input_index.get(camera_id).map(|&idx| (idx, Some(idx)))
        }
        CueAction::ShowMedia { asset_id } => media_input_index.get(asset_id).and_then(|&idx| {
            assets.get(asset_id).map(|asset| {
                let audio_idx = matches!(asset.variant, AssetVariant::Video { .. }).then_some(idx);
                (idx, audio_idx)
            })
        }),
        _ => None,
    }
}

/// Builds the `-filter_complex` script. Each video cue contributes one
/// gated, scaled branch; branches are combined with `overlay` chains so
/// exactly one is opaque at any instant (cut) or two are blended across
/// `transition_duration` (fade). Overlay asset cues are then composited on
/// top in ascending `layer` order.
fn build_filter_complex(
    timeline: &Timeline,
    video_track: Option<&crate::model::Track>,
    overlay_tracks: &[&crate::model::Track],
    camera_input_index: &BTreeMap<CameraId, usize>,
    media_input_index: &BTreeMap<AssetId, usize>,
    overlay_input_index: &BTreeMap<i64, usize>,
    assets: &BTreeMap<i64, Asset>,
) -> String {
    let (w, h) = (timeline.resolution.width, timeline.resolution.height);
    let duration = timeline.duration_secs;
    let mut parts: Vec<String> = Vec::new();

    let mut cues: Vec<&Cue> = video_track.map(|t| t.cues.iter().collect()).unwrap_or_default();
    cues.sort_by(|a, b| a.start_time.partial_cmp(&b.start_time).unwrap());

    const SILENT_AUDIO: &str = "anullsrc=channel_layout=stereo:sample_rate=44100[program_a]";

    if cues.len() == 1 {
        let cue = cues[0];
        if let Some((v_idx, a_idx)) = cue_video_source(cue, camera_input_index, media_input_index, assets) {
            parts.push(format!("[{v_idx}:v]scale={w}:{h},setsar=1[program_v]"));
            match a_idx {
                Some(idx) => parts.push(format!("[{idx}:a]anull[program_a]")),
                None => parts.push(SILENT_AUDIO.to_string()),
            }
        }
    } else {
        let mut branch_labels = Vec::new();
        let mut audio_source: Option<Option<usize>> = None;
        for (i, cue) in cues.iter().enumerate() {
            if let Some((v_idx, a_idx)) = cue_video_source(cue, camera_input_index, media_input_index, assets) {
                let enable = gate_predicate(cue, duration, timeline.loop_playback);
                let label = format!("cue{i}");
                parts.push(format!(
                    "[{v_idx}:v]scale={w}:{h},setsar=1,fade=t=in:st={start}:d={fd}:alpha=1,fade=t=out:st={fade_out_start}:d={fd}:alpha=1,setpts=PTS-STARTPTS,eq=enable='{enable}'[{label}_v]",
                    start = cue.start_time,
                    fd = cue.transition_duration.max(0.001),
                    fade_out_start = (cue.end_time() - cue.transition_duration).max(cue.start_time),
                    enable = enable,
                    label = label,
                ));
                branch_labels.push((label, cue.transition));
                if audio_source.is_none() {
                    audio_source = Some(a_idx);
                }
            }
        }

        if let Some((first_label, _)) = branch_labels.first() {
            let mut acc = format!("[{first_label}_v]");
            for (label, transition) in branch_labels.iter().skip(1) {
                let mode = match transition {
                    TransitionKind::Cut => "overlay",
                    TransitionKind::Fade => "overlay",
                };
                let next = format!("[v_acc_{label}]");
                parts.push(format!("{acc}[{label}_v]{mode}=format=auto{next}"));
                acc = next;
            }
            parts.push(format!("{acc}null[program_v]"));
        }

        match audio_source {
            Some(Some(idx)) => parts.push(format!("[{idx}:a]anull[program_a]")),
            _ => parts.push(SILENT_AUDIO.to_string()),
        }
    }

    let mut current_v = "program_v".to_string();
    let mut overlay_specs: Vec<(&Cue, i32)> = Vec::new();
    for track in overlay_tracks {
        for cue in &track.cues {
            overlay_specs.push((cue, track.layer));
        }
    }
    overlay_specs.sort_by_key(|(_, layer)| *layer);

    for (i, (cue, _layer)) in overlay_specs.iter().enumerate() {
        if let CueAction::ShowOverlay { asset_id, fade_in_secs, fade_out_secs } = &cue.action {
            if let (Some(&idx), Some(asset)) = (overlay_input_index.get(asset_id), assets.get(asset_id)) {
                let enable = gate_predicate(cue, duration, timeline.loop_playback);
                let scale_expr = match (asset.width, asset.height) {
                    (Some(width), Some(height)) => format!("scale={width}:{height}"),
                    (Some(width), None) => format!("scale={width}:-1"),
                    (None, Some(height)) => format!("scale=-1:{height}"),
                    (None, None) => "scale=-1:-1".to_string(),
                };
                let scaled = format!("ov{i}_scaled");
                parts.push(format!(
                    "[{idx}:v]{scale_expr},format=rgba,colorchannelmixer=aa={opacity}[{scaled}]",
                    opacity = asset.opacity,
                ));
                let faded = format!("ov{i}_faded");
                let fade_out_start = (cue.end_time() - fade_out_secs).max(cue.start_time);
                parts.push(format!(
                    "[{scaled}]fade=t=in:st={start}:d={fi}:alpha=1,fade=t=out:st={fade_out_start}:d={fo}:alpha=1[{faded}]",
                    start = cue.start_time,
                    fi = fade_in_secs,
                    fo = fade_out_secs,
                ));
                let next = format!("ov_acc_{i}");
                parts.push(format!(
                    "[{current_v}][{faded}]overlay=x=W*{x}:y=H*{y}:enable='{enable}'[{next}]",
                    x = asset.x,
                    y = asset.y,
                ));
                current_v = next;
            }
        }
    }

    parts.push(format!("[{current_v}]null[vout]"));
    parts.push("[program_a]anull[aout]".to_string());

    parts.join(";")
}

/// `between(t, start, end)`, modulo `duration` when the timeline loops so
/// the predicate re-activates at every wraparound (§4.6.4).
fn gate_predicate(cue: &Cue, duration: f64, looped: bool) -> String {
    if looped {
        format!("between(mod(t\\,{duration}),{start},{end})", start = cue.start_time, end = cue.end_time())
    } else {
        format!("between(t,{start},{end})", start = cue.start_time, end = cue.end_time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Resolution, Track};

    fn cam_cue(id: i64, camera_id: i64, start: f64, duration: f64) -> Cue {
        Cue {
            id,
            start_time: start,
            duration,
            action: CueAction::ShowCamera { camera_id, preset_id: None },
            transition: TransitionKind::Cut,
            transition_duration: 0.0,
        }
    }

    fn timeline(tracks: Vec<Track>, duration: f64, looped: bool) -> Timeline {
        Timeline {
            id: 1,
            name: "t".into(),
            duration_secs: duration,
            frame_rate: 30,
            resolution: Resolution { width: 1920, height: 1080 },
            loop_playback: looped,
            tracks,
        }
    }

    fn inputs<'a>(timeline: &'a Timeline, urls: BTreeMap<CameraId, String>) -> ProgramEncoderInputs<'a> {
        ProgramEncoderInputs {
            timeline,
            encoder_binary: "ffmpeg",
            camera_relay_urls: urls,
            assets: BTreeMap::new(),
            output: OutputTarget::Preview { hls_mount_url: "rtmp://127.0.0.1/preview".into() },
        }
    }

    #[test]
    fn single_cue_timeline_passes_through_without_gating() {
        let t = timeline(
            vec![Track { id: 1, kind: TrackKind::Video, layer: 0, cues: vec![cam_cue(1, 1, 0.0, 60.0)] }],
            60.0,
            false,
        );
        let mut urls = BTreeMap::new();
        urls.insert(1, "rtmp://127.0.0.1/live/camera_1".into());
        let argv = build_argv(&inputs(&t, urls));

        assert_eq!(argv.iter().filter(|a| *a == "-i").count(), 1);
        let filter_idx = argv.iter().position(|a| a == "-filter_complex").unwrap();
        assert!(!argv[filter_idx + 1].contains("enable="));
    }

    #[test]
    fn zero_overlay_tracks_omit_overlay_inputs() {
        let t = timeline(
            vec![Track {
                id: 1,
                kind: TrackKind::Video,
                layer: 0,
                cues: vec![cam_cue(1, 1, 0.0, 10.0), cam_cue(2, 2, 10.0, 10.0)],
            }],
            20.0,
            false,
        );
        let mut urls = BTreeMap::new();
        urls.insert(1, "rtmp://127.0.0.1/live/camera_1".into());
        urls.insert(2, "rtmp://127.0.0.1/live/camera_2".into());
        let argv = build_argv(&inputs(&t, urls));

        assert_eq!(argv.iter().filter(|a| *a == "-i").count(), 2);
    }

    #[test]
    fn argv_is_stable_under_cue_reordering() {
        let t_a = timeline(
            vec![Track {
                id: 1,
                kind: TrackKind::Video,
                layer: 0,
                cues: vec![cam_cue(1, 1, 0.0, 10.0), cam_cue(2, 2, 10.0, 10.0)],
            }],
            20.0,
            false,
        );
        let t_b = timeline(
            vec![Track {
                id: 1,
                kind: TrackKind::Video,
                layer: 0,
                cues: vec![cam_cue(2, 2, 10.0, 10.0), cam_cue(1, 1, 0.0, 10.0)],
            }],
            20.0,
            false,
        );
        let mut urls = BTreeMap::new();
        urls.insert(1, "rtmp://127.0.0.1/live/camera_1".into());
        urls.insert(2, "rtmp://127.0.0.1/live/camera_2".into());

        let argv_a = build_argv(&inputs(&t_a, urls.clone()));
        let argv_b = build_argv(&inputs(&t_b, urls));
        assert_eq!(argv_a, argv_b);
    }
}
