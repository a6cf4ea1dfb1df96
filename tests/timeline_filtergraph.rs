//! Integration tests for the program-encoder argv builder (§4.6.3), driven
//! through the public `vistterstream::timeline` API rather than the
//! in-module unit tests in `src/timeline/filtergraph.rs`. Covers scenarios
//! those unit tests don't: fade-transition gating, overlay layering order,
//! and the destination tee-muxer's multi-URL format.

use std::collections::BTreeMap;
use vistterstream::model::{
    Asset, AssetVariant, CameraId, Cue, CueAction, Resolution, Timeline, Track, TrackKind, TransitionKind,
};
use vistterstream::timeline::{build_argv, OutputTarget, ProgramEncoderInputs};

fn cam_cue(id: i64, camera_id: CameraId, start: f64, duration: f64, transition: TransitionKind, transition_duration: f64) -> Cue {
    Cue {
        id,
        start_time: start,
        duration,
        action: CueAction::ShowCamera { camera_id, preset_id: None },
        transition,
        transition_duration,
    }
}

fn overlay_cue(id: i64, asset_id: i64, start: f64, duration: f64, fade_in: f64, fade_out: f64) -> Cue {
    Cue {
        id,
        start_time: start,
        duration,
        action: CueAction::ShowOverlay { asset_id, fade_in_secs: fade_in, fade_out_secs: fade_out },
        transition: TransitionKind::Cut,
        transition_duration: 0.0,
    }
}

fn timeline(tracks: Vec<Track>, duration: f64) -> Timeline {
    Timeline {
        id: 1,
        name: "program".into(),
        duration_secs: duration,
        frame_rate: 30,
        resolution: Resolution { width: 1920, height: 1080 },
        loop_playback: false,
        tracks,
    }
}

fn camera_urls(pairs: &[(CameraId, &str)]) -> BTreeMap<CameraId, String> {
    pairs.iter().map(|(id, url)| (*id, url.to_string())).collect()
}

#[test]
fn fade_transition_between_two_cues_gates_both_branches_with_an_overlay_blend() {
    let t = timeline(
        vec![Track {
            id: 1,
            kind: TrackKind::Video,
            layer: 0,
            cues: vec![
                cam_cue(1, 1, 0.0, 10.0, TransitionKind::Cut, 0.0),
                cam_cue(2, 2, 10.0, 10.0, TransitionKind::Fade, 1.5),
            ],
        }],
        20.0,
    );
    let urls = camera_urls(&[(1, "rtmp://127.0.0.1/live/camera_1"), (2, "rtmp://127.0.0.1/live/camera_2")]);
    let inputs = ProgramEncoderInputs {
        timeline: &t,
        encoder_binary: "ffmpeg",
        camera_relay_urls: urls,
        assets: BTreeMap::new(),
        output: OutputTarget::Preview { hls_mount_url: "rtmp://127.0.0.1/preview".into() },
    };
    let argv = build_argv(&inputs);

    let filter_idx = argv.iter().position(|a| a == "-filter_complex").unwrap();
    let filter = &argv[filter_idx + 1];

    // Both cues are gated by an `enable=` predicate once there's more than
    // one video cue, and the second cue's 1.5s cross-fade shows up as a
    // `fade=...d=1.5` clause on its branch.
    assert_eq!(filter.matches("enable=").count(), 2);
    assert!(filter.contains("d=1.5"));
    assert!(filter.contains("overlay=format=auto"));
}

#[test]
fn overlays_composite_in_ascending_layer_order_regardless_of_track_order() {
    let lower_third = Asset {
        id: 10,
        name: "lower-third".into(),
        variant: AssetVariant::StaticImage { path: "/assets/lower_third.png".into() },
        x: 0.0,
        y: 0.9,
        width: None,
        height: None,
        opacity: 1.0,
        refresh_interval_secs: None,
        location: None,
    };
    let logo = Asset {
        id: 11,
        name: "logo".into(),
        variant: AssetVariant::StaticImage { path: "/assets/logo.png".into() },
        x: 0.9,
        y: 0.0,
        width: None,
        height: None,
        opacity: 1.0,
        refresh_interval_secs: None,
        location: None,
    };

    // Declared out of layer order: the logo track (layer 5) comes first in
    // `tracks`, but the lower-third track (layer 1) must still be composited
    // first so the logo ends up on top.
    let t = timeline(
        vec![
            Track { id: 1, kind: TrackKind::Video, layer: 0, cues: vec![cam_cue(1, 1, 0.0, 30.0, TransitionKind::Cut, 0.0)] },
            Track { id: 3, kind: TrackKind::Overlay, layer: 5, cues: vec![overlay_cue(2, 11, 0.0, 30.0, 0.5, 0.5)] },
            Track { id: 2, kind: TrackKind::Overlay, layer: 1, cues: vec![overlay_cue(3, 10, 0.0, 30.0, 0.5, 0.5)] },
        ],
        30.0,
    );

    let mut assets = BTreeMap::new();
    assets.insert(10, lower_third);
    assets.insert(11, logo);

    let inputs = ProgramEncoderInputs {
        timeline: &t,
        encoder_binary: "ffmpeg",
        camera_relay_urls: camera_urls(&[(1, "rtmp://127.0.0.1/live/camera_1")]),
        assets,
        output: OutputTarget::Preview { hls_mount_url: "rtmp://127.0.0.1/preview".into() },
    };
    let argv = build_argv(&inputs);
    let filter_idx = argv.iter().position(|a| a == "-filter_complex").unwrap();
    let filter = &argv[filter_idx + 1];

    // The lower-third (layer 1) must be composited before the logo (layer
    // 5): its `overlay=` clause appears earlier in the filter script.
    let lower_third_input_idx = argv.iter().position(|a| a == "/assets/lower_third.png").unwrap();
    let logo_input_idx = argv.iter().position(|a| a == "/assets/logo.png").unwrap();
    assert!(lower_third_input_idx < logo_input_idx, "assets are pushed in ascending asset id order");

    let ov_acc_0 = filter.find("ov0_scaled").unwrap();
    let ov_acc_1 = filter.find("ov1_scaled").unwrap();
    assert!(ov_acc_0 < ov_acc_1, "layer-1 overlay (ov0) is built before layer-5 overlay (ov1)");
}

#[test]
fn static_image_and_api_image_overlays_loop_but_video_overlay_does_not() {
    let image = Asset {
        id: 20,
        name: "static".into(),
        variant: AssetVariant::StaticImage { path: "/assets/static.png".into() },
        x: 0.0,
        y: 0.0,
        width: None,
        height: None,
        opacity: 1.0,
        refresh_interval_secs: None,
        location: None,
    };
    let clip = Asset {
        id: 21,
        name: "clip".into(),
        variant: AssetVariant::Video { path: "/assets/clip.mp4".into() },
        x: 0.0,
        y: 0.0,
        width: None,
        height: None,
        opacity: 1.0,
        refresh_interval_secs: None,
        location: None,
    };

    let t = timeline(
        vec![
            Track { id: 1, kind: TrackKind::Video, layer: 0, cues: vec![cam_cue(1, 1, 0.0, 30.0, TransitionKind::Cut, 0.0)] },
            Track {
                id: 2,
                kind: TrackKind::Overlay,
                layer: 1,
                cues: vec![overlay_cue(2, 20, 0.0, 10.0, 0.0, 0.0), overlay_cue(3, 21, 10.0, 10.0, 0.0, 0.0)],
            },
        ],
        30.0,
    );
    let mut assets = BTreeMap::new();
    assets.insert(20, image);
    assets.insert(21, clip);

    let inputs = ProgramEncoderInputs {
        timeline: &t,
        encoder_binary: "ffmpeg",
        camera_relay_urls: camera_urls(&[(1, "rtmp://127.0.0.1/live/camera_1")]),
        assets,
        output: OutputTarget::Preview { hls_mount_url: "rtmp://127.0.0.1/preview".into() },
    };
    let argv = build_argv(&inputs);

    let static_idx = argv.iter().position(|a| a == "/assets/static.png").unwrap();
    let clip_idx = argv.iter().position(|a| a == "/assets/clip.mp4").unwrap();
    assert_eq!(argv[static_idx - 2], "-loop");
    assert_eq!(argv[static_idx - 1], "1");
    assert_ne!(argv[clip_idx - 2], "-loop");
}

#[test]
fn destination_output_tees_to_every_url_with_flv_format_tags() {
    let t = timeline(
        vec![Track { id: 1, kind: TrackKind::Video, layer: 0, cues: vec![cam_cue(1, 1, 0.0, 30.0, TransitionKind::Cut, 0.0)] }],
        30.0,
    );
    let inputs = ProgramEncoderInputs {
        timeline: &t,
        encoder_binary: "ffmpeg",
        camera_relay_urls: camera_urls(&[(1, "rtmp://127.0.0.1/live/camera_1")]),
        assets: BTreeMap::new(),
        output: OutputTarget::Destinations(vec![
            "rtmp://a.rtmp.youtube.com/live2/key-a".to_string(),
            "rtmp://live-api-s.facebook.com/rtmp/key-b".to_string(),
        ]),
    };
    let argv = build_argv(&inputs);

    let format_idx = argv.iter().rposition(|a| a == "-f").unwrap();
    assert_eq!(argv[format_idx + 1], "tee");
    let tee_spec = &argv[format_idx + 2];
    assert_eq!(
        tee_spec,
        "[f=flv]rtmp://a.rtmp.youtube.com/live2/key-a|[f=flv]rtmp://live-api-s.facebook.com/rtmp/key-b"
    );
}

#[test]
fn program_encoder_uses_gop_of_twice_the_frame_rate() {
    let t = timeline(
        vec![Track { id: 1, kind: TrackKind::Video, layer: 0, cues: vec![cam_cue(1, 1, 0.0, 30.0, TransitionKind::Cut, 0.0)] }],
        30.0,
    );
    let inputs = ProgramEncoderInputs {
        timeline: &t,
        encoder_binary: "ffmpeg",
        camera_relay_urls: camera_urls(&[(1, "rtmp://127.0.0.1/live/camera_1")]),
        assets: BTreeMap::new(),
        output: OutputTarget::Preview { hls_mount_url: "rtmp://127.0.0.1/preview".into() },
    };
    let argv = build_argv(&inputs);
    let g_idx = argv.iter().position(|a| a == "-g").unwrap();
    assert_eq!(argv[g_idx + 1], "60");
}
