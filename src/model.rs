//! Persistent entities of §3: Camera, Preset, Asset, Timeline, Track, Cue,
//! Destination, Settings, Schedule.
//!
//! These are plain serde-friendly structs. Validation lives with the
//! component that enforces it (cue ordering in `timeline`, preset uniqueness
//! in the repository layer) rather than on the struct itself, matching the
//! teacher's config structs: data shape here, behavior elsewhere.

use crate::error::Secret;
use serde::{Deserialize, Serialize};

pub type CameraId = i64;
pub type PresetId = i64;
pub type AssetId = i64;
pub type TimelineId = i64;
pub type TrackId = i64;
pub type CueId = i64;
pub type DestinationId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraKind {
    Stationary,
    Ptz,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub id: CameraId,
    pub name: String,
    pub host: String,
    pub rtsp_port: u16,
    pub stream_path: String,
    #[serde(skip_serializing)]
    pub username: String,
    #[serde(skip_serializing)]
    pub password: Secret,
    pub kind: CameraKind,
    pub onvif_port_override: Option<u16>,
    pub onvif_device_url: Option<String>,
}

impl Camera {
    /// `rtsp://{host}:{port}/{stream_path}` — credentials are never embedded
    /// here; callers that need an authenticated URL must ask explicitly via
    /// `rtsp_url_with_credentials`.
    pub fn rtsp_url(&self) -> String {
        format!("rtsp://{}:{}/{}", self.host, self.rtsp_port, self.stream_path)
    }

    pub fn rtsp_url_with_credentials(&self) -> String {
        format!(
            "rtsp://{}:{}@{}:{}/{}",
            self.username,
            self.password.expose(),
            self.host,
            self.rtsp_port,
            self.stream_path
        )
    }
}

/// Normalized ONVIF pan/tilt/zoom coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PtzCoordinates {
    pub pan: f64,
    pub tilt: f64,
    pub zoom: f64,
}

impl PtzCoordinates {
    pub fn in_range(&self) -> bool {
        (-1.0..=1.0).contains(&self.pan)
            && (-1.0..=1.0).contains(&self.tilt)
            && (0.0..=1.0).contains(&self.zoom)
    }

    /// Device tolerance check used by the round-trip law in §8:
    /// `SetPreset` followed by `GetStatus` must agree within mechanical
    /// tolerance on each axis.
    pub fn within_tolerance(&self, other: &PtzCoordinates, tolerance: f64) -> bool {
        (self.pan - other.pan).abs() <= tolerance
            && (self.tilt - other.tilt).abs() <= tolerance
            && (self.zoom - other.zoom).abs() <= tolerance
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    pub id: PresetId,
    pub camera_id: CameraId,
    pub name: String,
    pub coordinates: PtzCoordinates,
    /// The token the camera itself uses, when the device returned one;
    /// otherwise `preset id as a string` per §3.
    pub camera_preset_token: Option<String>,
}

impl Preset {
    pub fn device_token(&self) -> String {
        self.camera_preset_token
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssetVariant {
    StaticImage { path: String },
    ApiImage { url: String },
    Video { path: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LocationAnnotation {
    pub city: String,
    pub state: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub name: String,
    pub variant: AssetVariant,
    pub x: f64,
    pub y: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub opacity: f64,
    pub refresh_interval_secs: Option<u32>,
    pub location: Option<LocationAnnotation>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    pub id: TimelineId,
    pub name: String,
    pub duration_secs: f64,
    pub frame_rate: u32,
    pub resolution: Resolution,
    pub loop_playback: bool,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Overlay,
    Audio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub kind: TrackKind,
    /// z-order, overlays only; higher = on top.
    pub layer: i32,
    pub cues: Vec<Cue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionKind {
    Cut,
    Fade,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CueAction {
    ShowCamera {
        camera_id: CameraId,
        preset_id: Option<PresetId>,
    },
    ShowMedia {
        asset_id: AssetId,
    },
    ShowOverlay {
        asset_id: AssetId,
        fade_in_secs: f64,
        fade_out_secs: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cue {
    pub id: CueId,
    pub start_time: f64,
    pub duration: f64,
    pub action: CueAction,
    pub transition: TransitionKind,
    pub transition_duration: f64,
}

impl Cue {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    pub fn covers(&self, t: f64) -> bool {
        self.start_time <= t && t < self.end_time()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestinationPlatform {
    YouTube,
    Facebook,
    Twitch,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    pub check_interval_secs: u64,
    pub unhealthy_threshold: u32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            unhealthy_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeIntegration {
    pub channel_id: String,
    pub broadcast_id: Option<String>,
    pub stream_id: Option<String>,
    #[serde(skip_serializing)]
    pub oauth_refresh_token: Option<Secret>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub id: DestinationId,
    pub name: String,
    pub platform: DestinationPlatform,
    pub rtmp_url: String,
    #[serde(skip_serializing)]
    pub stream_key: Secret,
    pub youtube: Option<YoutubeIntegration>,
    pub watchdog: WatchdogConfig,
}

impl Destination {
    /// Full RTMP target including the stream key, used only when constructing
    /// the encoder argv — never logged or returned to callers.
    pub fn full_rtmp_url(&self) -> String {
        format!("{}/{}", self.rtmp_url.trim_end_matches('/'), self.stream_key.expose())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub state: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub appliance_name: String,
    pub timezone: String,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScheduleWindow {
    /// Bit `i` (0 = Monday) set means the schedule is active that weekday.
    pub weekday_bitmap: u8,
    pub start_minute_of_day: u16,
    pub end_minute_of_day: u16,
    pub overnight: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: i64,
    pub window: ScheduleWindow,
    pub timezone: String,
    pub timelines: Vec<(TimelineId, u32)>,
    pub destination_ids: Vec<DestinationId>,
}
