use crate::model::{Asset, AssetId, Camera, CameraId, Preset, PresetId, PtzCoordinates};
use crate::store::{AssetRepository, CameraRepository, DestinationRepository, PresetRepository, TimelineRepository};
use crate::timeline::{OutputTarget, TimelineRunRequest};
use crate::web::error::ApiError;
use crate::web::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

async fn load_run_request(state: &AppState, timeline_id: i64) -> Result<TimelineRunRequest, ApiError> {
    let timeline = TimelineRepository::get(&*state.timelines, timeline_id).await?;
    let all_cameras = state.cameras.list().await?;
    let all_assets = AssetRepository::list(&*state.timelines).await?;

    let mut presets: HashMap<PresetId, Preset> = HashMap::new();
    for camera in &all_cameras {
        for preset in state.cameras.list_for_camera(camera.id).await? {
            presets.insert(preset.id, preset);
        }
    }

    let cameras: HashMap<CameraId, Camera> = all_cameras.into_iter().map(|c| (c.id, c)).collect();
    let assets: HashMap<AssetId, Asset> = all_assets.into_iter().map(|a| (a.id, a)).collect();
    let camera_relay_urls: HashMap<CameraId, String> = cameras
        .keys()
        .map(|&id| (id, state.config.relay_publish_url(id)))
        .collect();

    Ok(TimelineRunRequest {
        timeline,
        cameras,
        presets,
        assets,
        camera_relay_urls,
        output: OutputTarget::Preview { hls_mount_url: String::new() },
        global_onvif_override: state.config.onvif.onvif_device_url.clone(),
    })
}

#[derive(Deserialize)]
pub struct PreviewStartRequest {
    pub timeline_id: i64,
}

#[derive(Serialize)]
pub struct PreviewStartResponse {
    pub hls_url: String,
    pub mode: &'static str,
}

pub async fn preview_start(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PreviewStartRequest>,
) -> Result<Json<PreviewStartResponse>, ApiError> {
    let request = load_run_request(&state, req.timeline_id).await?;
    let hls_url = state.router.start_preview(request).await?;
    Ok(Json(PreviewStartResponse { hls_url, mode: "preview" }))
}

pub async fn preview_stop(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    state.router.stop().await?;
    Ok(Json(serde_json::json!({ "mode": "idle" })))
}

#[derive(Deserialize)]
pub struct PreviewGoLiveRequest {
    pub destination_ids: Vec<i64>,
}

#[derive(Serialize)]
pub struct PreviewGoLiveResponse {
    pub destinations: Vec<i64>,
    pub mode: &'static str,
}

pub async fn preview_go_live(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PreviewGoLiveRequest>,
) -> Result<Json<PreviewGoLiveResponse>, ApiError> {
    let mut destinations = Vec::new();
    for id in &req.destination_ids {
        destinations.push(state.destinations.get(*id).await?);
    }

    let timeline_id = state
        .router
        .active_timeline_id()
        .await
        .ok_or(crate::router::RouterError::NotPreview(state.router.mode().await))?;

    // `go_live`'s rebuild callback is synchronous (it runs while the
    // router's mutex is held), so the full run request is loaded from the
    // store up front and the callback only has to swap in the new output.
    let base_request = load_run_request(&state, timeline_id).await?;
    let ids = state
        .router
        .go_live(destinations, move |output| TimelineRunRequest {
            timeline: base_request.timeline.clone(),
            cameras: base_request.cameras.clone(),
            presets: base_request.presets.clone(),
            assets: base_request.assets.clone(),
            camera_relay_urls: base_request.camera_relay_urls.clone(),
            output,
            global_onvif_override: base_request.global_onvif_override.clone(),
        })
        .await?;

    Ok(Json(PreviewGoLiveResponse { destinations: ids, mode: "live" }))
}

#[derive(Serialize)]
pub struct PreviewStatusResponse {
    pub mode: crate::router::Mode,
    pub timeline_id: Option<i64>,
    pub timeline_name: Option<String>,
    pub hls_url: Option<String>,
    pub server_healthy: bool,
}

pub async fn preview_status(State(state): State<Arc<AppState>>) -> Result<Json<PreviewStatusResponse>, ApiError> {
    let mode = state.router.mode().await;
    let timeline_id = state.router.active_timeline_id().await;
    let timeline_name = match timeline_id {
        Some(id) => TimelineRepository::get(&*state.timelines, id).await.ok().map(|t| t.name),
        None => None,
    };
    let health = state.router.server_health().await;
    let hls_url = if mode == crate::router::Mode::Preview {
        Some(state.router.preview_hls_url())
    } else {
        None
    };

    Ok(Json(PreviewStatusResponse {
        mode,
        timeline_id,
        timeline_name,
        hls_url,
        server_healthy: health.healthy,
    }))
}

#[derive(Serialize)]
pub struct PlaybackPositionResponse {
    pub is_playing: bool,
    pub timeline_id: Option<i64>,
    pub position: Option<crate::timeline::PlaybackPosition>,
}

pub async fn preview_playback_position(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PlaybackPositionResponse>, ApiError> {
    let position = state.router.playback_position().await;
    let timeline_id = state.router.active_timeline_id().await;
    Ok(Json(PlaybackPositionResponse {
        is_playing: position.is_some(),
        timeline_id,
        position,
    }))
}

#[derive(Serialize)]
pub struct PreviewHealthResponse {
    pub status: &'static str,
    pub active_streams: Vec<crate::media_server::ActivePath>,
}

pub async fn preview_health(State(state): State<Arc<AppState>>) -> Json<PreviewHealthResponse> {
    let health = state.router.server_health().await;
    Json(PreviewHealthResponse {
        status: if health.healthy { "healthy" } else { "unhealthy" },
        active_streams: health.active_paths,
    })
}

pub async fn ptz_capture(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<i64>,
) -> Result<Json<PtzCoordinates>, ApiError> {
    let camera = CameraRepository::get(&*state.cameras, camera_id).await?;
    let coords = state
        .ptz
        .capture_position(&camera, state.config.onvif.onvif_device_url.as_deref())
        .await?;
    state.health.record_onvif_result(camera_id, true);
    Ok(Json(coords))
}

pub async fn ptz_move_to_preset(
    State(state): State<Arc<AppState>>,
    Path(preset_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let preset = PresetRepository::get(&*state.cameras, preset_id).await?;
    let camera = CameraRepository::get(&*state.cameras, preset.camera_id).await?;
    state
        .ptz
        .move_to_preset(&camera, &preset, state.config.onvif.onvif_device_url.as_deref())
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct SetPresetRequest {
    pub name: String,
    pub pan: f64,
    pub tilt: f64,
    pub zoom: f64,
}

pub async fn ptz_set_preset(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<i64>,
    Json(req): Json<SetPresetRequest>,
) -> Result<Json<Preset>, ApiError> {
    let camera = CameraRepository::get(&*state.cameras, camera_id).await?;
    let coords = PtzCoordinates { pan: req.pan, tilt: req.tilt, zoom: req.zoom };
    let provisional_id = next_preset_id();
    let token = state
        .ptz
        .set_preset(
            &camera,
            &req.name,
            coords,
            &provisional_id.to_string(),
            state.config.onvif.onvif_device_url.as_deref(),
        )
        .await?;

    let preset = Preset {
        id: provisional_id,
        camera_id,
        name: req.name,
        coordinates: coords,
        camera_preset_token: Some(token),
    };
    PresetRepository::upsert(&*state.cameras, &preset).await?;
    Ok(Json(preset))
}

fn next_preset_id() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

pub async fn ptz_status(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<i64>,
) -> Result<Json<PtzCoordinates>, ApiError> {
    let camera = CameraRepository::get(&*state.cameras, camera_id).await?;
    let coords = state
        .ptz
        .get_status(&camera, state.config.onvif.onvif_device_url.as_deref())
        .await?;
    Ok(Json(coords))
}

pub async fn destinations_validate_watchdog(
    State(state): State<Arc<AppState>>,
    Path(destination_id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let destination = state.destinations.get(destination_id).await?;
    let validation = state.watchdog.validate(&destination).await;
    Ok(Json(serde_json::json!({
        "stream_check": validation.stream_check,
        "broadcast_check": format!("{:?}", validation.broadcast_check),
        "status": validation.status,
    })))
}
