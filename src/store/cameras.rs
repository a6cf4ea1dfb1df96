use crate::error::Secret;
use crate::model::{Camera, CameraId, CameraKind, Preset, PresetId, PtzCoordinates};
use crate::store::StoreError;
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

#[async_trait]
pub trait CameraRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Camera>, StoreError>;
    async fn get(&self, id: CameraId) -> Result<Camera, StoreError>;
    async fn upsert(&self, camera: &Camera) -> Result<(), StoreError>;
    async fn delete(&self, id: CameraId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait PresetRepository: Send + Sync {
    async fn list_for_camera(&self, camera_id: CameraId) -> Result<Vec<Preset>, StoreError>;
    async fn get(&self, id: PresetId) -> Result<Preset, StoreError>;
    async fn upsert(&self, preset: &Preset) -> Result<(), StoreError>;
}

pub struct SqliteCameraRepository {
    pool: SqlitePool,
}

impl SqliteCameraRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct CameraRow {
    id: i64,
    name: String,
    host: String,
    rtsp_port: i64,
    stream_path: String,
    username: String,
    password: String,
    kind: String,
    onvif_port_override: Option<i64>,
    onvif_device_url: Option<String>,
}

impl From<CameraRow> for Camera {
    fn from(row: CameraRow) -> Self {
        Camera {
            id: row.id,
            name: row.name,
            host: row.host,
            rtsp_port: row.rtsp_port as u16,
            stream_path: row.stream_path,
            username: row.username,
            password: Secret::new(row.password),
            kind: if row.kind == "ptz" { CameraKind::Ptz } else { CameraKind::Stationary },
            onvif_port_override: row.onvif_port_override.map(|p| p as u16),
            onvif_device_url: row.onvif_device_url,
        }
    }
}

#[async_trait]
impl CameraRepository for SqliteCameraRepository {
    async fn list(&self) -> Result<Vec<Camera>, StoreError> {
        let rows = sqlx::query_as::<_, CameraRow>("SELECT * FROM cameras ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Camera::from).collect())
    }

    async fn get(&self, id: CameraId) -> Result<Camera, StoreError> {
        let row = sqlx::query_as::<_, CameraRow>("SELECT * FROM cameras WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { kind: "camera", id })?;
        Ok(row.into())
    }

    async fn upsert(&self, camera: &Camera) -> Result<(), StoreError> {
        let kind = match camera.kind {
            CameraKind::Ptz => "ptz",
            CameraKind::Stationary => "stationary",
        };
        sqlx::query(
            "INSERT INTO cameras (id, name, host, rtsp_port, stream_path, username, password, kind, onvif_port_override, onvif_device_url)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name=excluded.name, host=excluded.host, rtsp_port=excluded.rtsp_port,
                stream_path=excluded.stream_path, username=excluded.username, password=excluded.password,
                kind=excluded.kind, onvif_port_override=excluded.onvif_port_override, onvif_device_url=excluded.onvif_device_url",
        )
        .bind(camera.id)
        .bind(&camera.name)
        .bind(&camera.host)
        .bind(camera.rtsp_port as i64)
        .bind(&camera.stream_path)
        .bind(&camera.username)
        .bind(camera.password.expose())
        .bind(kind)
        .bind(camera.onvif_port_override.map(|p| p as i64))
        .bind(&camera.onvif_device_url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: CameraId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM cameras WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(FromRow)]
struct PresetRow {
    id: i64,
    camera_id: i64,
    name: String,
    pan: f64,
    tilt: f64,
    zoom: f64,
    camera_preset_token: Option<String>,
}

impl From<PresetRow> for Preset {
    fn from(row: PresetRow) -> Self {
        Preset {
            id: row.id,
            camera_id: row.camera_id,
            name: row.name,
            coordinates: PtzCoordinates { pan: row.pan, tilt: row.tilt, zoom: row.zoom },
            camera_preset_token: row.camera_preset_token,
        }
    }
}

#[async_trait]
impl PresetRepository for SqliteCameraRepository {
    async fn list_for_camera(&self, camera_id: CameraId) -> Result<Vec<Preset>, StoreError> {
        let rows = sqlx::query_as::<_, PresetRow>("SELECT * FROM presets WHERE camera_id = ? ORDER BY id")
            .bind(camera_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Preset::from).collect())
    }

    async fn get(&self, id: PresetId) -> Result<Preset, StoreError> {
        let row = sqlx::query_as::<_, PresetRow>("SELECT * FROM presets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { kind: "preset", id })?;
        Ok(row.into())
    }

    async fn upsert(&self, preset: &Preset) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO presets (id, camera_id, name, pan, tilt, zoom, camera_preset_token)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET camera_id=excluded.camera_id, name=excluded.name, pan=excluded.pan,
                tilt=excluded.tilt, zoom=excluded.zoom, camera_preset_token=excluded.camera_preset_token",
        )
        .bind(preset.id)
        .bind(preset.camera_id)
        .bind(preset.name.clone())
        .bind(preset.coordinates.pan)
        .bind(preset.coordinates.tilt)
        .bind(preset.coordinates.zoom)
        .bind(&preset.camera_preset_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
