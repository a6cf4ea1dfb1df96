use crate::model::{Asset, AssetId, LocationAnnotation, Resolution, Timeline, TimelineId, Track};
use crate::store::StoreError;
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Asset>, StoreError>;
    async fn get(&self, id: AssetId) -> Result<Asset, StoreError>;
    async fn upsert(&self, asset: &Asset) -> Result<(), StoreError>;
    async fn delete(&self, id: AssetId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TimelineRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Timeline>, StoreError>;
    async fn get(&self, id: TimelineId) -> Result<Timeline, StoreError>;
    async fn upsert(&self, timeline: &Timeline) -> Result<(), StoreError>;
    async fn delete(&self, id: TimelineId) -> Result<(), StoreError>;
}

pub struct SqliteTimelineRepository {
    pool: SqlitePool,
}

impl SqliteTimelineRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct AssetRow {
    id: i64,
    name: String,
    variant_json: String,
    x: f64,
    y: f64,
    width: Option<i64>,
    height: Option<i64>,
    opacity: f64,
    refresh_interval_secs: Option<i64>,
    location_city: Option<String>,
    location_state: Option<String>,
    location_latitude: Option<f64>,
    location_longitude: Option<f64>,
}

impl TryFrom<AssetRow> for Asset {
    type Error = StoreError;

    fn try_from(row: AssetRow) -> Result<Self, Self::Error> {
        let variant = serde_json::from_str(&row.variant_json)
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
        let location = match (row.location_city, row.location_state, row.location_latitude, row.location_longitude) {
            (Some(city), Some(state), Some(latitude), Some(longitude)) => {
                Some(LocationAnnotation { city, state, latitude, longitude })
            }
            _ => None,
        };
        Ok(Asset {
            id: row.id,
            name: row.name,
            variant,
            x: row.x,
            y: row.y,
            width: row.width.map(|w| w as u32),
            height: row.height.map(|h| h as u32),
            opacity: row.opacity,
            refresh_interval_secs: row.refresh_interval_secs.map(|s| s as u32),
            location,
        })
    }
}

#[async_trait]
impl AssetRepository for SqliteTimelineRepository {
    async fn list(&self) -> Result<Vec<Asset>, StoreError> {
        let rows = sqlx::query_as::<_, AssetRow>("SELECT * FROM assets ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Asset::try_from).collect()
    }

    async fn get(&self, id: AssetId) -> Result<Asset, StoreError> {
        let row = sqlx::query_as::<_, AssetRow>("SELECT * FROM assets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { kind: "asset", id })?;
        row.try_into()
    }

    async fn upsert(&self, asset: &Asset) -> Result<(), StoreError> {
        let variant_json =
            serde_json::to_string(&asset.variant).expect("AssetVariant serialization never fails");
        let (city, state, latitude, longitude) = match &asset.location {
            Some(loc) => (Some(loc.city.clone()), Some(loc.state.clone()), Some(loc.latitude), Some(loc.longitude)),
            None => (None, None, None, None),
        };

        sqlx::query(
            "INSERT INTO assets (id, name, variant_json, x, y, width, height, opacity, refresh_interval_secs,
                location_city, location_state, location_latitude, location_longitude)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name=excluded.name, variant_json=excluded.variant_json, x=excluded.x,
                y=excluded.y, width=excluded.width, height=excluded.height, opacity=excluded.opacity,
                refresh_interval_secs=excluded.refresh_interval_secs, location_city=excluded.location_city,
                location_state=excluded.location_state, location_latitude=excluded.location_latitude,
                location_longitude=excluded.location_longitude",
        )
        .bind(asset.id)
        .bind(&asset.name)
        .bind(variant_json)
        .bind(asset.x)
        .bind(asset.y)
        .bind(asset.width.map(|w| w as i64))
        .bind(asset.height.map(|h| h as i64))
        .bind(asset.opacity)
        .bind(asset.refresh_interval_secs.map(|s| s as i64))
        .bind(city)
        .bind(state)
        .bind(latitude)
        .bind(longitude)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: AssetId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM assets WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(FromRow)]
struct TimelineRow {
    id: i64,
    name: String,
    duration_secs: f64,
    frame_rate: i64,
    width: i64,
    height: i64,
    loop_playback: bool,
    tracks_json: String,
}

impl TryFrom<TimelineRow> for Timeline {
    type Error = StoreError;

    fn try_from(row: TimelineRow) -> Result<Self, Self::Error> {
        let tracks: Vec<Track> = serde_json::from_str(&row.tracks_json)
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
        Ok(Timeline {
            id: row.id,
            name: row.name,
            duration_secs: row.duration_secs,
            frame_rate: row.frame_rate as u32,
            resolution: Resolution { width: row.width as u32, height: row.height as u32 },
            loop_playback: row.loop_playback,
            tracks,
        })
    }
}

#[async_trait]
impl TimelineRepository for SqliteTimelineRepository {
    async fn list(&self) -> Result<Vec<Timeline>, StoreError> {
        let rows = sqlx::query_as::<_, TimelineRow>("SELECT * FROM timelines ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Timeline::try_from).collect()
    }

    async fn get(&self, id: TimelineId) -> Result<Timeline, StoreError> {
        let row = sqlx::query_as::<_, TimelineRow>("SELECT * FROM timelines WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { kind: "timeline", id })?;
        row.try_into()
    }

    async fn upsert(&self, timeline: &Timeline) -> Result<(), StoreError> {
        let tracks_json =
            serde_json::to_string(&timeline.tracks).expect("Vec<Track> serialization never fails");

        sqlx::query(
            "INSERT INTO timelines (id, name, duration_secs, frame_rate, width, height, loop_playback, tracks_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name=excluded.name, duration_secs=excluded.duration_secs,
                frame_rate=excluded.frame_rate, width=excluded.width, height=excluded.height,
                loop_playback=excluded.loop_playback, tracks_json=excluded.tracks_json",
        )
        .bind(timeline.id)
        .bind(&timeline.name)
        .bind(timeline.duration_secs)
        .bind(timeline.frame_rate as i64)
        .bind(timeline.resolution.width as i64)
        .bind(timeline.resolution.height as i64)
        .bind(timeline.loop_playback)
        .bind(tracks_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: TimelineId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM timelines WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }
}
