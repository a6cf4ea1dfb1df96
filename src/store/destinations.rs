use crate::error::Secret;
use crate::model::{Destination, DestinationId, DestinationPlatform, WatchdogConfig, YoutubeIntegration};
use crate::store::StoreError;
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

#[async_trait]
pub trait DestinationRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Destination>, StoreError>;
    async fn get(&self, id: DestinationId) -> Result<Destination, StoreError>;
    async fn upsert(&self, destination: &Destination) -> Result<(), StoreError>;
    async fn delete(&self, id: DestinationId) -> Result<(), StoreError>;
}

pub struct SqliteDestinationRepository {
    pool: SqlitePool,
}

impl SqliteDestinationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct DestinationRow {
    id: i64,
    name: String,
    platform: String,
    rtmp_url: String,
    stream_key: String,
    youtube_channel_id: Option<String>,
    youtube_broadcast_id: Option<String>,
    youtube_stream_id: Option<String>,
    youtube_oauth_refresh_token: Option<String>,
    watchdog_check_interval_secs: i64,
    watchdog_unhealthy_threshold: i64,
}

fn platform_from_str(s: &str) -> DestinationPlatform {
    match s {
        "youtube" => DestinationPlatform::YouTube,
        "facebook" => DestinationPlatform::Facebook,
        "twitch" => DestinationPlatform::Twitch,
        _ => DestinationPlatform::Custom,
    }
}

fn platform_to_str(p: DestinationPlatform) -> &'static str {
    match p {
        DestinationPlatform::YouTube => "youtube",
        DestinationPlatform::Facebook => "facebook",
        DestinationPlatform::Twitch => "twitch",
        DestinationPlatform::Custom => "custom",
    }
}

impl From<DestinationRow> for Destination {
    fn from(row: DestinationRow) -> Self {
        let youtube = row.youtube_channel_id.map(|channel_id| YoutubeIntegration {
            channel_id,
            broadcast_id: row.youtube_broadcast_id,
            stream_id: row.youtube_stream_id,
            oauth_refresh_token: row.youtube_oauth_refresh_token.map(Secret::new),
        });
        Destination {
            id: row.id,
            name: row.name,
            platform: platform_from_str(&row.platform),
            rtmp_url: row.rtmp_url,
            stream_key: Secret::new(row.stream_key),
            youtube,
            watchdog: WatchdogConfig {
                check_interval_secs: row.watchdog_check_interval_secs as u64,
                unhealthy_threshold: row.watchdog_unhealthy_threshold as u32,
            },
        }
    }
}

#[async_trait]
impl DestinationRepository for SqliteDestinationRepository {
    async fn list(&self) -> Result<Vec<Destination>, StoreError> {
        let rows = sqlx::query_as::<_, DestinationRow>("SELECT * FROM destinations ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Destination::from).collect())
    }

    async fn get(&self, id: DestinationId) -> Result<Destination, StoreError> {
        let row = sqlx::query_as::<_, DestinationRow>("SELECT * FROM destinations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { kind: "destination", id })?;
        Ok(row.into())
    }

    async fn upsert(&self, destination: &Destination) -> Result<(), StoreError> {
        let (channel_id, broadcast_id, stream_id, refresh_token) = match &destination.youtube {
            Some(yt) => (
                Some(yt.channel_id.clone()),
                yt.broadcast_id.clone(),
                yt.stream_id.clone(),
                yt.oauth_refresh_token.as_ref().map(|s| s.expose().to_string()),
            ),
            None => (None, None, None, None),
        };

        sqlx::query(
            "INSERT INTO destinations (id, name, platform, rtmp_url, stream_key, youtube_channel_id,
                youtube_broadcast_id, youtube_stream_id, youtube_oauth_refresh_token,
                watchdog_check_interval_secs, watchdog_unhealthy_threshold)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET name=excluded.name, platform=excluded.platform,
                rtmp_url=excluded.rtmp_url, stream_key=excluded.stream_key,
                youtube_channel_id=excluded.youtube_channel_id, youtube_broadcast_id=excluded.youtube_broadcast_id,
                youtube_stream_id=excluded.youtube_stream_id,
                youtube_oauth_refresh_token=excluded.youtube_oauth_refresh_token,
                watchdog_check_interval_secs=excluded.watchdog_check_interval_secs,
                watchdog_unhealthy_threshold=excluded.watchdog_unhealthy_threshold",
        )
        .bind(destination.id)
        .bind(&destination.name)
        .bind(platform_to_str(destination.platform))
        .bind(&destination.rtmp_url)
        .bind(destination.stream_key.expose())
        .bind(channel_id)
        .bind(broadcast_id)
        .bind(stream_id)
        .bind(refresh_token)
        .bind(destination.watchdog.check_interval_secs as i64)
        .bind(destination.watchdog.unhealthy_threshold as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: DestinationId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM destinations WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }
}
