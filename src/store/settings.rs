//! Settings singleton (§3/§9): read-mostly, but a write fans the new
//! location out to every `Asset` row atomically — either all assets see the
//! new location or none do (spec line "writes are serialized and fan out a
//! sync to the Asset table under a single transaction").

use crate::model::{Location, Settings};
use crate::store::StoreError;
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self) -> Result<Settings, StoreError>;
    /// Updates the singleton row and propagates `location` to every asset
    /// in the same transaction.
    async fn update(&self, settings: &Settings) -> Result<(), StoreError>;
}

pub struct SqliteSettingsRepository {
    pool: SqlitePool,
}

impl SqliteSettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct SettingsRow {
    appliance_name: String,
    timezone: String,
    city: String,
    state: String,
    latitude: f64,
    longitude: f64,
}

impl From<SettingsRow> for Settings {
    fn from(row: SettingsRow) -> Self {
        Settings {
            appliance_name: row.appliance_name,
            timezone: row.timezone,
            location: Location {
                city: row.city,
                state: row.state,
                latitude: row.latitude,
                longitude: row.longitude,
            },
        }
    }
}

#[async_trait]
impl SettingsRepository for SqliteSettingsRepository {
    async fn get(&self) -> Result<Settings, StoreError> {
        let row = sqlx::query_as::<_, SettingsRow>(
            "SELECT appliance_name, timezone, city, state, latitude, longitude FROM settings WHERE id = 0",
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound { kind: "settings", id: 0 })?;
        Ok(row.into())
    }

    async fn update(&self, settings: &Settings) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO settings (id, appliance_name, timezone, city, state, latitude, longitude)
             VALUES (0, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET appliance_name=excluded.appliance_name, timezone=excluded.timezone,
                city=excluded.city, state=excluded.state, latitude=excluded.latitude, longitude=excluded.longitude",
        )
        .bind(&settings.appliance_name)
        .bind(&settings.timezone)
        .bind(&settings.location.city)
        .bind(&settings.location.state)
        .bind(settings.location.latitude)
        .bind(settings.location.longitude)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE assets SET location_city = ?, location_state = ?, location_latitude = ?, location_longitude = ?
             WHERE location_city IS NOT NULL",
        )
        .bind(&settings.location.city)
        .bind(&settings.location.state)
        .bind(settings.location.latitude)
        .bind(settings.location.longitude)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
