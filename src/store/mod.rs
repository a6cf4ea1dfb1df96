//! Persisted state layout (§6.3) — one `Repository` trait per entity
//! family, backed by `sqlx::SqlitePool`. Grounded on the pack's sqlx usage
//! (security-union-videocall-rs): pool-per-process, `query_as!`-free
//! runtime queries with explicit row structs, migrations run at startup.
//!
//! Runtime-only state (relay states, playback positions, watchdog state)
//! is deliberately NOT here — it lives in-process in the owning component
//! (`relay::RelayPool`, `timeline::TimelineHandle`), per §9's "legitimate
//! process-wide state... model them as a single `Core` value."

mod cameras;
mod destinations;
mod schedules;
mod settings;
mod timelines;

pub use cameras::{CameraRepository, PresetRepository, SqliteCameraRepository};
pub use destinations::{DestinationRepository, SqliteDestinationRepository};
pub use schedules::{ScheduleRepository, SqliteScheduleRepository};
pub use settings::{SettingsRepository, SqliteSettingsRepository};
pub use timelines::{AssetRepository, SqliteTimelineRepository, TimelineRepository};

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("entity not found: {kind} {id}")]
    NotFound { kind: &'static str, id: i64 },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Opens the pool and runs embedded migrations. Called once at startup
/// (§9: "Init → Run → Shutdown").
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
