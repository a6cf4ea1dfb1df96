use crate::model::{DestinationId, Schedule, ScheduleWindow, TimelineId};
use crate::store::StoreError;
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Schedule>, StoreError>;
    async fn get(&self, id: i64) -> Result<Schedule, StoreError>;
    async fn upsert(&self, schedule: &Schedule) -> Result<(), StoreError>;
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct ScheduleRow {
    id: i64,
    weekday_bitmap: i64,
    start_minute_of_day: i64,
    end_minute_of_day: i64,
    overnight: bool,
    timezone: String,
    timelines_json: String,
    destination_ids_json: String,
}

impl TryFrom<ScheduleRow> for Schedule {
    type Error = StoreError;

    fn try_from(row: ScheduleRow) -> Result<Self, Self::Error> {
        let timelines: Vec<(TimelineId, u32)> = serde_json::from_str(&row.timelines_json)
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
        let destination_ids: Vec<DestinationId> = serde_json::from_str(&row.destination_ids_json)
            .map_err(|e| StoreError::Database(sqlx::Error::Decode(Box::new(e))))?;
        Ok(Schedule {
            id: row.id,
            window: ScheduleWindow {
                weekday_bitmap: row.weekday_bitmap as u8,
                start_minute_of_day: row.start_minute_of_day as u16,
                end_minute_of_day: row.end_minute_of_day as u16,
                overnight: row.overnight,
            },
            timezone: row.timezone,
            timelines,
            destination_ids,
        })
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    async fn list(&self) -> Result<Vec<Schedule>, StoreError> {
        let rows = sqlx::query_as::<_, ScheduleRow>("SELECT * FROM schedules ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Schedule::try_from).collect()
    }

    async fn get(&self, id: i64) -> Result<Schedule, StoreError> {
        let row = sqlx::query_as::<_, ScheduleRow>("SELECT * FROM schedules WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound { kind: "schedule", id })?;
        row.try_into()
    }

    async fn upsert(&self, schedule: &Schedule) -> Result<(), StoreError> {
        let timelines_json = serde_json::to_string(&schedule.timelines)
            .expect("Vec<(i64, u32)> serialization never fails");
        let destination_ids_json = serde_json::to_string(&schedule.destination_ids)
            .expect("Vec<i64> serialization never fails");

        sqlx::query(
            "INSERT INTO schedules (id, weekday_bitmap, start_minute_of_day, end_minute_of_day, overnight,
                timezone, timelines_json, destination_ids_json)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET weekday_bitmap=excluded.weekday_bitmap,
                start_minute_of_day=excluded.start_minute_of_day, end_minute_of_day=excluded.end_minute_of_day,
                overnight=excluded.overnight, timezone=excluded.timezone, timelines_json=excluded.timelines_json,
                destination_ids_json=excluded.destination_ids_json",
        )
        .bind(schedule.id)
        .bind(schedule.window.weekday_bitmap as i64)
        .bind(schedule.window.start_minute_of_day as i64)
        .bind(schedule.window.end_minute_of_day as i64)
        .bind(schedule.window.overnight)
        .bind(&schedule.timezone)
        .bind(timelines_json)
        .bind(destination_ids_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM schedules WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }
}
