//! MySQL repository for crossing events

use super::{CrossingEvent, CrossingStore};
use crate::camera_config::CameraId;
use crate::crossing_detector::Direction;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, MySqlPool};

/// IN/OUT totals for one camera
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CameraTotals {
    pub camera_id: CameraId,
    pub total_in: i64,
    pub total_out: i64,
}

/// Row shape of `crossing_events`
#[derive(Debug, Clone, FromRow)]
struct CrossingRow {
    camera_id: CameraId,
    track_id: u32,
    direction: String,
    occurred_at: DateTime<Utc>,
    image_path: Option<String>,
}

impl TryFrom<CrossingRow> for CrossingEvent {
    type Error = Error;

    fn try_from(row: CrossingRow) -> Result<Self> {
        let direction = match row.direction.as_str() {
            "IN" => Direction::In,
            "OUT" => Direction::Out,
            other => {
                return Err(Error::Storage(format!("unknown direction '{}'", other)));
            }
        };

        Ok(CrossingEvent {
            camera_id: row.camera_id,
            track_id: row.track_id,
            direction,
            timestamp: row.occurred_at,
            snapshot_ref: row.image_path,
        })
    }
}

/// sqlx-backed crossing store
#[derive(Clone)]
pub struct MySqlCrossingStore {
    pool: MySqlPool,
}

impl MySqlCrossingStore {
    /// Create new repository
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Create the table if missing
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS crossing_events (
                event_id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY,
                camera_id INT UNSIGNED NOT NULL,
                track_id INT UNSIGNED NOT NULL,
                direction VARCHAR(8) NOT NULL,
                occurred_at DATETIME(3) NOT NULL,
                image_path VARCHAR(512) NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                INDEX idx_camera_time (camera_id, occurred_at)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Latest events for a camera, newest first
    pub async fn recent_by_camera(
        &self,
        camera_id: CameraId,
        limit: u32,
    ) -> Result<Vec<CrossingEvent>> {
        let rows = sqlx::query_as::<_, CrossingRow>(
            r#"
            SELECT camera_id, track_id, direction, occurred_at, image_path
            FROM crossing_events
            WHERE camera_id = ?
            ORDER BY occurred_at DESC, event_id DESC
            LIMIT ?
            "#,
        )
        .bind(camera_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CrossingEvent::try_from).collect()
    }

    /// IN/OUT totals per camera
    pub async fn totals_by_camera(&self) -> Result<Vec<CameraTotals>> {
        let totals = sqlx::query_as::<_, CameraTotals>(
            r#"
            SELECT camera_id,
                   CAST(SUM(direction = 'IN') AS SIGNED) AS total_in,
                   CAST(SUM(direction = 'OUT') AS SIGNED) AS total_out
            FROM crossing_events
            GROUP BY camera_id
            ORDER BY camera_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(totals)
    }
}

impl CrossingStore for MySqlCrossingStore {
    async fn append(&self, event: &CrossingEvent) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO crossing_events (camera_id, track_id, direction, occurred_at, image_path)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.camera_id)
        .bind(event.track_id)
        .bind(event.direction.as_str())
        .bind(event.timestamp)
        .bind(event.snapshot_ref.as_deref())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_id())
    }
}
