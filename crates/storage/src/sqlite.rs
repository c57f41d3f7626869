//! SQLite Repository Implementation
//!
//! Timestamps are stored as epoch milliseconds and identifiers as hyphenated
//! UUID text, so range predicates and ordering work on plain columns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};
use trail_validator::{DeliveryId, DriverId, GeoPoint, GpsSample, ShiftId};
use uuid::Uuid;

use crate::record::{DeliveryRecord, SampleRecord, ShiftRecord};
use crate::traits::MileageStore;
use crate::StorageError;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS gps_samples (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        driver_id TEXT NOT NULL,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        accuracy_m REAL,
        speed_mps REAL,
        recorded_at_ms INTEGER NOT NULL,
        deleted_at_ms INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_gps_samples_driver_time
        ON gps_samples (driver_id, recorded_at_ms)",
    "CREATE TABLE IF NOT EXISTS shifts (
        id TEXT PRIMARY KEY,
        driver_id TEXT NOT NULL,
        start_time_ms INTEGER NOT NULL,
        end_time_ms INTEGER,
        total_distance_km REAL,
        updated_at_ms INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS deliveries (
        id TEXT PRIMARY KEY,
        driver_id TEXT,
        shift_id TEXT,
        assigned_at_ms INTEGER,
        picked_up_at_ms INTEGER,
        delivered_at_ms INTEGER,
        estimated_delivery_ms INTEGER,
        deleted_at_ms INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS idx_deliveries_shift ON deliveries (shift_id)",
];

#[derive(sqlx::FromRow)]
struct SampleRow {
    latitude: f64,
    longitude: f64,
    accuracy_m: Option<f64>,
    speed_mps: Option<f64>,
    recorded_at_ms: i64,
}

#[derive(sqlx::FromRow)]
struct ShiftRow {
    id: String,
    driver_id: String,
    start_time_ms: i64,
    end_time_ms: Option<i64>,
    total_distance_km: Option<f64>,
    updated_at_ms: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    id: String,
    driver_id: Option<String>,
    shift_id: Option<String>,
    assigned_at_ms: Option<i64>,
    picked_up_at_ms: Option<i64>,
    delivered_at_ms: Option<i64>,
    estimated_delivery_ms: Option<i64>,
    deleted_at_ms: Option<i64>,
}

fn to_ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_ms(ms: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::SerializationError(format!("timestamp out of range: {}", ms)))
}

fn from_opt_ms(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, StorageError> {
    ms.map(from_ms).transpose()
}

fn parse_uuid(raw: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(raw).map_err(|e| StorageError::SerializationError(format!("bad id {:?}: {}", raw, e)))
}

impl TryFrom<SampleRow> for GpsSample {
    type Error = StorageError;

    fn try_from(row: SampleRow) -> Result<Self, Self::Error> {
        Ok(GpsSample {
            location: GeoPoint::new(row.latitude, row.longitude),
            accuracy_m: row.accuracy_m,
            speed_mps: row.speed_mps,
            recorded_at: from_ms(row.recorded_at_ms)?,
        })
    }
}

impl TryFrom<ShiftRow> for ShiftRecord {
    type Error = StorageError;

    fn try_from(row: ShiftRow) -> Result<Self, Self::Error> {
        Ok(ShiftRecord {
            id: ShiftId(parse_uuid(&row.id)?),
            driver_id: DriverId(parse_uuid(&row.driver_id)?),
            start_time: from_ms(row.start_time_ms)?,
            end_time: from_opt_ms(row.end_time_ms)?,
            total_distance_km: row.total_distance_km,
            updated_at: from_opt_ms(row.updated_at_ms)?,
        })
    }
}

impl TryFrom<DeliveryRow> for DeliveryRecord {
    type Error = StorageError;

    fn try_from(row: DeliveryRow) -> Result<Self, Self::Error> {
        Ok(DeliveryRecord {
            id: DeliveryId(parse_uuid(&row.id)?),
            driver_id: row.driver_id.as_deref().map(parse_uuid).transpose()?.map(DriverId),
            shift_id: row.shift_id.as_deref().map(parse_uuid).transpose()?.map(ShiftId),
            assigned_at: from_opt_ms(row.assigned_at_ms)?,
            picked_up_at: from_opt_ms(row.picked_up_at_ms)?,
            delivered_at: from_opt_ms(row.delivered_at_ms)?,
            estimated_delivery_time: from_opt_ms(row.estimated_delivery_ms)?,
            deleted_at: from_opt_ms(row.deleted_at_ms)?,
        })
    }
}

/// Repository backed by a SQLite connection pool
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Connect to a database URL and ensure the schema exists.
    ///
    /// `sqlite::memory:` databases live only as long as their connection, so
    /// those pools are pinned to a single connection that never expires.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<std::time::Duration>)
                .max_lifetime(None::<std::time::Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(8)
        };

        let pool = options.connect(url).await?;
        let repo = Self { pool };
        repo.migrate().await?;

        info!("Connected SQLite repository at {}", url);
        Ok(repo)
    }

    /// Create tables and indexes if missing
    pub async fn migrate(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        debug!("SQLite schema ready");
        Ok(())
    }

    pub async fn insert_sample(&self, record: &SampleRecord) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO gps_samples
                (driver_id, latitude, longitude, accuracy_m, speed_mps, recorded_at_ms, deleted_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(record.driver_id.to_string())
        .bind(record.sample.location.lat)
        .bind(record.sample.location.lon)
        .bind(record.sample.accuracy_m)
        .bind(record.sample.speed_mps)
        .bind(to_ms(record.sample.recorded_at))
        .bind(record.deleted_at.map(to_ms))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or replace a shift
    pub async fn upsert_shift(&self, shift: &ShiftRecord) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR REPLACE INTO shifts
                (id, driver_id, start_time_ms, end_time_ms, total_distance_km, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(shift.id.to_string())
        .bind(shift.driver_id.to_string())
        .bind(to_ms(shift.start_time))
        .bind(shift.end_time.map(to_ms))
        .bind(shift.total_distance_km)
        .bind(shift.updated_at.map(to_ms))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert or replace a delivery
    pub async fn upsert_delivery(&self, delivery: &DeliveryRecord) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR REPLACE INTO deliveries
                (id, driver_id, shift_id, assigned_at_ms, picked_up_at_ms,
                 delivered_at_ms, estimated_delivery_ms, deleted_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(delivery.id.to_string())
        .bind(delivery.driver_id.map(|d| d.to_string()))
        .bind(delivery.shift_id.map(|s| s.to_string()))
        .bind(delivery.assigned_at.map(to_ms))
        .bind(delivery.picked_up_at.map(to_ms))
        .bind(delivery.delivered_at.map(to_ms))
        .bind(delivery.estimated_delivery_time.map(to_ms))
        .bind(delivery.deleted_at.map(to_ms))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MileageStore for SqliteRepository {
    async fn samples_in_window(
        &self,
        driver_id: DriverId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<GpsSample>, StorageError> {
        let rows: Vec<SampleRow> = sqlx::query_as(
            "SELECT latitude, longitude, accuracy_m, speed_mps, recorded_at_ms
             FROM gps_samples
             WHERE driver_id = ?1
               AND recorded_at_ms >= ?2
               AND recorded_at_ms <= ?3
               AND deleted_at_ms IS NULL
             ORDER BY recorded_at_ms ASC, id ASC",
        )
        .bind(driver_id.to_string())
        .bind(to_ms(start))
        .bind(to_ms(end))
        .fetch_all(&self.pool)
        .await?;

        debug!("Window query for driver {} returned {} samples", driver_id, rows.len());
        rows.into_iter().map(GpsSample::try_from).collect()
    }

    async fn find_shift(&self, shift_id: ShiftId) -> Result<Option<ShiftRecord>, StorageError> {
        let row: Option<ShiftRow> = sqlx::query_as(
            "SELECT id, driver_id, start_time_ms, end_time_ms, total_distance_km, updated_at_ms
             FROM shifts
             WHERE id = ?1",
        )
        .bind(shift_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(ShiftRecord::try_from).transpose()
    }

    async fn deliveries_for_shift(
        &self,
        shift_id: ShiftId,
    ) -> Result<Vec<DeliveryRecord>, StorageError> {
        let rows: Vec<DeliveryRow> = sqlx::query_as(
            "SELECT id, driver_id, shift_id, assigned_at_ms, picked_up_at_ms,
                    delivered_at_ms, estimated_delivery_ms, deleted_at_ms
             FROM deliveries
             WHERE shift_id = ?1 AND deleted_at_ms IS NULL
             ORDER BY assigned_at_ms IS NULL, assigned_at_ms ASC, id ASC",
        )
        .bind(shift_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DeliveryRecord::try_from).collect()
    }

    async fn update_shift_distance(
        &self,
        shift_id: ShiftId,
        total_km: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            "UPDATE shifts SET total_distance_km = ?1, updated_at_ms = ?2 WHERE id = ?3",
        )
        .bind(total_km)
        .bind(to_ms(updated_at))
        .bind(shift_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
