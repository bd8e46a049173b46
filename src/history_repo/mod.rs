// SQLite reading history. One append-only row per reading, keyed by (user_id, recorded_at).
// recorded_at is milliseconds since the Unix epoch (UTC); date filters are computed from it.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::instrument;

use crate::error::PersistenceError;
use crate::models::{DataOverview, HealthAverages, Reading, UserDataCount};
use crate::sinks::PersistenceSink;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

pub struct HistoryRepo {
    pool: SqlitePool,
}

impl HistoryRepo {
    /// Connect to SQLite at `path`, create parent dir and DB if missing, enable WAL + pragmas.
    pub async fn connect(
        path: &str,
        max_pool_size: u32,
        busy_timeout: Duration,
    ) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    /// Shared pool (the account store lives in the same database).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sensor_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                recorded_at INTEGER NOT NULL,
                heart_rate REAL NOT NULL,
                temperature REAL NOT NULL,
                ecg REAL NOT NULL,
                spo2 REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sensor_data_user_time ON sensor_data(user_id, recorded_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, reading), fields(repo = "history", operation = "insert_reading"))]
    pub async fn insert_reading(&self, user_id: i64, reading: &Reading) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO sensor_data (user_id, recorded_at, heart_rate, temperature, ecg, spo2) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user_id)
        .bind(reading.timestamp_ms())
        .bind(reading.heart_rate)
        .bind(reading.temperature)
        .bind(reading.ecg)
        .bind(reading.spo2)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The most recent `limit` readings of a user, oldest first.
    pub async fn get_recent_readings(
        &self,
        user_id: i64,
        limit: u32,
    ) -> anyhow::Result<Vec<Reading>> {
        let rows = sqlx::query(
            "SELECT recorded_at, heart_rate, temperature, ecg, spo2
             FROM sensor_data WHERE user_id = $1 ORDER BY recorded_at DESC, id DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(Self::parse_reading_row(&row)?);
        }
        out.reverse();
        Ok(out)
    }

    /// Every reading of a user in time order.
    #[instrument(skip(self), fields(repo = "history", operation = "get_user_readings"))]
    pub async fn get_user_readings(&self, user_id: i64) -> anyhow::Result<Vec<Reading>> {
        let rows = sqlx::query(
            "SELECT recorded_at, heart_rate, temperature, ecg, spo2
             FROM sensor_data WHERE user_id = $1 ORDER BY recorded_at ASC, id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::parse_reading_row).collect()
    }

    /// Readings of a user recorded on `date` (UTC calendar day), in time order.
    #[instrument(skip(self), fields(repo = "history", operation = "get_user_readings_on"))]
    pub async fn get_user_readings_on(
        &self,
        user_id: i64,
        date: NaiveDate,
    ) -> anyhow::Result<Vec<Reading>> {
        let (from_ts, to_ts) = day_bounds_ms(date)?;
        let rows = sqlx::query(
            "SELECT recorded_at, heart_rate, temperature, ecg, spo2
             FROM sensor_data WHERE user_id = $1 AND recorded_at >= $2 AND recorded_at < $3
             ORDER BY recorded_at ASC, id ASC",
        )
        .bind(user_id)
        .bind(from_ts)
        .bind(to_ts)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::parse_reading_row).collect()
    }

    /// Channel averages over the trailing `days`. None when the user has no rows in the window.
    #[instrument(skip(self), fields(repo = "history", operation = "average_since"))]
    pub async fn average_over_days(
        &self,
        user_id: i64,
        days: u32,
    ) -> anyhow::Result<Option<HealthAverages>> {
        let cutoff = Utc::now().timestamp_millis() - (days as i64) * MS_PER_DAY;
        let row = sqlx::query(
            "SELECT AVG(heart_rate) AS avg_hr, AVG(temperature) AS avg_temp,
                    AVG(ecg) AS avg_ecg, AVG(spo2) AS avg_spo2
             FROM sensor_data WHERE user_id = $1 AND recorded_at >= $2",
        )
        .bind(user_id)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;

        let avg_hr: Option<f64> = row.try_get("avg_hr")?;
        let Some(average_heart_rate) = avg_hr else {
            return Ok(None);
        };
        Ok(Some(HealthAverages {
            average_heart_rate,
            average_temperature: row.try_get::<Option<f64>, _>("avg_temp")?.unwrap_or(f64::NAN),
            average_ecg: row.try_get::<Option<f64>, _>("avg_ecg")?.unwrap_or(f64::NAN),
            average_spo2: row.try_get::<Option<f64>, _>("avg_spo2")?.unwrap_or(f64::NAN),
        }))
    }

    /// Every account with its stored reading count, most data first.
    pub async fn users_with_data(&self) -> anyhow::Result<Vec<UserDataCount>> {
        let rows = sqlx::query(
            "SELECT users.id AS id, users.username AS username, COUNT(sensor_data.id) AS data_count
             FROM users LEFT JOIN sensor_data ON users.id = sensor_data.user_id
             GROUP BY users.id ORDER BY data_count DESC, users.id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(UserDataCount {
                id: row.try_get("id")?,
                username: row.try_get("username")?,
                data_count: row.try_get("data_count")?,
            });
        }
        Ok(out)
    }

    /// Record count and first/last day with data; used when a requested day is empty.
    pub async fn data_overview(&self, user_id: i64) -> anyhow::Result<DataOverview> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, MIN(recorded_at) AS first_ts, MAX(recorded_at) AS last_ts
             FROM sensor_data WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        let first_ts: Option<i64> = row.try_get("first_ts")?;
        let last_ts: Option<i64> = row.try_get("last_ts")?;
        Ok(DataOverview {
            total_records: row.try_get("total")?,
            first_date: first_ts.and_then(ms_to_date),
            last_date: last_ts.and_then(ms_to_date),
        })
    }

    fn parse_reading_row(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Reading> {
        let recorded_at: i64 = row.try_get("recorded_at")?;
        let timestamp = DateTime::<Utc>::from_timestamp_millis(recorded_at)
            .ok_or_else(|| anyhow::anyhow!("recorded_at out of range: {}", recorded_at))?;
        Ok(Reading {
            heart_rate: row.try_get("heart_rate")?,
            temperature: row.try_get("temperature")?,
            ecg: row.try_get("ecg")?,
            spo2: row.try_get("spo2")?,
            timestamp,
        })
    }
}

#[async_trait]
impl PersistenceSink for HistoryRepo {
    async fn append(&self, user_id: i64, reading: &Reading) -> Result<(), PersistenceError> {
        self.insert_reading(user_id, reading).await?;
        Ok(())
    }

    async fn load_recent(
        &self,
        user_id: i64,
        limit: u32,
    ) -> Result<Vec<Reading>, PersistenceError> {
        Ok(self.get_recent_readings(user_id, limit).await?)
    }
}

/// [start, end) of a UTC calendar day in epoch milliseconds.
fn day_bounds_ms(date: NaiveDate) -> anyhow::Result<(i64, i64)> {
    let start = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("invalid date {}", date))?
        .and_utc()
        .timestamp_millis();
    Ok((start, start + MS_PER_DAY))
}

fn ms_to_date(ms: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(ms).map(|dt| dt.date_naive())
}
