use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::storage::traits::{PersistenceGateway, RecordStore, StorageError, StorageResult};
use crate::telemetry::{PersistedRecord, Record, RecordId, RoadState};

const RECORD_COLUMNS: &str =
    "id, road_state, user_id, x, y, z, latitude, longitude, timestamp";

/// PostgreSQL implementation of RecordStore
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize database schema for processed records
    pub async fn initialize(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processed_agent_data (
                id BIGSERIAL PRIMARY KEY,
                road_state TEXT NOT NULL,
                user_id BIGINT NOT NULL,
                x INTEGER NOT NULL,
                y INTEGER NOT NULL,
                z INTEGER NOT NULL,
                latitude DOUBLE PRECISION NOT NULL,
                longitude DOUBLE PRECISION NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_processed_agent_data_user
                ON processed_agent_data(user_id, timestamp)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_one(
        tx: &mut Transaction<'_, Postgres>,
        record: &Record,
    ) -> StorageResult<PersistedRecord> {
        let data = &record.agent_data;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO processed_agent_data
                (road_state, user_id, x, y, z, latitude, longitude, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(record.road_state.as_str())
        .bind(data.user_id)
        .bind(data.accelerometer.x)
        .bind(data.accelerometer.y)
        .bind(data.accelerometer.z)
        .bind(data.gps.latitude)
        .bind(data.gps.longitude)
        .bind(data.timestamp)
        .fetch_one(&mut **tx)
        .await?;

        row_to_record(&row)
    }
}

fn row_to_record(row: &PgRow) -> StorageResult<PersistedRecord> {
    let road_state: String = row.try_get("road_state")?;
    let road_state: RoadState = road_state
        .parse()
        .map_err(|e| StorageError::Internal(format!("Bad road_state column: {}", e)))?;

    Ok(PersistedRecord {
        id: row.try_get("id")?,
        road_state,
        user_id: row.try_get("user_id")?,
        x: row.try_get("x")?,
        y: row.try_get("y")?,
        z: row.try_get("z")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        timestamp: row.try_get("timestamp")?,
    })
}

#[async_trait]
impl PersistenceGateway for PostgresRecordStore {
    async fn store(&self, batch: &[Record]) -> StorageResult<Vec<PersistedRecord>> {
        // One transaction per batch: either every row commits or none does
        let mut tx = self.pool.begin().await?;
        let mut persisted = Vec::with_capacity(batch.len());

        for record in batch {
            persisted.push(Self::insert_one(&mut tx, record).await?);
        }

        tx.commit().await?;
        Ok(persisted)
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn list(&self, limit: i64, offset: i64) -> StorageResult<Vec<PersistedRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM processed_agent_data ORDER BY id LIMIT $1 OFFSET $2",
            RECORD_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn get(&self, id: RecordId) -> StorageResult<PersistedRecord> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM processed_agent_data WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::RecordNotFound(id))?;

        row_to_record(&row)
    }

    async fn update(&self, id: RecordId, record: &Record) -> StorageResult<PersistedRecord> {
        let data = &record.agent_data;
        let row = sqlx::query(&format!(
            r#"
            UPDATE processed_agent_data
            SET road_state = $2, user_id = $3, x = $4, y = $5, z = $6,
                latitude = $7, longitude = $8, timestamp = $9
            WHERE id = $1
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(id)
        .bind(record.road_state.as_str())
        .bind(data.user_id)
        .bind(data.accelerometer.x)
        .bind(data.accelerometer.y)
        .bind(data.accelerometer.z)
        .bind(data.gps.latitude)
        .bind(data.gps.longitude)
        .bind(data.timestamp)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::RecordNotFound(id))?;

        row_to_record(&row)
    }

    async fn delete(&self, id: RecordId) -> StorageResult<PersistedRecord> {
        let row = sqlx::query(&format!(
            "DELETE FROM processed_agent_data WHERE id = $1 RETURNING {}",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StorageError::RecordNotFound(id))?;

        row_to_record(&row)
    }
}
