use crate::error::DbError;
use crate::models::{EventRecord, EventRecordRow};
use sqlx::SqlitePool;

/// Persists what went over the local event bus.
#[derive(Clone)]
pub struct EventLogRepository {
    pool: SqlitePool,
}

impl EventLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, record: &EventRecord) -> Result<(), DbError> {
        let row = EventRecordRow::from(record);

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO sandbox_events (id, kind, name, payload, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.kind)
        .bind(&row.name)
        .bind(&row.payload)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Vec<EventRecord>, DbError> {
        let rows: Vec<EventRecordRow> = sqlx::query_as(
            r#"
            SELECT id, kind, name, payload, created_at
            FROM sandbox_events
            WHERE name = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    pub async fn count(&self) -> Result<i64, DbError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sandbox_events")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
