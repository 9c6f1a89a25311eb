use crate::error::DbError;
use crate::models::datetime_to_timestamp;
use crate::models::{Item, ItemRow};
use chrono::Utc;
use sandbox_core::TableSpec;
use serde_json::Value;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct ItemRepository {
    pool: SqlitePool,
}

impl ItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_table(&self, table: &TableSpec) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO sandbox_tables (name, partition_key, sort_key)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                partition_key = excluded.partition_key,
                sort_key = excluded.sort_key
            "#,
        )
        .bind(&table.name)
        .bind(&table.partition_key)
        .bind(&table.sort_key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn tables(&self) -> Result<Vec<TableSpec>, DbError> {
        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT name, partition_key, sort_key
            FROM sandbox_tables
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, partition_key, sort_key)| TableSpec {
                name,
                partition_key,
                sort_key,
            })
            .collect())
    }

    pub async fn put(
        &self,
        table: &str,
        partition: &str,
        sort: Option<&str>,
        value: &Value,
    ) -> Result<Item, DbError> {
        self.ensure_table(table).await?;

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO sandbox_items (table_name, pk, sk, item, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(table_name, pk, sk) DO UPDATE SET
                item = excluded.item,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(table)
        .bind(partition)
        .bind(sort.unwrap_or_default())
        .bind(serde_json::to_string(value)?)
        .bind(datetime_to_timestamp(now))
        .execute(&self.pool)
        .await?;

        Ok(Item {
            table: table.to_string(),
            partition: partition.to_string(),
            sort: sort.map(str::to_string),
            value: value.clone(),
            updated_at: now,
        })
    }

    pub async fn get(
        &self,
        table: &str,
        partition: &str,
        sort: Option<&str>,
    ) -> Result<Option<Item>, DbError> {
        let row: Option<ItemRow> = sqlx::query_as(
            r#"
            SELECT table_name, pk, sk, item, updated_at
            FROM sandbox_items
            WHERE table_name = ? AND pk = ? AND sk = ?
            "#,
        )
        .bind(table)
        .bind(partition)
        .bind(sort.unwrap_or_default())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()))
    }

    pub async fn delete(
        &self,
        table: &str,
        partition: &str,
        sort: Option<&str>,
    ) -> Result<bool, DbError> {
        let result =
            sqlx::query("DELETE FROM sandbox_items WHERE table_name = ? AND pk = ? AND sk = ?")
                .bind(table)
                .bind(partition)
                .bind(sort.unwrap_or_default())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list(&self, table: &str) -> Result<Vec<Item>, DbError> {
        self.ensure_table(table).await?;

        let rows: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT table_name, pk, sk, item, updated_at
            FROM sandbox_items
            WHERE table_name = ?
            ORDER BY pk ASC, sk ASC
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    async fn ensure_table(&self, table: &str) -> Result<(), DbError> {
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sandbox_tables WHERE name = ?")
                .bind(table)
                .fetch_optional(&self.pool)
                .await?;

        match exists {
            Some(_) => Ok(()),
            None => Err(DbError::TableNotFound(table.to_string())),
        }
    }
}
