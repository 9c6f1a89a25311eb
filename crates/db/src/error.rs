use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Invalid item: {0}")]
    Serialization(#[from] serde_json::Error),
}
