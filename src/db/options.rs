//! Named JSON options (single-row-per-name pattern).
//!
//! Used for small pieces of scheduler state that must survive restarts.

use crate::db::now;
use crate::db::pool::DbPool;
use crate::error::AppError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Load and decode an option. `None` if it was never saved.
pub async fn load_option<T: DeserializeOwned>(
    pool: &DbPool,
    name: &str,
) -> Result<Option<T>, AppError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT item FROM options WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await?;

    match row {
        Some((item,)) => Ok(Some(serde_json::from_str(&item)?)),
        None => Ok(None),
    }
}

/// Encode and upsert an option.
pub async fn save_option<T: Serialize>(pool: &DbPool, name: &str, value: &T) -> Result<(), AppError> {
    let item = serde_json::to_string(value)?;

    sqlx::query(
        r#"
        INSERT INTO options (name, item, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(name) DO UPDATE SET item = excluded.item, updated_at = excluded.updated_at
        "#,
    )
    .bind(name)
    .bind(&item)
    .bind(now())
    .execute(pool)
    .await?;

    Ok(())
}
