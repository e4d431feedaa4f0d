//! Settings database operations
//!
//! Key/value accessors over the `settings` table.

use callsight_common::{Error, Result};
use sqlx::SqlitePool;

/// Settings key holding the analysis API credential
pub const API_KEY_SETTING: &str = "analysis_api_key";

/// Get the analysis API credential stored in the database
pub async fn get_api_key(db: &SqlitePool) -> Result<Option<String>> {
    get_setting::<String>(db, API_KEY_SETTING).await
}

/// Store the analysis API credential
pub async fn set_api_key(db: &SqlitePool, key: String) -> Result<()> {
    set_setting(db, API_KEY_SETTING, key).await
}

/// Generic setting getter
pub async fn get_setting<T>(db: &SqlitePool, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match row {
        Some((Some(value),)) => {
            let parsed = value
                .parse::<T>()
                .map_err(|e| Error::Config(format!("Parse setting {} failed: {}", key, e)))?;
            Ok(Some(parsed))
        }
        _ => Ok(None),
    }
}

/// Generic setting setter
pub async fn set_setting<T: ToString>(db: &SqlitePool, key: &str, value: T) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await?;

    Ok(())
}
