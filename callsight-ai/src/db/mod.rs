//! Database access for callsight-ai
//!
//! Free async functions over a `SqlitePool`, one module per table.

pub mod call_logs;
pub mod documents;
pub mod markers;
pub mod metadata;
pub mod runs;
pub mod settings;

use callsight_common::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open the shared database and make sure the pipeline schema exists
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    callsight_common::db::init_database(db_path).await
}
