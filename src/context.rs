use crate::config::resolve_db_path;
use crate::db::{create_pool, run_migrations};
use crate::error::Result;
use sqlx::SqlitePool;
use std::path::PathBuf;

/// An opened, migrated database
#[derive(Debug)]
pub struct AppContext {
    pub db_path: PathBuf,
    pub pool: SqlitePool,
}

impl AppContext {
    /// Open the database named by `--db`, `TASKLENS_DB` or the default
    /// location, creating the file and its directory on first use.
    pub async fn open(db: Option<PathBuf>) -> Result<Self> {
        let db_path = resolve_db_path(db)?;

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = create_pool(&db_path).await?;
        run_migrations(&pool).await?;

        tracing::debug!(db = %db_path.display(), "Database ready");
        Ok(Self { db_path, pool })
    }
}
