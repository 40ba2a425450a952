pub mod models;

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

pub const SCHEMA_VERSION: &str = "0.3.0";

pub async fn create_pool(db_path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(pool)
        .await?;

    // Users own tasks; authentication lives outside this crate
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            name TEXT,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (email != '')
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            status TEXT NOT NULL DEFAULT 'PENDING',
            priority TEXT NOT NULL DEFAULT 'MEDIUM',
            ai_status TEXT NOT NULL DEFAULT 'NONE',
            ai_status_updated_at DATETIME,
            due_date DATETIME,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            CHECK (title != ''),
            CHECK (status IN ('PENDING', 'IN_PROGRESS', 'COMPLETED')),
            CHECK (priority IN ('LOW', 'MEDIUM', 'HIGH')),
            CHECK (ai_status IN ('NONE', 'PROCESSING', 'COMPLETED', 'ERROR'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Owner-scoped listing, newest first
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_tasks_user_created
        ON tasks(user_id, created_at)
        "#,
    )
    .execute(pool)
    .await?;

    // Supports the stuck-analysis sweep
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_tasks_ai_processing
        ON tasks(ai_status_updated_at)
        WHERE ai_status = 'PROCESSING'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ai_threads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id INTEGER NOT NULL,
            type TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE,
            CHECK (type IN ('AUTO_SUGGESTION', 'USER_QUESTION', 'AI_ANSWER')),
            CHECK (role IN ('USER', 'ASSISTANT', 'SYSTEM'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_ai_threads_task_created
        ON ai_threads(task_id, created_at, id)
        "#,
    )
    .execute(pool)
    .await?;

    // Durable job queue. locked_until is an epoch-millisecond lease held by
    // the worker processing the job.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            payload TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'WAITING',
            attempts INTEGER NOT NULL DEFAULT 0,
            stalled_count INTEGER NOT NULL DEFAULT 0,
            locked_until INTEGER,
            last_error TEXT,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            finished_at DATETIME,
            CHECK (state IN ('WAITING', 'ACTIVE', 'COMPLETED', 'FAILED'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_jobs_name_state
        ON jobs(name, state, id)
        "#,
    )
    .execute(pool)
    .await?;

    // Key/value settings, the persistent layer of the configuration
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES ('schema_version', ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(SCHEMA_VERSION)
    .execute(pool)
    .await?;

    Ok(())
}
