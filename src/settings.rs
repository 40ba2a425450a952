//! Persistent key/value settings, the database layer of the configuration.

use crate::error::{Result, TaskLensError};
use sqlx::SqlitePool;

/// Keys managed by the application itself
pub const PROTECTED_KEYS: &[&str] = &["schema_version"];

pub fn check_writable(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(TaskLensError::InvalidInput(
            "Setting key cannot be empty".to_string(),
        ));
    }
    if PROTECTED_KEYS.contains(&key) {
        return Err(TaskLensError::InvalidInput(format!(
            "Cannot modify protected key: '{}'",
            key
        )));
    }
    Ok(())
}

pub async fn config_set(pool: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn config_get(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

pub async fn config_list(pool: &SqlitePool, prefix: Option<&str>) -> Result<Vec<(String, String)>> {
    let rows: Vec<(String, String)> = if let Some(p) = prefix {
        let pattern = format!("{}%", p);
        sqlx::query_as(
            "SELECT key, value FROM settings WHERE key != 'schema_version' AND key LIKE ? ORDER BY key",
        )
        .bind(pattern)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_as("SELECT key, value FROM settings WHERE key != 'schema_version' ORDER BY key")
            .fetch_all(pool)
            .await?
    };
    Ok(rows)
}

pub async fn config_unset(pool: &SqlitePool, key: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM settings WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::TestContext;

    #[tokio::test]
    async fn test_config_set_overwrite_and_get() {
        let ctx = TestContext::new().await;
        config_set(ctx.pool(), "llm.model", "v1").await.unwrap();
        config_set(ctx.pool(), "llm.model", "v2").await.unwrap();

        let value = config_get(ctx.pool(), "llm.model").await.unwrap();
        assert_eq!(value, Some("v2".to_string()));
        assert!(config_get(ctx.pool(), "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_config_list_hides_schema_version() {
        let ctx = TestContext::new().await;
        assert!(config_list(ctx.pool(), None).await.unwrap().is_empty());

        config_set(ctx.pool(), "llm.endpoint", "http://localhost:8080")
            .await
            .unwrap();
        config_set(ctx.pool(), "llm.model", "gpt-4").await.unwrap();
        config_set(ctx.pool(), "worker.concurrency", "4")
            .await
            .unwrap();

        assert_eq!(config_list(ctx.pool(), None).await.unwrap().len(), 3);
        let llm_only = config_list(ctx.pool(), Some("llm.")).await.unwrap();
        assert_eq!(
            llm_only.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            vec!["llm.endpoint", "llm.model"]
        );
    }

    #[tokio::test]
    async fn test_config_unset() {
        let ctx = TestContext::new().await;
        config_set(ctx.pool(), "to.delete", "value").await.unwrap();

        assert!(config_unset(ctx.pool(), "to.delete").await.unwrap());
        assert!(!config_unset(ctx.pool(), "to.delete").await.unwrap());
        assert!(config_get(ctx.pool(), "to.delete").await.unwrap().is_none());
    }

    #[test]
    fn test_protected_keys_are_not_writable() {
        assert!(check_writable("schema_version").is_err());
        assert!(check_writable(" ").is_err());
        assert!(check_writable("llm.model").is_ok());
    }
}
