use crate::db::models::User;
use crate::error::{Result, TaskLensError};
use crate::sql_constants::{SELECT_USER_BY_EMAIL, SELECT_USER_BY_ID};
use chrono::Utc;
use sqlx::SqlitePool;

pub struct UserManager<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserManager<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a task owner. Emails are unique and compared as given after
    /// trimming.
    pub async fn add_user(&self, email: &str, name: Option<&str>) -> Result<User> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(TaskLensError::InvalidInput(format!(
                "Invalid email address: '{}'",
                email
            )));
        }

        if self.find_user_by_email(email).await?.is_some() {
            return Err(TaskLensError::InvalidInput(format!(
                "User with email '{}' already exists",
                email
            )));
        }

        let name = name.map(str::trim).filter(|n| !n.is_empty());

        let result = sqlx::query("INSERT INTO users (email, name, created_at) VALUES (?, ?, ?)")
            .bind(email)
            .bind(name)
            .bind(Utc::now())
            .execute(self.pool)
            .await?;

        let user = self.get_user(result.last_insert_rowid()).await?;
        tracing::info!(user_id = user.id, "User created");
        Ok(user)
    }

    pub async fn get_user(&self, id: i64) -> Result<User> {
        sqlx::query_as::<_, User>(SELECT_USER_BY_ID)
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(TaskLensError::UserNotFound(id))
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(SELECT_USER_BY_EMAIL)
            .bind(email.trim())
            .fetch_optional(self.pool)
            .await?;

        Ok(user)
    }

    pub(crate) async fn check_user_exists(&self, id: i64) -> Result<()> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
            .bind(id)
            .fetch_one(self.pool)
            .await?;

        if !exists {
            return Err(TaskLensError::UserNotFound(id));
        }
        Ok(())
    }
}
