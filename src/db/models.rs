use crate::error::TaskLensError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Implements `as_str`, `Display` and case-insensitive `FromStr` for the
/// text-backed enums stored in the database.
macro_rules! text_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = TaskLensError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
                match normalized.as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(TaskLensError::InvalidInput(format!(
                        "Invalid {}: '{}'",
                        $label, s
                    ))),
                }
            }
        }
    };
}

/// User-controlled completion state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

text_enum!(TaskStatus, "status", {
    Pending => "PENDING",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

text_enum!(Priority, "priority", {
    Low => "LOW",
    Medium => "MEDIUM",
    High => "HIGH",
});

/// Background analysis state of a task
///
/// `NONE --create--> PROCESSING --success--> COMPLETED`
/// `PROCESSING --failure--> ERROR`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiStatus {
    #[default]
    None,
    Processing,
    Completed,
    Error,
}

text_enum!(AiStatus, "ai status", {
    None => "NONE",
    Processing => "PROCESSING",
    Completed => "COMPLETED",
    Error => "ERROR",
});

impl AiStatus {
    /// Clients keep polling while this returns true
    pub fn is_pending(&self) -> bool {
        matches!(self, AiStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AiStatus::Completed | AiStatus::Error)
    }
}

/// Provenance of a thread entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreadType {
    AutoSuggestion,
    UserQuestion,
    AiAnswer,
}

text_enum!(ThreadType, "thread type", {
    AutoSuggestion => "AUTO_SUGGESTION",
    UserQuestion => "USER_QUESTION",
    AiAnswer => "AI_ANSWER",
});

/// Conversational role, used when replaying threads to the LLM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreadRole {
    User,
    Assistant,
    System,
}

text_enum!(ThreadRole, "thread role", {
    User => "USER",
    Assistant => "ASSISTANT",
    System => "SYSTEM",
});

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub ai_status: AiStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_status_updated_at: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AiThread {
    pub id: i64,
    pub task_id: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub thread_type: ThreadType,
    pub role: ThreadRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A task together with its conversation, oldest entry first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWithThreads {
    #[serde(flatten)]
    pub task: Task,
    pub threads: Vec<AiThread>,
}
