//! Helpers shared by the CLI handlers: date parsing and human-readable
//! rendering of tasks and threads.

use crate::db::models::{AiStatus, AiThread, Task, TaskWithThreads, ThreadType};
use crate::error::{Result, TaskLensError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Accepts RFC 3339 or a plain `YYYY-MM-DD` (midnight UTC)
pub fn parse_due_date(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            TaskLensError::InvalidInput(format!(
                "Invalid due date '{}'. Use YYYY-MM-DD or RFC 3339",
                input
            ))
        })
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Get a badge for the AI status
pub fn get_ai_status_badge(status: AiStatus) -> &'static str {
    match status {
        AiStatus::None => "·",
        AiStatus::Processing => "…",
        AiStatus::Completed => "✓",
        AiStatus::Error => "✗",
    }
}

pub fn format_task_line(task: &Task) -> String {
    format!(
        "{} #{} {} [{} / {}] ai:{}",
        get_ai_status_badge(task.ai_status),
        task.id,
        task.title,
        task.status,
        task.priority,
        task.ai_status
    )
}

fn thread_label(thread: &AiThread) -> &'static str {
    match thread.thread_type {
        ThreadType::AutoSuggestion => "Suggestion",
        ThreadType::UserQuestion => "You",
        ThreadType::AiAnswer => "AI",
    }
}

pub fn print_task_with_threads(item: &TaskWithThreads) {
    let task = &item.task;
    println!("{}", format_task_line(task));
    if let Some(description) = &task.description {
        println!("  {}", description);
    }
    if let Some(due) = task.due_date {
        println!("  due {}", due.format("%Y-%m-%d"));
    }

    for thread in &item.threads {
        println!();
        println!(
            "[{}] {}",
            thread_label(thread),
            thread.created_at.format("%Y-%m-%d %H:%M")
        );
        for line in thread.content.lines() {
            println!("  {}", line);
        }
    }
}
