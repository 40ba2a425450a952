use crate::cli::TaskCommands;
use crate::config::{ConfigOverrides, PipelineConfig};
use crate::context::AppContext;
use crate::db::models::{Priority, TaskStatus};
use crate::error::Result;
use crate::llm::LlmClient;
use crate::polling::wait_for_analysis;
use crate::query::QueryHandler;
use crate::queue::JobQueue;
use crate::tasks::{NewTask, TaskFilter, TaskManager, TaskUpdate};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use super::utils::{format_task_line, parse_due_date, print_json, print_task_with_threads};

/// Handle all `tasklens task` subcommands
pub async fn handle_task_command(ctx: &AppContext, cmd: TaskCommands) -> Result<()> {
    match cmd {
        TaskCommands::Add {
            title,
            user,
            description,
            priority,
            due,
            format,
        } => {
            let new_task = NewTask {
                title,
                description,
                priority: priority
                    .as_deref()
                    .map(str::parse::<Priority>)
                    .transpose()?
                    .unwrap_or_default(),
                due_date: due.as_deref().map(parse_due_date).transpose()?,
            };
            handle_add(ctx, user, new_task, &format).await
        },
        TaskCommands::List {
            user,
            status,
            priority,
            format,
        } => {
            let filter = TaskFilter {
                status: status.as_deref().map(str::parse::<TaskStatus>).transpose()?,
                priority: priority.as_deref().map(str::parse::<Priority>).transpose()?,
            };
            handle_list(ctx, user, filter, &format).await
        },
        TaskCommands::Show {
            id,
            wait,
            timeout,
            interval,
            format,
        } => {
            let wait = wait.then(|| {
                (
                    Duration::from_millis(interval.max(1)),
                    Duration::from_secs(timeout),
                )
            });
            handle_show(ctx, id, wait, &format).await
        },
        TaskCommands::Update {
            id,
            title,
            description,
            clear_description,
            status,
            priority,
            due,
            clear_due,
            format,
        } => {
            let update = TaskUpdate {
                title,
                description: if clear_description {
                    Some(None)
                } else {
                    description.map(Some)
                },
                status: status.as_deref().map(str::parse::<TaskStatus>).transpose()?,
                priority: priority.as_deref().map(str::parse::<Priority>).transpose()?,
                due_date: if clear_due {
                    Some(None)
                } else {
                    due.as_deref().map(parse_due_date).transpose()?.map(Some)
                },
            };
            handle_update(ctx, id, update, &format).await
        },
        TaskCommands::Delete { id, format } => handle_delete(ctx, id, &format).await,
        TaskCommands::Ask {
            id,
            question,
            format,
        } => handle_ask(ctx, id, &question, &format).await,
    }
}

async fn handle_add(ctx: &AppContext, user_id: i64, new_task: NewTask, format: &str) -> Result<()> {
    let queue = JobQueue::new(ctx.pool.clone());
    let task = TaskManager::with_queue(&queue)
        .add_task(user_id, &new_task)
        .await?;

    if format == "json" {
        print_json(&task)?;
    } else {
        println!("{}", format_task_line(&task));
        println!("Analysis queued. Run 'tasklens task show {} --wait' to see it.", task.id);
    }

    Ok(())
}

async fn handle_list(ctx: &AppContext, user_id: i64, filter: TaskFilter, format: &str) -> Result<()> {
    let tasks = TaskManager::new(&ctx.pool)
        .find_tasks(user_id, &filter)
        .await?;

    if format == "json" {
        return print_json(&tasks);
    }

    if tasks.is_empty() {
        println!("No tasks found.");
    }
    for item in &tasks {
        println!("{}", format_task_line(&item.task));
    }

    Ok(())
}

async fn handle_show(
    ctx: &AppContext,
    id: i64,
    wait: Option<(Duration, Duration)>,
    format: &str,
) -> Result<()> {
    let tasks = TaskManager::new(&ctx.pool);

    let (item, settled) = match wait {
        Some((interval, timeout)) => {
            let outcome =
                wait_for_analysis(|| tasks.get_task_with_threads(id), interval, timeout).await?;
            let settled = outcome.is_settled();
            (outcome.into_inner(), settled)
        },
        None => (tasks.get_task_with_threads(id).await?, true),
    };

    if format == "json" {
        print_json(&item)?;
    } else {
        print_task_with_threads(&item);
    }

    if !settled {
        eprintln!("Analysis still running after the wait timeout");
    }

    Ok(())
}

async fn handle_update(ctx: &AppContext, id: i64, update: TaskUpdate, format: &str) -> Result<()> {
    let task = TaskManager::new(&ctx.pool).update_task(id, &update).await?;

    if format == "json" {
        print_json(&task)?;
    } else {
        println!("{}", format_task_line(&task));
    }

    Ok(())
}

async fn handle_delete(ctx: &AppContext, id: i64, format: &str) -> Result<()> {
    TaskManager::new(&ctx.pool).delete_task(id).await?;

    if format == "json" {
        print_json(&json!({ "deleted": id }))?;
    } else {
        println!("Deleted task #{}", id);
    }

    Ok(())
}

async fn handle_ask(ctx: &AppContext, id: i64, question: &str, format: &str) -> Result<()> {
    // Fail on an unknown task before touching the LLM configuration
    TaskManager::new(&ctx.pool).get_task(id).await?;

    let config = PipelineConfig::resolve(&ctx.pool, &ConfigOverrides::default()).await?;
    let llm = Arc::new(LlmClient::from_pool(&ctx.pool).await?);
    let handler = QueryHandler::new(ctx.pool.clone(), llm, config.history);

    let answer = handler.submit_query(id, question).await?;

    if format == "json" {
        print_json(&answer)?;
    } else {
        println!("{}", answer.content);
    }

    Ok(())
}
