use crate::polling::DEFAULT_POLL_INTERVAL;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

const LONG_ABOUT: &str = r#"
TaskLens - a to-do list where every task is analyzed by an LLM

Every new task gets a background analysis: a worker asks the configured
LLM for actionable steps and stores the answer with the task. You can then
ask follow-up questions about any task.

Getting started:
  tasklens config set llm.endpoint "https://api.example.com/v1/chat/completions"
  tasklens config set llm.api_key "sk-..."
  tasklens config set llm.model "small-instruct"
  tasklens user add you@example.com
  tasklens serve                       # API on 127.0.0.1:3000 + worker
  tasklens task add "Buy milk" --user 1
  tasklens task show 1 --wait

Configuration precedence:
  command-line flags > TASKLENS_* environment variables > 'tasklens config' > defaults
"#;

#[derive(Parser, Clone)]
#[command(name = "tasklens")]
#[command(about = "To-do list with background LLM analysis and follow-up questions")]
#[command(long_about = LONG_ABOUT)]
#[command(version)]
pub struct Cli {
    /// Database file (default: TASKLENS_DB or the user data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Enable verbose output (-v)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output (-q)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by the commands that run the analysis worker
#[derive(Args, Clone, Debug, Default)]
pub struct WorkerArgs {
    /// Maximum analyses running at once (overrides worker.concurrency)
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Seconds before a task stuck in PROCESSING is marked ERROR
    #[arg(long)]
    pub processing_timeout: Option<u64>,

    /// Write logs to the rotated log file instead of stderr
    #[arg(long)]
    pub log_file: bool,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the HTTP API, with an embedded analysis worker unless --no-worker
    ///
    /// Examples:
    ///   tasklens serve
    ///   tasklens serve --addr 0.0.0.0:8080 --concurrency 4
    ///   tasklens serve --no-worker    # run 'tasklens worker' separately
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: SocketAddr,

        /// Do not process analysis jobs in this process
        #[arg(long)]
        no_worker: bool,

        #[command(flatten)]
        worker: WorkerArgs,
    },

    /// Process analysis jobs without serving HTTP
    Worker {
        #[command(flatten)]
        worker: WorkerArgs,
    },

    /// User management
    #[command(subcommand)]
    User(UserCommands),

    /// Task management
    #[command(subcommand)]
    Task(TaskCommands),

    /// Configuration management
    ///
    /// Persistent settings stored in the database.
    ///
    /// Examples:
    ///   tasklens config set llm.model "small-instruct"
    ///   tasklens config get llm.api_key
    ///   tasklens config list --prefix worker
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Clone)]
pub enum UserCommands {
    /// Register a user
    ///
    /// Examples:
    ///   tasklens user add ada@example.com --name "Ada"
    Add {
        /// Email address (unique)
        email: String,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum TaskCommands {
    /// Create a task and queue its analysis
    ///
    /// Examples:
    ///   tasklens task add "Buy milk" --user 1
    ///   tasklens task add "File taxes" --user 1 --priority high --due 2026-04-30
    Add {
        /// Task title
        title: String,

        /// Owner user ID
        #[arg(long)]
        user: i64,

        /// Task description, used as context for the analysis
        #[arg(short, long)]
        description: Option<String>,

        /// Priority: low, medium, high (default: medium)
        #[arg(long)]
        priority: Option<String>,

        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long)]
        due: Option<String>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// List a user's tasks, newest first
    List {
        /// Owner user ID
        #[arg(long)]
        user: i64,

        /// Filter by status: pending, in_progress, completed
        #[arg(long)]
        status: Option<String>,

        /// Filter by priority: low, medium, high
        #[arg(long)]
        priority: Option<String>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show a task with its AI threads
    ///
    /// With --wait, polls until the analysis is no longer PROCESSING.
    Show {
        /// Task ID
        id: i64,

        /// Wait for the analysis to finish
        #[arg(long)]
        wait: bool,

        /// Seconds to wait before giving up (with --wait)
        #[arg(long, default_value = "120")]
        timeout: u64,

        /// Milliseconds between polls (with --wait)
        #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
        interval: u64,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Edit a task. The AI status cannot be edited.
    Update {
        /// Task ID
        id: i64,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long, conflicts_with = "clear_description")]
        description: Option<String>,

        /// Remove the description
        #[arg(long)]
        clear_description: bool,

        /// Status: pending, in_progress, completed
        #[arg(long)]
        status: Option<String>,

        /// Priority: low, medium, high
        #[arg(long)]
        priority: Option<String>,

        /// Due date (YYYY-MM-DD or RFC 3339)
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,

        /// Remove the due date
        #[arg(long)]
        clear_due: bool,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Delete a task and its threads
    Delete {
        /// Task ID
        id: i64,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Ask a follow-up question about a task
    ///
    /// Examples:
    ///   tasklens task ask 1 "When should I go?"
    Ask {
        /// Task ID
        id: i64,

        /// The question
        question: String,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Set a configuration value
    ///
    /// Examples:
    ///   tasklens config set llm.endpoint "http://localhost:8080/v1/chat/completions"
    ///   tasklens config set worker.concurrency 4
    Set {
        /// Configuration key (e.g., llm.endpoint)
        key: String,

        /// Configuration value
        value: String,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Get a configuration value
    ///
    /// Sensitive values (api_key, secret) are automatically masked.
    Get {
        /// Configuration key
        key: String,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// List configuration entries
    List {
        /// Filter by key prefix (e.g., "llm" shows all llm.* keys)
        #[arg(long)]
        prefix: Option<String>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Remove a configuration entry
    Unset {
        /// Configuration key to remove
        key: String,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}
