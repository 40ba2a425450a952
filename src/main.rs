use clap::Parser;
use tasklens::cli::{Cli, Commands};
use tasklens::cli_handlers::{
    handle_config_command, handle_serve_command, handle_task_command, handle_user_command,
    handle_worker_command,
};
use tasklens::context::AppContext;
use tasklens::error::Result;
use tasklens::logging::{
    cleanup_old_logs, init_logging, log_dir, log_file_path, ApplicationMode, LoggingConfig,
    DEFAULT_RETENTION_DAYS,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (mode, log_file) = match &cli.command {
        Commands::Serve { worker, .. } => (ApplicationMode::Server, worker.log_file),
        Commands::Worker { worker } => (ApplicationMode::Worker, worker.log_file),
        _ => (ApplicationMode::Cli, false),
    };

    let mut log_config = LoggingConfig::for_mode(mode).with_args(cli.quiet, cli.verbose, cli.json);
    if log_file {
        match log_file_path(mode) {
            Ok(path) => log_config = log_config.with_file_output(path),
            Err(e) => eprintln!("Warning: file logging unavailable, using stderr: {}", e),
        }
    }

    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if log_file {
        let retention_days = std::env::var("TASKLENS_LOG_RETENTION_DAYS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RETENTION_DAYS);
        if let Ok(dir) = log_dir() {
            cleanup_old_logs(&dir, retention_days).ok();
        }
    }

    if let Err(e) = run(cli).await {
        if e.is_client_error() {
            tracing::debug!(error = %e, "Command rejected");
        } else {
            tracing::error!(error = %e, "Command failed");
        }

        match serde_json::to_string_pretty(&e.to_error_response()) {
            Ok(body) => eprintln!("{}", body),
            Err(_) => eprintln!("Error: {}", e),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = AppContext::open(cli.db).await?;

    match cli.command {
        Commands::Serve {
            addr,
            no_worker,
            worker,
        } => handle_serve_command(&ctx, addr, no_worker, &worker).await,
        Commands::Worker { worker } => handle_worker_command(&ctx, &worker).await,
        Commands::User(cmd) => handle_user_command(&ctx, cmd).await,
        Commands::Task(cmd) => handle_task_command(&ctx, cmd).await,
        Commands::Config(cmd) => handle_config_command(&ctx, cmd).await,
    }
}
