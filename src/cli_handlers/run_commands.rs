use crate::api::{ApiServer, AppState};
use crate::cli::WorkerArgs;
use crate::config::{ConfigOverrides, PipelineConfig};
use crate::context::AppContext;
use crate::error::Result;
use crate::llm::{LlmClient, LlmProvider};
use crate::pipeline::AnalysisPipeline;
use crate::queue::JobQueue;
use std::net::SocketAddr;
use std::sync::Arc;

impl WorkerArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            concurrency: self.concurrency,
            processing_timeout_secs: self.processing_timeout,
            history_limit: None,
        }
    }
}

async fn load_llm(ctx: &AppContext) -> Result<Arc<dyn LlmProvider>> {
    let client = LlmClient::from_pool(&ctx.pool).await?;
    tracing::info!(model = client.model(), "LLM provider configured");
    Ok(Arc::new(client))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

/// `tasklens serve`: HTTP API plus, unless disabled, the analysis worker
pub async fn handle_serve_command(
    ctx: &AppContext,
    addr: SocketAddr,
    no_worker: bool,
    args: &WorkerArgs,
) -> Result<()> {
    let config = PipelineConfig::resolve(&ctx.pool, &args.overrides()).await?;
    let llm = load_llm(ctx).await?;
    let queue = JobQueue::new(ctx.pool.clone());

    let pipeline = if no_worker {
        tracing::info!("Embedded worker disabled; run 'tasklens worker' to process analyses");
        None
    } else {
        tracing::info!(
            concurrency = config.worker.concurrency,
            processing_timeout_secs = config.processing_timeout.as_secs(),
            "Starting analysis worker"
        );
        Some(AnalysisPipeline::start(queue.clone(), llm.clone(), &config))
    };

    let state = AppState::new(queue, llm, config.history);
    let served = ApiServer::new(addr, state).run(shutdown_signal()).await;

    if let Some(pipeline) = pipeline {
        pipeline.shutdown().await;
    }

    served?;
    Ok(())
}

/// `tasklens worker`: process analysis jobs until Ctrl-C
pub async fn handle_worker_command(ctx: &AppContext, args: &WorkerArgs) -> Result<()> {
    let config = PipelineConfig::resolve(&ctx.pool, &args.overrides()).await?;
    let llm = load_llm(ctx).await?;
    let queue = JobQueue::new(ctx.pool.clone());

    tracing::info!(
        db = %ctx.db_path.display(),
        concurrency = config.worker.concurrency,
        "Analysis worker started"
    );
    let pipeline = AnalysisPipeline::start(queue, llm, &config);

    shutdown_signal().await;
    pipeline.shutdown().await;

    tracing::info!("Analysis worker stopped");
    Ok(())
}
