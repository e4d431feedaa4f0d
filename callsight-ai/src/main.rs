//! callsight-ai - Call transcript analysis runner
//!
//! Runs one analysis pass over the shared SQLite database and exits.
//! Ctrl-C stops the run after the in-flight batch; `--resume` continues it.

use std::path::PathBuf;

use anyhow::{Context, Result};
use callsight_ai::models::{FieldFilter, ReanalysisFilter, SelectionMode};
use callsight_ai::{AnalysisPipeline, PipelineConfig, PipelineRequest};
use callsight_common::events::{CallsightEvent, EventBus};
use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Documents not yet analyzed
    Normal,
    /// Stored call logs matching --empty-tags or --filter
    Reanalysis,
}

/// Command-line arguments for callsight-ai
#[derive(Parser, Debug)]
#[command(name = "callsight-ai")]
#[command(about = "Analyze call transcripts and store tags, sentiment and summaries")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "CALLSIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database (overrides database_path from the config file)
    #[arg(short, long, env = "CALLSIGHT_DATABASE")]
    database: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = Mode::Normal)]
    mode: Mode,

    /// Reanalysis: select call logs without tags
    #[arg(long, conflicts_with = "filter")]
    empty_tags: bool,

    /// Reanalysis: select call logs matching column:op[:value], e.g. sentiment:lte:3
    #[arg(long)]
    filter: Option<String>,

    /// Maximum number of records to analyze
    #[arg(long)]
    limit: Option<usize>,

    /// Number of eligible records to skip
    #[arg(long, default_value_t = 0)]
    offset: usize,

    /// Continue after the last completed batch of an interrupted run
    #[arg(long)]
    resume: bool,

    /// Records per batch (overrides [pipeline] batch_size)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Concurrent analysis requests (overrides [pipeline] concurrency)
    #[arg(long)]
    concurrency: Option<usize>,
}

impl Args {
    fn selection_mode(&self) -> Result<SelectionMode> {
        match self.mode {
            Mode::Normal => {
                if self.empty_tags || self.filter.is_some() {
                    warn!("--empty-tags and --filter only apply to reanalysis mode; ignoring");
                }
                Ok(SelectionMode::Normal)
            }
            Mode::Reanalysis => {
                let filter = match &self.filter {
                    Some(raw) => ReanalysisFilter::Field(
                        raw.parse::<FieldFilter>()
                            .with_context(|| format!("Invalid --filter {:?}", raw))?,
                    ),
                    None if self.empty_tags => ReanalysisFilter::EmptyTags,
                    None => anyhow::bail!("reanalysis mode needs --empty-tags or --filter"),
                };
                Ok(SelectionMode::Reanalysis(filter))
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = callsight_common::config::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting callsight-ai v{}", env!("CARGO_PKG_VERSION"));

    let mode = args.selection_mode()?;

    let db_path = args
        .database
        .clone()
        .unwrap_or_else(|| toml_config.database_path_or_default());
    info!("Database: {}", db_path.display());
    let db_pool = callsight_ai::db::init_database_pool(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let mut config = PipelineConfig::resolve(&db_pool, &toml_config).await?;
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size.max(1);
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency.max(1);
    }
    info!(
        endpoint = %config.analysis.endpoint,
        batch_size = config.batch_size,
        concurrency = config.concurrency,
        "Pipeline configured"
    );

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current batch");
            ctrl_c_token.cancel();
        }
    });

    let event_bus = EventBus::new(100);
    let progress = tokio::spawn(print_progress(event_bus.subscribe()));

    let pipeline = AnalysisPipeline::new(db_pool.clone(), config, event_bus).with_cancellation(cancel);
    let request = PipelineRequest {
        mode,
        limit: args.limit,
        offset: args.offset,
        resume: args.resume,
    };

    let summary = pipeline.run(request).await?;

    // Last sender goes with the pipeline; the printer sees Closed and exits
    drop(pipeline);
    if let Err(e) = progress.await {
        warn!("Progress printer stopped abnormally: {}", e);
    }

    println!(
        "Run {} {}: processed {}, succeeded {} ({} degraded), failed {}, skipped {}",
        summary.run_id,
        summary.state.as_str(),
        summary.processed,
        summary.succeeded,
        summary.degraded,
        summary.failed,
        summary.skipped
    );
    for error in &summary.errors {
        println!("  {}: {}", error.record_id, error.message);
    }

    db_pool.close().await;
    Ok(())
}

/// One stdout line per completed batch, until the event bus closes
async fn print_progress(mut events: broadcast::Receiver<CallsightEvent>) {
    loop {
        match events.recv().await {
            Ok(CallsightEvent::AnalysisBatchCompleted {
                batch_number,
                batch_size,
                batch_failed,
                total_processed,
                total_succeeded,
                total_failed,
                ..
            }) => {
                println!(
                    "Batch {}: {} records ({} failed); total processed {}, succeeded {}, failed {}",
                    batch_number, batch_size, batch_failed, total_processed, total_succeeded, total_failed
                );
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Progress output fell behind, skipped events");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Event bus closed, progress output done");
                break;
            }
        }
    }
}
