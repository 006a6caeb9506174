use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use retrace_common::formatter::{describe_action, format_chain, format_result};
use retrace_common::{EvidenceRecord, Point, RecordedStep, StepAction};
use retrace_engine::capture::{ActionContext, CaptureCoordinator, record_step};
use retrace_engine::config::{ConfigLoader, RetraceConfig};
use retrace_engine::decision::{AttemptEvent, DecisionEngine, ExecutionOptions};
use retrace_engine::evaluators::EvaluatorSet;
use retrace_engine::retry::{RetryPolicy, TokioClock, execute_with_retry};
use retrace_engine::scoring::{WeightTable, build_fallback_chain};
use retrace_engine::session::{TextDetector, UnavailableDetector};
use retrace_engine::telemetry::{self, JsonlTelemetryLog, RunId, TelemetryReport};
use retrace_h::HeadlessBrowser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "retrace", version, about = "Record UI steps and replay them through fallback chains")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (defaults to ./retrace.yaml, then ~/.retrace/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Build the fallback chain for a captured evidence record
    Chain {
        /// Evidence record JSON
        #[arg(long)]
        evidence: PathBuf,
        /// Print a table instead of JSON
        #[arg(long)]
        table: bool,
    },
    /// Open a page, capture evidence at a point and print the recorded step
    Capture {
        #[arg(long)]
        url: String,
        #[arg(long)]
        x: f64,
        #[arg(long)]
        y: f64,
        #[arg(long, value_enum, default_value_t = ActionArg::Click)]
        action: ActionArg,
        /// Text to type or option to select
        #[arg(long)]
        value: Option<String>,
        /// Launch browser in visible mode (not headless)
        #[arg(long)]
        visible: bool,
    },
    /// Replay a recorded step against a page
    Replay {
        /// Recorded step JSON
        #[arg(long)]
        step: PathBuf,
        #[arg(long)]
        url: String,
        #[arg(long)]
        visible: bool,
        /// Group telemetry under an existing run
        #[arg(long)]
        run_id: Option<String>,
        /// Defaults to the step file name
        #[arg(long)]
        recording_id: Option<String>,
    },
    /// Summarize recorded telemetry per strategy
    Stats {
        /// Telemetry directory (defaults to the configured one)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ActionArg {
    Click,
    Type,
    Select,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries results only.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ConfigLoader::load_from(path).await,
        None => ConfigLoader::load_default().await,
    }
    .context("Failed to load config")?;

    match args.command {
        Command::Chain { evidence, table } => run_chain(&evidence, table).await,
        Command::Capture {
            url,
            x,
            y,
            action,
            value,
            visible,
        } => run_capture(&config, &url, Point::new(x, y), action, value, visible).await,
        Command::Replay {
            step,
            url,
            visible,
            run_id,
            recording_id,
        } => run_replay(&config, &step, &url, visible, run_id, recording_id).await,
        Command::Stats { dir } => run_stats(&config, dir).await,
    }
}

async fn run_chain(path: &Path, table: bool) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let evidence: EvidenceRecord =
        serde_json::from_str(&content).context("Invalid evidence record")?;

    let chain = build_fallback_chain(&evidence);
    if table {
        print!("{}", format_chain(&chain));
    } else {
        println!("{}", chain.to_json()?);
    }
    Ok(())
}

fn step_action(action: ActionArg, value: Option<String>) -> anyhow::Result<StepAction> {
    Ok(match (action, value) {
        (ActionArg::Click, _) => StepAction::Click,
        (ActionArg::Type, Some(text)) => StepAction::Type { text },
        (ActionArg::Select, Some(value)) => StepAction::Select { value },
        (_, None) => bail!("--value is required for type and select"),
    })
}

fn text_detector() -> Arc<dyn TextDetector> {
    tracing::info!("No text detector configured; screen-text strategies are disabled");
    Arc::new(UnavailableDetector)
}

async fn run_capture(
    config: &RetraceConfig,
    url: &str,
    point: Point,
    action: ActionArg,
    value: Option<String>,
    visible: bool,
) -> anyhow::Result<()> {
    let action = step_action(action, value)?;
    let browser = HeadlessBrowser::launch(visible).await?;
    browser.navigate(url).await?;

    let coordinator = CaptureCoordinator::standard(
        browser.page(),
        text_detector(),
        &config.capture,
    );
    let (_, step) = record_step(
        &coordinator,
        WeightTable::DEFAULT,
        action,
        &ActionContext::at(point),
    )
    .await;
    tracing::info!(
        "Recorded {} with {} strategies",
        describe_action(
            &step.action,
            step.field_name.as_deref().unwrap_or_default(),
            &config.security.sensitive_fields
        ),
        step.chain.len()
    );

    println!("{}", serde_json::to_string_pretty(&step)?);
    browser.close().await?;
    Ok(())
}

async fn run_replay(
    config: &RetraceConfig,
    step_path: &Path,
    url: &str,
    visible: bool,
    run_id: Option<String>,
    recording_id: Option<String>,
) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(step_path)
        .await
        .with_context(|| format!("Failed to read {}", step_path.display()))?;
    let step: RecordedStep = serde_json::from_str(&content).context("Invalid recorded step")?;
    step.chain.validate()?;

    let run_id = match run_id {
        Some(id) => RunId::parse(&id)?,
        None => RunId::new(),
    };
    let recording_id = recording_id.unwrap_or_else(|| {
        step_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording".to_string())
    });

    let browser = HeadlessBrowser::launch(visible).await?;
    browser.navigate(url).await?;

    let engine = DecisionEngine::new(
        EvaluatorSet::standard(text_detector()),
        config.playback.clone(),
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling step...");
            ctrl_c.cancel();
        }
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                AttemptEvent::Started { index, kind } => {
                    tracing::info!("Trying strategy {} ({})", index + 1, kind)
                }
                AttemptEvent::Finished(record) => {
                    tracing::info!("{} -> {}", record.kind, record.outcome.as_str())
                }
                AttemptEvent::ActionDispatched { kind } => {
                    tracing::info!("Dispatching action via {}", kind)
                }
            }
        }
    });
    let options = ExecutionOptions::with_cancel(cancel).with_progress(tx);

    let result = execute_with_retry(
        &engine,
        &step,
        &browser.page(),
        RetryPolicy::from(&config.playback.retry),
        &TokioClock,
        config.playback.step_timeout(),
        &options,
    )
    .await;
    drop(options);
    let _ = progress.await;

    print!("{}", format_result(&result));
    println!("{}", serde_json::to_string(&result)?);

    if config.telemetry.enabled {
        let log = JsonlTelemetryLog::new(&config.telemetry.dir);
        telemetry::record(&log, &run_id.batch(&recording_id, &step.id, result.clone())).await;
        tracing::info!("Telemetry run {} in {}", run_id, log.dir().display());
    }

    browser.close().await?;
    if !result.succeeded {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_stats(config: &RetraceConfig, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let dir = dir.unwrap_or_else(|| config.telemetry.dir.clone());
    let batches = JsonlTelemetryLog::new(&dir).load_all().await?;
    if batches.is_empty() {
        println!("No telemetry in {}", dir.display());
        return Ok(());
    }
    print!("{}", TelemetryReport::from_batches(&batches).render());
    Ok(())
}
