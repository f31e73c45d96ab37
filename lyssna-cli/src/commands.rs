use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn};

use lyssna_config::LyssnaConfig;
use lyssna_core::events::Event;
use lyssna_core::{ConnectionTable, RemoteAnalyzer};
use lyssna_telemetry::logging::EventLogger;
use lyssna_telemetry::metrics::MetricsRecorder;

#[derive(Parser)]
#[command(name = "lyssna", version, about)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Correlate a stream of remote probe events into the connection table
    Run(RunArgs),
    /// Decode-only validation pass over an event file
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// JSON-lines event input; stdin when neither this nor the config gives one.
    #[arg(short, long)]
    pub input: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// JSON-lines event input to validate.
    #[arg(short, long)]
    pub input: PathBuf,
}

pub async fn run_command(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => LyssnaConfig::load_from_path(path)?,
        None => LyssnaConfig::load()?,
    };
    EventLogger::init(&config.telemetry.log_filter);
    let metrics = MetricsRecorder::new();

    match cli.command {
        Commands::Run(run_args) => run_ingest(run_args, config, metrics).await,
        Commands::Check(check_args) => run_check(check_args).await,
    }
}

async fn run_ingest(args: RunArgs, config: LyssnaConfig, metrics: MetricsRecorder) -> Result<()> {
    let table = Arc::new(ConnectionTable::new());
    let analyzer = RemoteAnalyzer::new(Arc::clone(&table));

    let input = args.input.or_else(|| config.ingest.input.clone());
    let mut processed: u64 = 0;
    let mut dropped: u64 = 0;
    let mut warned_table_size = false;

    let mut handle_line = |line: &str| -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }
        let event: Event = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(err) => {
                if config.ingest.strict {
                    bail!("malformed event line: {err}");
                }
                warn!(%err, "skipping malformed event line");
                dropped += 1;
                metrics.inc_dropped_events();
                return Ok(());
            }
        };

        let table_len_before = table.len();
        let started = Instant::now();
        let connection = analyzer.process_event(&event);
        metrics
            .dispatch_latency
            .observe(started.elapsed().as_micros() as f64);

        processed += 1;
        metrics.inc_processed_events();
        match connection {
            Some(_) => {
                if table.len() > table_len_before {
                    metrics.inc_connections_tracked();
                }
            }
            None => {
                dropped += 1;
                metrics.inc_dropped_events();
            }
        }

        if !warned_table_size && table.len() > config.analyzer.table_warn_threshold {
            warned_table_size = true;
            warn!(
                connections = table.len(),
                threshold = config.analyzer.table_warn_threshold,
                "connection table is larger than the configured threshold"
            );
        }
        if config.analyzer.progress_interval > 0
            && processed % config.analyzer.progress_interval == 0
        {
            info!(processed, dropped, connections = table.len(), "ingest progress");
        }
        Ok(())
    };

    match &input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("cannot open event input {}", path.display()))?;
            drain_lines(BufReader::new(file), &mut handle_line).await?;
        }
        None => {
            info!("no input file configured, reading events from stdin");
            drain_lines(BufReader::new(tokio::io::stdin()), &mut handle_line).await?;
        }
    }

    EventLogger::log_ingest_summary(processed, dropped, table.len());
    if config.telemetry.dump_metrics {
        info!("metrics:\n{}", metrics.gather_metrics()?);
    }
    Ok(())
}

async fn drain_lines<R>(
    reader: BufReader<R>,
    handle_line: &mut impl FnMut(&str) -> Result<()>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        handle_line(&line)?;
    }
    Ok(())
}

async fn run_check(args: CheckArgs) -> Result<()> {
    let file = tokio::fs::File::open(&args.input)
        .await
        .with_context(|| format!("cannot open event input {}", args.input.display()))?;
    let mut lines = BufReader::new(file).lines();

    let mut good: u64 = 0;
    let mut bad: u64 = 0;
    let mut line_number: u64 = 0;
    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(line) {
            Ok(_) => good += 1,
            Err(err) => {
                warn!(line = line_number, %err, "invalid event");
                bad += 1;
            }
        }
    }

    info!(good, bad, "event file checked");
    if bad > 0 {
        bail!("{bad} invalid event lines in {}", args.input.display());
    }
    Ok(())
}
