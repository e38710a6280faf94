//! Batch ingestion CLI
//!
//! Run with: cargo run -p digest-ingest -- --token <jwt> scans/*.pdf

use anyhow::Context;
use clap::Parser;
use console::style;
use digest_ingest::{
    BackendClient, BatchSummary, CredentialProvider, IngestConfig, IngestEvent, JobRecord,
    JobStatus, NotificationSink, Orchestrator, SourceFile, StaticToken,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "Upload scanned pages and run the extraction pipeline", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend API root, overrides the configuration
    #[arg(long)]
    base_url: Option<String>,

    /// Bearer token, overrides the configured token source
    #[arg(long)]
    token: Option<String>,

    /// Extra runs over failed jobs
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Print the final queue as JSON
    #[arg(long)]
    json: bool,

    /// Files to ingest
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

/// Drives a progress bar from orchestrator notifications
struct ProgressSink {
    bar: ProgressBar,
}

impl NotificationSink for ProgressSink {
    fn on_log(&self, event: &IngestEvent) {
        match event {
            IngestEvent::UploadFailed { .. }
            | IngestEvent::ProcessFailed { .. }
            | IngestEvent::Cancelled { .. } => {
                self.bar.println(format!("{}", style(event).red()));
                self.bar.inc(1);
            }
            IngestEvent::Processed { .. } => {
                self.bar.println(format!("{}", style(event).green()));
                self.bar.inc(1);
            }
            _ => self.bar.set_message(event.to_string()),
        }
    }

    fn on_batch_complete(&self, summary: &BatchSummary) {
        self.bar.finish_with_message(format!(
            "{} complete, {} failed in {:.1}s",
            summary.completed,
            summary.failed,
            summary.elapsed.as_secs_f64()
        ));
    }
}

fn progress_bar(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    if let Ok(template) =
        ProgressStyle::with_template("{spinner:.blue} [{bar:30.cyan/white}] {pos}/{len} {msg}")
    {
        bar.set_style(template.progress_chars("=> "));
    }
    bar
}

fn print_table(jobs: &[JobRecord]) {
    println!();
    for job in jobs {
        let status = format!("{:<10}", job.status.as_str());
        let status = match job.status {
            JobStatus::Complete => style(status).green(),
            JobStatus::Failed => style(status).red(),
            _ => style(status).yellow(),
        };
        let detail = match (&job.status, &job.error) {
            (JobStatus::Complete, _) => format!("{} articles", job.article_count()),
            (_, Some(error)) => error.clone(),
            _ => String::new(),
        };
        println!("{} {:<40} {}", status, job.filename(), style(detail).dim());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "digest_ingest=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config =
        IngestConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(base_url) = args.base_url {
        config.backend.base_url = base_url;
    }
    tracing::info!("Backend: {}", config.backend.base_url);

    let credentials: Arc<dyn CredentialProvider> = match args.token {
        Some(token) => Arc::new(StaticToken::new(token)),
        None => config.credential_provider(),
    };
    let client = Arc::new(BackendClient::new(config.backend.clone(), credentials)?);

    let bar = progress_bar(args.json);
    let sink = Arc::new(ProgressSink { bar: bar.clone() });
    let orchestrator = Orchestrator::new(client.clone(), client, sink)
        .with_processing_config(&config.processing);

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = SourceFile::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        files.push(file);
    }
    orchestrator.enqueue(files)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping after the current request");
                cancel.cancel();
            }
        }
    });

    let mut runs_left = args.retries + 1;
    let mut summary = BatchSummary::default();
    while runs_left > 0 && !cancel.is_cancelled() {
        runs_left -= 1;
        let eligible = orchestrator.stats().eligible();
        if eligible == 0 {
            break;
        }

        bar.reset();
        bar.set_length(eligible as u64);
        summary = orchestrator
            .run_batch_with_cancel(cancel.clone())
            .await
            .context("A batch is already running")?;
        if summary.failed == 0 {
            break;
        }
    }

    let jobs = orchestrator.snapshot();
    if args.json {
        let output = serde_json::json!({ "summary": summary, "jobs": jobs });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_table(&jobs);
    }

    let all_complete = jobs.iter().all(|j| j.status == JobStatus::Complete);
    Ok(if all_complete {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
