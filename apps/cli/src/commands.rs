use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bulkup_file_ops::FileHandle;
use bulkup_protocol::UploadMode;
use bulkup_upload::{
    BatchOutcome, Credentials, PreparedBatch, RoutingInfo, RunOutcome, UploadCoordinator,
    UploadError, UploaderConfig, prepare_batch,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::{UploadArgs, mode_for};
use crate::local::LocalReceiver;
use crate::progress::{ProgressReporter, human_bytes};

/// Extra attempts at the completion call before giving up.
const COMPLETION_RETRIES: u64 = 3;

/// Environment variable holding the bearer token sent with every request.
const TOKEN_ENV: &str = "BULKUP_TOKEN";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanSummary {
    root: String,
    mode: UploadMode,
    accepted: Vec<String>,
    size_warn: Vec<String>,
    size_reject: Vec<String>,
    hard_reject: Vec<String>,
    accepted_bytes: u64,
    scan_errors: Vec<String>,
}

impl ScanSummary {
    fn new(root: &Path, mode: UploadMode, batch: &PreparedBatch) -> Self {
        let paths = |files: &[FileHandle]| -> Vec<String> {
            files.iter().map(|f| f.relative_path.clone()).collect()
        };
        let c = &batch.classification;
        Self {
            root: root.display().to_string(),
            mode,
            accepted: paths(&c.accepted),
            size_warn: paths(&c.size_warn),
            size_reject: paths(&c.size_reject),
            hard_reject: paths(&c.hard_reject),
            accepted_bytes: c.accepted_bytes(),
            scan_errors: batch.scan_errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    fn print(&self) {
        println!("{} ({:?})", self.root, self.mode);
        println!(
            "  accepted:    {} ({})",
            self.accepted.len(),
            human_bytes(self.accepted_bytes)
        );
        for (label, files) in [
            ("needs ok", &self.size_warn),
            ("too large", &self.size_reject),
            ("excluded", &self.hard_reject),
        ] {
            if files.is_empty() {
                continue;
            }
            println!("  {label:<12} {}", files.len());
            for f in files {
                println!("    {f}");
            }
        }
        for e in &self.scan_errors {
            println!("  unreadable:  {e}");
        }
    }
}

pub async fn scan(config: &UploaderConfig, dir: &Path, unattended: bool, json: bool) -> Result<()> {
    let mode = mode_for(unattended, config.mode);
    let batch = prepare(config, dir, &config.destination_prefix, mode).await?;
    let summary = ScanSummary::new(dir, mode, &batch);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        summary.print();
    }
    Ok(())
}

pub async fn upload(config: &UploaderConfig, args: UploadArgs) -> Result<()> {
    let mode = mode_for(args.unattended, config.mode);
    let prefix = args
        .dest
        .clone()
        .unwrap_or_else(|| config.destination_prefix.clone());

    let mut batch = prepare(config, &args.dir, &prefix, mode).await?;
    for e in &batch.scan_errors {
        warn!(error = %e, "skipped unreadable directory");
    }
    report_skipped(&batch);

    if batch.needs_confirmation() {
        let warned = &batch.classification.size_warn;
        let bytes: u64 = warned.iter().map(|f| f.size_bytes).sum();
        let question = format!(
            "{} large files ({}) need confirmation. Upload them?",
            warned.len(),
            human_bytes(bytes)
        );
        if args.yes || confirm(&question)? {
            batch.confirm_warned();
        } else {
            info!(skipped = warned.len(), "skipping large files");
        }
    }

    let receiver = Arc::new(
        LocalReceiver::new(&args.into)
            .with_context(|| format!("cannot open receiver {}", args.into.display()))?,
    );
    let routing = RoutingInfo {
        owner_id: config.owner_id.clone(),
        repository_name: if config.repository_name.is_empty() {
            receiver.repository_name().to_string()
        } else {
            config.repository_name.clone()
        },
        section: config.section.clone(),
        credentials: Credentials::new(
            std::env::var(TOKEN_ENV).unwrap_or_default(),
            config.owner_id.clone(),
        ),
    };
    let mut options = config.coordinator_options();
    if let Some(workers) = args.workers {
        options.workers = workers.max(1);
    }

    let mut coordinator = UploadCoordinator::new(receiver.clone(), routing.clone(), options);
    coordinator.enqueue_all(batch.plan(coordinator.transaction_id())?)?;
    let mut outcome = drive(&mut coordinator, args.quiet).await?;
    print_outcome(&outcome);

    for attempt in 1..=args.retries {
        if !outcome.has_failures() {
            break;
        }
        let mut next = UploadCoordinator::new(receiver.clone(), routing.clone(), options);
        next.enqueue_all(coordinator.retry_tasks(next.transaction_id()))?;
        info!(
            attempt,
            files = next.transaction().total_files(),
            transaction = %next.transaction_id(),
            "retrying failed files"
        );
        outcome = drive(&mut next, args.quiet).await?;
        print_outcome(&outcome);
        coordinator = next;
    }

    if outcome.has_failures() {
        bail!("{} files failed to upload", outcome.failed_files);
    }
    Ok(())
}

pub fn show_config(config: &UploaderConfig, write: bool) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    if write {
        config.save()?;
        println!(
            "written to {}",
            bulkup_upload::config::config_file_path().display()
        );
    }
    Ok(())
}

async fn prepare(
    config: &UploaderConfig,
    dir: &Path,
    prefix: &str,
    mode: UploadMode,
) -> Result<PreparedBatch> {
    let source = config.directory_source();
    prepare_batch(
        &source,
        dir,
        prefix,
        mode,
        config.classifier.clone(),
        config.planner()?,
    )
    .await
    .with_context(|| format!("cannot scan {}", dir.display()))
}

/// Runs one transaction to completion with a progress bar; Ctrl-C abandons it.
async fn drive(coordinator: &mut UploadCoordinator, quiet: bool) -> Result<BatchOutcome> {
    let total_bytes = coordinator.progress().total_bytes;
    let reporter = coordinator
        .take_events()
        .map(|events| ProgressReporter::spawn(events, total_bytes, quiet));

    let pause = coordinator.pause_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            pause.cancel();
        }
    });

    let result = run_until_closed(coordinator).await;

    interrupt.abort();
    if let Some(reporter) = reporter {
        reporter.finish().await;
    }
    result
}

async fn run_until_closed(coordinator: &mut UploadCoordinator) -> Result<BatchOutcome> {
    let mut attempt = 0;
    loop {
        match coordinator.run().await {
            Ok(RunOutcome::Completed(outcome)) => return Ok(outcome),
            Ok(RunOutcome::Paused) => {
                coordinator.abandon().await?;
                bail!(
                    "interrupted; transaction {} abandoned",
                    coordinator.transaction_id()
                );
            }
            Err(UploadError::TransactionIncomplete(e)) if attempt < COMPLETION_RETRIES => {
                attempt += 1;
                warn!(attempt, reason = %e.reason, "retrying completion call");
                tokio::time::sleep(Duration::from_secs(attempt)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn report_skipped(batch: &PreparedBatch) {
    let c = &batch.classification;
    for f in &c.size_reject {
        warn!(path = %f.relative_path, size = %human_bytes(f.size_bytes), "too large, skipped");
    }
    for f in &c.hard_reject {
        info!(path = %f.relative_path, "excluded");
    }
}

fn print_outcome(outcome: &BatchOutcome) {
    println!(
        "transaction {}: {} uploaded, {} failed",
        outcome.transaction_id, outcome.completed_files, outcome.failed_files
    );
    for failure in &outcome.failures {
        println!("  {}: {}", failure.destination_path, failure.error);
    }
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
