//! redate - Main entry point
//!
//! Re-dates PDF files on a mounted SMB/CIFS share, atomically and with
//! rollback.

mod shutdown;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use redate_core::ops::TransactionResult;
use redate_core::share::catalog;
use redate_core::share::mount::MountedShare;
use redate_core::share::ShareClient;
use redate_core::{BatchReport, BatchRunner, Config, SharePool, TransactionOutcome, TxCoordinator};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Mount point of the share (overrides config)
    #[arg(short, long)]
    mount: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List PDF files on the share
    List {
        /// Directory below the share root
        #[arg(default_value = "")]
        dir: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Emit the listing as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-date a single file
    Apply {
        file: PathBuf,

        /// Target date, e.g. "2024-03-15" or "2024-03-15 14:30:00"
        #[arg(short, long)]
        date: String,
    },

    /// Re-date many files in one batch
    Batch {
        files: Vec<PathBuf>,

        /// Target date applied to every file
        #[arg(short, long)]
        date: String,

        /// Read additional paths from a file, one per line
        #[arg(long, value_name = "FILE")]
        from_file: Option<PathBuf>,

        /// Override the configured worker cap
        #[arg(short = 'j', long)]
        workers: Option<usize>,

        /// Emit the full report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    if let Some(mount) = &args.mount {
        config.share.mount_point = mount.clone();
    }
    if config.share.mount_point.as_os_str().is_empty() {
        anyhow::bail!("no share mount point; set share.mount_point or pass --mount");
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    redate_core::logging::init(log_level)?;

    tracing::info!(
        "Starting redate v{} (share: {})",
        env!("CARGO_PKG_VERSION"),
        config.share.mount_point.display()
    );

    match args.command {
        Command::List {
            dir,
            recursive,
            json,
        } => {
            let client = MountedShare::from_config(&config);
            let documents = catalog::find_documents(&client, &dir, recursive).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&documents)?);
            } else {
                for doc in &documents {
                    println!(
                        "{}  {:>12}  {}",
                        doc.times
                            .modified
                            .with_timezone(&Local)
                            .format("%Y-%m-%d %H:%M:%S"),
                        doc.size,
                        doc.path.display()
                    );
                }
                eprintln!("{} PDF file(s)", documents.len());
            }
            Ok(())
        }

        Command::Apply { file, date } => {
            let target = parse_target_date(&date)?;
            let report = run_batch(&config, vec![file], target, None, true).await;
            finish(&report, false)
        }

        Command::Batch {
            mut files,
            date,
            from_file,
            workers,
            json,
        } => {
            let target = parse_target_date(&date)?;
            if let Some(list_path) = from_file {
                let listing = std::fs::read_to_string(&list_path)
                    .with_context(|| format!("reading {}", list_path.display()))?;
                files.extend(
                    listing
                        .lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(PathBuf::from),
                );
            }
            if files.is_empty() {
                anyhow::bail!("no input files");
            }

            let report = run_batch(&config, files, target, workers, !json).await;
            finish(&report, json)
        }
    }
}

/// Run one batch with signal-driven cancellation, printing progress lines
/// as outcomes arrive
async fn run_batch(
    config: &Config,
    files: Vec<PathBuf>,
    target: DateTime<Utc>,
    workers: Option<usize>,
    print_progress: bool,
) -> BatchReport {
    let pool = SharePool::from_config(config, || {
        Arc::new(MountedShare::from_config(config)) as Arc<dyn ShareClient>
    });
    let coordinator = TxCoordinator::from_config(config);
    let runner = BatchRunner::new(
        Arc::clone(&pool),
        coordinator,
        workers.unwrap_or(config.batch.max_workers),
    );

    tokio::spawn(shutdown::cancel_on_signal(runner.cancel_token()));

    let (mut progress, handle) = runner.run_streaming(files, target);
    while let Some(outcome) = progress.recv().await {
        if print_progress {
            println!("{}", render_outcome(&outcome));
        }
    }

    let report = match handle.await {
        Ok(report) => report,
        Err(err) => {
            tracing::error!("Batch task failed: {}", err);
            BatchReport::from_results(Vec::new(), std::time::Duration::ZERO)
        }
    };

    let health = pool.health();
    tracing::debug!(
        "Pool health: {} checkouts, {} checkout timeouts",
        health.checkouts,
        health.checkout_timeouts
    );

    report
}

/// Render the summary, then pick the exit code: 0 clean, 1 with failures,
/// 2 when a file needs manual intervention.
fn finish(report: &BatchReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        eprintln!(
            "{} committed, {} rolled back, {} failed ({} file(s) in {} ms)",
            report.committed,
            report.rolled_back,
            report.failed,
            report.len(),
            report.duration_ms
        );
        for path in &report.needs_attention {
            eprintln!(
                "ATTENTION: {} may be in an inconsistent state; verify it by hand",
                path.display()
            );
        }
    }

    if !report.needs_attention.is_empty() {
        std::process::exit(2);
    }
    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn render_outcome(outcome: &TransactionOutcome) -> String {
    match &outcome.result {
        TransactionResult::Committed { applied } => format!(
            "ok           {}  ->  {}",
            outcome.path.display(),
            applied.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        ),
        TransactionResult::RolledBack { reason, .. } => {
            format!("rolled back  {}  ({})", outcome.path.display(), reason)
        }
        TransactionResult::Failed { reason, .. } => {
            format!("failed       {}  ({})", outcome.path.display(), reason)
        }
    }
}

/// Parse the date the user read off the document. Times are interpreted
/// in the local timezone; a bare date gets noon so the calendar day is
/// stable however the share renders it.
fn parse_target_date(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    const FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
    for format in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return local_to_utc(naive);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(12, 0, 0) {
            return local_to_utc(naive);
        }
    }

    anyhow::bail!(
        "unrecognized date '{}'; expected e.g. 2024-03-15, 2024-03-15 14:30:00 or RFC 3339",
        input
    )
}

fn local_to_utc(naive: NaiveDateTime) -> Result<DateTime<Utc>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
        .context("date falls in a DST transition gap")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339() {
        let ts = parse_target_date("2024-03-15T14:30:00Z").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 15, 14, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_local_datetime() {
        let ts = parse_target_date("2024-03-15 14:30:00").unwrap();
        let expected = Local
            .with_ymd_and_hms(2024, 3, 15, 14, 30, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(ts, expected);
    }

    #[test]
    fn test_parse_bare_date_gets_noon() {
        let ts = parse_target_date("2024-03-15").unwrap();
        let local = ts.with_timezone(&Local);
        assert_eq!(local.format("%H:%M:%S").to_string(), "12:00:00");
    }

    #[test]
    fn test_parse_garbage_is_rejected() {
        assert!(parse_target_date("yesterday").is_err());
        assert!(parse_target_date("15/03/2024").is_err());
    }
}
