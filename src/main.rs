//! fsdelta - filesystem integrity snapshots and security-aware diffs.
//!
//! Usage:
//!   fsdelta snapshot <ROOT> <OUT>        Scan a tree and save a snapshot
//!   fsdelta diff <BASELINE> <CURRENT>    Compare two saved snapshots
//!   fsdelta live <BASELINE> <ROOT>       Compare a snapshot with the live tree
//!   fsdelta inspect <SNAPSHOT>           Show a snapshot's header
//!   fsdelta version                      Show version information
//!
//! Exit codes: 0 success or no changes, 1 changes detected, 2 scan failure,
//! 3 snapshot store or report I/O failure, 4 snapshot validation failure.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Report, Result, WrapErr};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use fsdelta_core::{
    PartialScanError, ScanConfig, ScanError, Snapshot, SnapshotHeader, ValidationError,
};
use fsdelta_diff::{
    Classifier, CriticalChange, DiffConfig, DiffResult, Differ, EXPORT_HEADER, Summary,
};
use fsdelta_scan::Scanner;
use fsdelta_store::{StoreError, load_snapshot, load_snapshot_header, save_snapshot};

#[derive(Parser)]
#[command(
    name = "fsdelta",
    version,
    about = "Filesystem integrity snapshots and security-aware diffs",
    long_about = "fsdelta records the content hash, mode, ownership and extended \
                  attributes of every entry under a directory, and reports what \
                  changed between two such snapshots, ranking changes to \
                  security-sensitive paths."
)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a directory tree and save a snapshot
    Snapshot {
        /// Directory to scan
        root: PathBuf,

        /// Snapshot file to write
        output: PathBuf,

        #[command(flatten)]
        scan: ScanArgs,
    },

    /// Compare two saved snapshots
    Diff {
        /// Snapshot taken first
        baseline: PathBuf,

        /// Snapshot taken later
        current: PathBuf,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Compare a saved snapshot with the tree as it is now
    Live {
        /// Snapshot taken first
        baseline: PathBuf,

        /// Directory to scan
        root: PathBuf,

        /// Also save the fresh scan to this file
        #[arg(long)]
        save: Option<PathBuf>,

        #[command(flatten)]
        scan: ScanArgs,

        #[command(flatten)]
        report: ReportArgs,
    },

    /// Show a snapshot's header without loading its records
    Inspect {
        /// Snapshot file
        snapshot: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

#[derive(Args)]
struct ScanArgs {
    /// Hashing workers (0 = twice the available parallelism)
    #[arg(short, long, default_value = "0")]
    workers: usize,

    /// Extra scan ignore patterns, comma separated
    #[arg(short, long, value_delimiter = ',')]
    ignore: Vec<String>,

    /// Do not apply the built-in scan ignore patterns
    #[arg(long)]
    no_default_ignores: bool,

    /// Skip ownership, permission and extended attribute collection
    #[arg(long)]
    no_metadata: bool,
}

#[derive(Args)]
struct ReportArgs {
    /// Paths to leave out of the comparison, comma separated
    #[arg(long = "diff-ignore", value_delimiter = ',')]
    diff_ignore: Vec<String>,

    /// Only report critical changes at or above this severity
    #[arg(long, default_value = "1", value_parser = clap::value_parser!(u8).range(1..=10))]
    min_severity: u8,

    /// Entries to list per change kind (0 = all)
    #[arg(short = 'n', long, default_value = "20")]
    limit: usize,

    /// Compare every record even when root digests match
    #[arg(long)]
    full: bool,

    /// Write every change as CSV to this file
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> ExitCode {
    if let Err(err) = color_eyre::install() {
        eprintln!("Error: {err:?}");
    }

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "fsdelta=debug" } else { "fsdelta=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Map a failure to its exit code by the first typed error in its chain.
fn exit_code(err: &Report) -> u8 {
    let chain = || err.chain();
    if chain().any(|e| e.downcast_ref::<ValidationError>().is_some()) {
        4
    } else if chain().any(|e| e.downcast_ref::<StoreError>().is_some()) {
        3
    } else if chain().any(|e| {
        e.downcast_ref::<PartialScanError>().is_some() || e.downcast_ref::<ScanError>().is_some()
    }) {
        2
    } else {
        3
    }
}

fn run(command: Command) -> Result<ExitCode> {
    match command {
        Command::Snapshot { root, output, scan } => {
            let snapshot = take_snapshot(&root, &scan)?;
            save_snapshot(&snapshot, &output)
                .wrap_err_with(|| format!("Failed to save snapshot to {}", output.display()))?;
            println!("{}", snapshot.summary());
            println!("Root digest: {:016x}", snapshot.root_digest);
            if snapshot.has_warnings() {
                println!("{} entries could not be read", snapshot.warnings.len());
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Diff {
            baseline,
            current,
            report,
        } => {
            let baseline = load(&baseline)?;
            let current = load(&current)?;
            compare_and_report(baseline, current, &report)
        }
        Command::Live {
            baseline,
            root,
            save,
            scan,
            report,
        } => {
            let baseline = load(&baseline)?;
            let current = take_snapshot(&root, &scan)?;
            if let Some(path) = save {
                save_snapshot(&current, &path)
                    .wrap_err_with(|| format!("Failed to save snapshot to {}", path.display()))?;
            }
            compare_and_report(baseline, current, &report)
        }
        Command::Inspect { snapshot, format } => {
            let header = load_snapshot_header(&snapshot)
                .wrap_err_with(|| format!("Failed to read {}", snapshot.display()))?;
            match format {
                OutputFormat::Text => print_header(&header),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&header)?),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Version => {
            println!("fsdelta {}", env!("CARGO_PKG_VERSION"));
            println!(
                "snapshot format {} (v{})",
                fsdelta_store::FORMAT_VERSION,
                fsdelta_core::SNAPSHOT_VERSION
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load(path: &Path) -> Result<Snapshot> {
    load_snapshot(path).wrap_err_with(|| format!("Failed to load snapshot {}", path.display()))
}

/// Scan `root`, logging progress at debug level.
fn take_snapshot(root: &Path, args: &ScanArgs) -> Result<Snapshot> {
    let config = ScanConfig::builder()
        .root(root)
        .ignore_patterns(args.ignore.clone())
        .use_default_ignores(!args.no_default_ignores)
        .workers(args.workers)
        .collect_metadata(!args.no_metadata)
        .build()
        .map_err(|err| ScanError::InvalidConfig {
            message: err.to_string(),
        })?;

    eprintln!("Scanning {}...", root.display());

    let scanner = Scanner::new(config);
    let mut progress = scanner.subscribe();
    let reporter = thread::spawn(move || {
        loop {
            match progress.blocking_recv() {
                Ok(p) => debug!(
                    files = p.files_scanned,
                    dirs = p.dirs_scanned,
                    bytes = p.bytes_scanned,
                    errors = p.errors_count,
                    files_per_second = p.files_per_second(),
                    "scan progress"
                ),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    let result = scanner.scan();
    drop(scanner);
    let _ = reporter.join();

    let snapshot = result.wrap_err_with(|| format!("Failed to scan {}", root.display()))?;
    for warning in &snapshot.warnings {
        debug!(path = %warning.path.display(), kind = ?warning.kind, "{}", warning.message);
    }
    Ok(snapshot)
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: &'a Summary,
    critical: &'a [CriticalChange<'a>],
    changes: &'a DiffResult,
}

fn compare_and_report(baseline: Snapshot, current: Snapshot, args: &ReportArgs) -> Result<ExitCode> {
    let config = DiffConfig {
        ignore_patterns: args.diff_ignore.clone(),
        use_root_digest: !args.full,
    };
    let result = Differ::new(config).compare(Arc::new(baseline), Arc::new(current));
    let critical = Classifier::builtin().by_min_severity(&result, args.min_severity);

    if let Some(path) = &args.csv {
        write_csv(&result, path)
            .wrap_err_with(|| format!("Failed to write CSV report to {}", path.display()))?;
        eprintln!("Wrote {} rows to {}", result.summary.total_changes, path.display());
    }

    match args.format {
        OutputFormat::Text => print_report(&result, &critical, args.limit),
        OutputFormat::Json => {
            let report = JsonReport {
                summary: &result.summary,
                critical: &critical,
                changes: &result,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    if result.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

fn print_report(result: &DiffResult, critical: &[CriticalChange<'_>], limit: usize) {
    let summary = &result.summary;
    let limit = if limit == 0 { usize::MAX } else { limit };

    println!();
    println!("{}", "─".repeat(70));
    println!(" Baseline: {}", result.baseline.summary());
    println!(" Current:  {}", result.current.summary());
    println!("{}", "─".repeat(70));
    println!();

    if result.is_empty() {
        println!(" No changes detected.");
        println!();
        return;
    }

    println!(
        " {} added, {} modified, {} deleted ({} changes)",
        summary.added_count, summary.modified_count, summary.deleted_count, summary.total_changes
    );
    println!(
        " Size: +{} / -{} (net {}{})",
        format_size(summary.added_size),
        format_size(summary.deleted_size),
        if summary.size_diff < 0 { "-" } else { "+" },
        format_size(summary.size_diff.unsigned_abs())
    );
    println!(" Compared in {:.3}s", summary.comparison_time.as_secs_f64());
    println!();

    if !critical.is_empty() {
        println!(" Critical changes:");
        for change in critical.iter().take(limit) {
            println!(
                "   [{:>2}] {:<8} {}  {} ({}): {}",
                change.severity,
                change.kind,
                change.path,
                change.rule,
                change.category,
                change.description
            );
        }
        print_remaining(critical.len(), limit);
        println!();
    }

    if !result.added.is_empty() {
        println!(" Added:");
        for (path, record) in result.added.iter().take(limit) {
            println!("   + {} ({})", path, format_size(record.size));
        }
        print_remaining(result.added.len(), limit);
        println!();
    }

    if !result.modified.is_empty() {
        println!(" Modified:");
        for (path, detail) in result.modified.iter().take(limit) {
            println!("   ~ {}: {}", path, detail.changes.join(", "));
        }
        print_remaining(result.modified.len(), limit);
        println!();
    }

    if !result.deleted.is_empty() {
        println!(" Deleted:");
        for (path, record) in result.deleted.iter().take(limit) {
            println!("   - {} ({})", path, format_size(record.size));
        }
        print_remaining(result.deleted.len(), limit);
        println!();
    }
}

fn print_remaining(total: usize, shown: usize) {
    if total > shown {
        println!("   ... and {} more", total - shown);
    }
}

fn print_header(header: &SnapshotHeader) {
    println!("{}", "─".repeat(60));
    println!(" Snapshot v{} created {}", header.version, header.created.to_rfc3339());
    println!("{}", "─".repeat(60));
    println!("{}", header.system);
    println!("CPUs: {}", header.system.cpu_count);
    println!("Tool Version: {}", header.system.tool_version);
    println!();
    println!(
        " {} files, {} directories, {}",
        header.stats.file_count,
        header.stats.dir_count,
        format_size(header.stats.total_size)
    );
    println!(
        " {} errors, scanned in {:.2}s",
        header.stats.error_count,
        header.stats.scan_duration.as_secs_f64()
    );
    println!(" Root digest: {:016x}", header.root_digest);
    println!(
        " Leaves: {}, tree depth: {}",
        header.digest_summary.leaf_count, header.digest_summary.depth
    );
}

fn write_csv(result: &DiffResult, path: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_csv_line(&mut out, &EXPORT_HEADER)?;
    for row in result.export_rows() {
        write_csv_line(&mut out, &row.fields())?;
    }
    out.flush()?;
    Ok(())
}

fn write_csv_line<S: AsRef<str>>(out: &mut impl Write, fields: &[S]) -> std::io::Result<()> {
    let line = fields
        .iter()
        .map(|f| csv_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(out, "{line}")
}

/// Quote a CSV field when it contains a separator, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
