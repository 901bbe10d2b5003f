//! docsort - Command-line interface for the document mover.
//!
//! Scans source folders, queues batch moves into named destination folders,
//! and browses the persisted job history. Progress goes to stderr, results to
//! stdout.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand};
use engine::settings::{self, CATALOG_FILE_NAME, JOBS_FILE_NAME, SETTINGS_FILE_NAME};
use engine::{
    enumerate_documents, CancelToken, CatalogEntry, CatalogStore, DocumentInfo, Job, JobEvent,
    JobProgress, JobQueue, JobStore, MoveEngine, Settings,
};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

/// docsort - Move batches of documents into named folders
#[derive(Parser, Debug)]
#[command(name = "docsort")]
#[command(version = "0.1.0")]
#[command(about = "Move batches of documents into named folders without losing files")]
struct Args {
    /// Directory holding jobs, catalog and settings
    #[arg(long, value_name = "PATH", global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the documents in a folder and save a catalog snapshot
    Scan(SourceArgs),

    /// Move the documents of a folder into a new destination folder
    Move {
        #[command(flatten)]
        source: SourceArgs,

        /// Base folder the destination folder is created in
        #[arg(long, value_name = "PATH")]
        dst: Option<PathBuf>,

        /// Name of the destination folder (defaults to Batch_<timestamp>)
        #[arg(long, value_name = "NAME")]
        folder: Option<String>,
    },

    /// Page through completed jobs, newest first
    Jobs {
        /// Page number, starting at 1
        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 20)]
        page_size: usize,
    },

    /// Show one job with its files and errors
    Show {
        /// Job id
        id: Uuid,
    },

    /// Move the failed files of a job again
    Retry {
        /// Job id
        id: Uuid,
    },
}

#[derive(ClapArgs, Debug, Clone)]
struct SourceArgs {
    /// Source folder (defaults to the last one used)
    #[arg(long, value_name = "PATH")]
    src: Option<PathBuf>,

    /// Only look at the top level of the source folder
    #[arg(long)]
    no_recurse: bool,

    /// Document extension to pick up
    #[arg(long, value_name = "EXT")]
    ext: Option<String>,
}

/// How a command ended, mapped to the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    PartialFailure,
}

impl Outcome {
    fn exit_code(self) -> i32 {
        match self {
            Outcome::Success => 0,
            Outcome::PartialFailure => 1,
        }
    }

    /// Errors alone do not count; a general error can outlive a retry that
    /// moved every file.
    fn for_job(job: &Job) -> Self {
        if !job.pending_documents().is_empty() {
            Outcome::PartialFailure
        } else {
            Outcome::Success
        }
    }
}

/// Data directory plus the settings loaded from it.
struct AppContext {
    data_dir: PathBuf,
    settings: Settings,
}

impl AppContext {
    fn load(args: &Args) -> Result<Self> {
        let data_dir = args.data_dir.clone().unwrap_or_else(settings::data_dir);
        let settings = Settings::load(&data_dir.join(SETTINGS_FILE_NAME))
            .with_context(|| format!("Failed to load settings from {}", data_dir.display()))?;
        Ok(AppContext { data_dir, settings })
    }

    fn store(&self) -> Arc<JobStore> {
        if self.settings.enable_job_persistence {
            Arc::new(JobStore::new(self.data_dir.join(JOBS_FILE_NAME)))
        } else {
            Arc::new(JobStore::in_memory())
        }
    }

    fn queue(&self, store: Arc<JobStore>) -> Arc<JobQueue> {
        let engine = MoveEngine::new(self.settings.move_options());
        Arc::new(JobQueue::new(engine, store, self.settings.queue_options()))
    }

    fn save_settings(&self) {
        let path = self.data_dir.join(SETTINGS_FILE_NAME);
        if let Err(e) = self.settings.save(&path) {
            warn!(path = %path.display(), error = %e, "Failed to save settings");
        }
    }
}

/// Renders job progress to stderr.
struct CliProgress {
    verbose: bool,
    start_time: Instant,
    last_progress_update: Option<Instant>,
    last_file: Option<String>,
}

impl CliProgress {
    fn new(verbose: bool) -> Self {
        CliProgress {
            verbose,
            start_time: Instant::now(),
            last_progress_update: None,
            last_file: None,
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        let secs = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, mins, secs)
        } else if mins > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}s", secs)
        }
    }

    fn progress_bar(percent: u32) -> String {
        let filled = (percent.min(100) / 5) as usize;
        let empty = 20 - filled;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(empty), percent)
    }

    fn on_job_started(&self, job: &Job) {
        eprintln!("Moving {}", job.display_name());
        eprintln!("  Destination: {}", job.destination_path.display());
        eprintln!("  Total: {}", Self::format_bytes(job.total_bytes));
        eprintln!();
    }

    fn on_progress(&mut self, progress: &JobProgress) {
        let detail = &progress.detail;
        if self.verbose && self.last_file.as_deref() != Some(detail.current_file_name.as_str()) {
            eprintln!(
                "\r[{:3}/{}] {}",
                detail.completed_files + 1,
                detail.total_files,
                detail.current_file_name
            );
            self.last_file = Some(detail.current_file_name.clone());
        }

        // Throttle redraws to at most one per 200ms, but always draw the last one
        let finished = progress.progress_percentage >= 100.0;
        if let Some(last) = self.last_progress_update {
            if last.elapsed() < Duration::from_millis(200) && !finished {
                return;
            }
        }
        self.last_progress_update = Some(Instant::now());

        let eta = detail
            .estimated_time_remaining
            .map(Self::format_duration)
            .unwrap_or_else(|| "--".to_string());
        eprint!(
            "\rProgress: {} | {}/{} | {:.1} MB/s{} | ETA {}   ",
            Self::progress_bar(progress.progress_percentage as u32),
            Self::format_bytes(progress.bytes_transferred),
            Self::format_bytes(detail.total_bytes),
            detail.speed_mbps,
            if detail.is_slow_transfer { " (slow)" } else { "" },
            eta
        );
        let _ = std::io::Write::flush(&mut std::io::stderr());
    }

    fn on_job_completed(&self, job: &Job) {
        eprintln!();
        eprintln!("Job complete!");
        eprintln!(
            "Summary: {} moved, {} failed, {} total",
            job.successful_file_count(),
            job.failed_file_count(),
            job.total_file_count()
        );
        eprintln!("Bytes moved: {}", Self::format_bytes(job.bytes_transferred));
        eprintln!("Elapsed: {}", Self::format_duration(self.start_time.elapsed()));

        if job.has_errors() {
            eprintln!();
            eprintln!("Errors:");
            for error in &job.errors {
                eprintln!("  {} [{}]: {}", error.file_name, error.kind, error.message);
            }
        }
        if let Some(backup) = &job.backup_directory {
            eprintln!();
            eprintln!("Originals of moved files backed up in: {}", backup.display());
        }
        if !job.pending_documents().is_empty() {
            eprintln!();
            eprintln!("Retry the failed files with: docsort retry {}", job.id);
        }
    }
}

fn main() {
    let args = Args::parse();

    let ctx = match AppContext::load(&args) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    };
    let guard = init_logging(args.verbose, ctx.settings.log_directory.as_deref());

    let exit_code = match run_cli(&args, ctx) {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            2
        }
    };

    // process::exit skips destructors; flush the log writer first
    drop(guard);
    std::process::exit(exit_code);
}

/// Console logging filtered by `RUST_LOG` (default warn, debug with --verbose);
/// a daily-rolling file in `log_directory` records info and above.
fn init_logging(verbose: bool, log_directory: Option<&Path>) -> Option<WorkerGuard> {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    let (file_layer, guard) = match log_directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "docsort.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(LevelFilter::INFO);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("Failed to initialise logging: {}", e);
    }
    guard
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args, mut ctx: AppContext) -> Result<Outcome> {
    match &args.command {
        Command::Scan(source) => scan(&mut ctx, source),
        Command::Move {
            source,
            dst,
            folder,
        } => move_documents(&mut ctx, source, dst.as_deref(), folder.as_deref(), args.verbose),
        Command::Jobs { page, page_size } => list_jobs(&ctx, *page, *page_size),
        Command::Show { id } => show_job(&ctx, *id),
        Command::Retry { id } => retry_job(&ctx, *id, args.verbose),
    }
}

fn resolve_source(ctx: &AppContext, source: &SourceArgs) -> Result<PathBuf> {
    let src = source
        .src
        .clone()
        .or_else(|| ctx.settings.last_source_folder.clone())
        .ok_or_else(|| anyhow!("No source folder given and none remembered; pass --src"))?;

    if !src.exists() {
        bail!("Source directory does not exist: {}", src.display());
    }
    if !src.is_dir() {
        bail!("Source is not a directory: {}", src.display());
    }
    Ok(src)
}

fn collect_documents(ctx: &AppContext, src: &Path, source: &SourceArgs) -> Vec<DocumentInfo> {
    let recursive = ctx.settings.include_subdirectories && !source.no_recurse;
    let extension = source
        .ext
        .clone()
        .unwrap_or_else(|| ctx.settings.document_extension.clone());
    let extension = Some(extension.as_str()).filter(|e| !e.trim().is_empty());

    enumerate_documents(src, recursive, extension, &CancelToken::new()).collect()
}

fn scan(ctx: &mut AppContext, source: &SourceArgs) -> Result<Outcome> {
    let src = resolve_source(ctx, source)?;
    let documents = collect_documents(ctx, &src, source);

    let total: u64 = documents.iter().map(|d| d.length).sum();
    for document in &documents {
        println!("{:>12}  {}", CliProgress::format_bytes(document.length), document.full_path.display());
    }
    println!("{} documents, {}", documents.len(), CliProgress::format_bytes(total));

    let now = Utc::now();
    let entries: Vec<CatalogEntry> = documents
        .iter()
        .map(|d| CatalogEntry::from_document(d, now))
        .collect();
    CatalogStore::new(ctx.data_dir.join(CATALOG_FILE_NAME))
        .save_snapshot(&entries)
        .context("Failed to save catalog snapshot")?;

    ctx.settings.last_source_folder = Some(src);
    ctx.save_settings();
    Ok(Outcome::Success)
}

fn move_documents(
    ctx: &mut AppContext,
    source: &SourceArgs,
    dst: Option<&Path>,
    folder: Option<&str>,
    verbose: bool,
) -> Result<Outcome> {
    let src = resolve_source(ctx, source)?;
    let dst = dst
        .map(Path::to_path_buf)
        .or_else(|| ctx.settings.last_destination_folder.clone())
        .ok_or_else(|| anyhow!("No destination folder given and none remembered; pass --dst"))?;
    let folder = folder.unwrap_or_default();

    let documents = collect_documents(ctx, &src, source);
    if documents.is_empty() {
        println!("No documents found in {}", src.display());
        return Ok(Outcome::Success);
    }

    let store = ctx.store();
    let queue = ctx.queue(store);
    let job = queue
        .enqueue_job(folder, &dst, &documents)
        .context("Failed to queue job")?;
    info!(job_id = %job.id, "Queued move from {}", src.display());

    ctx.settings.last_source_folder = Some(src);
    ctx.settings.last_destination_folder = Some(dst);
    ctx.settings.last_destination_folder_name = Some(job.folder_name.clone());
    ctx.save_settings();

    let done = run_until_completed(&queue, &job, verbose)?;
    println!("{}", done.id);
    Ok(Outcome::for_job(&done))
}

fn retry_job(ctx: &AppContext, id: Uuid, verbose: bool) -> Result<Outcome> {
    let store = ctx.store();
    let job = store
        .job(id)
        .context("Failed to read job history")?
        .ok_or_else(|| anyhow!("Job {} not found", id))?;

    if job.pending_documents().is_empty() {
        println!("Job {} has nothing to retry", id);
        return Ok(Outcome::Success);
    }

    let queue = ctx.queue(store);
    let job = queue.retry_job(&job).context("Failed to queue retry")?;
    let done = run_until_completed(&queue, &job, verbose)?;
    Ok(Outcome::for_job(&done))
}

/// Start the worker, follow `job` until it completes, then stop the worker.
fn run_until_completed(queue: &Arc<JobQueue>, job: &Job, verbose: bool) -> Result<Job> {
    let mut progress = CliProgress::new(verbose);
    progress.on_job_started(job);

    let events = queue.subscribe();
    let cancel = CancelToken::new();
    let worker = queue.start_processing(cancel.clone());

    let mut completed = None;
    loop {
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(JobEvent::Progress(update)) if update.job_id == job.id => progress.on_progress(&update),
            Ok(JobEvent::Completed(done)) if done.id == job.id => {
                completed = Some(done);
                break;
            }
            Ok(_) => {}
            Err(_) if worker.is_finished() => break,
            Err(_) => {}
        }
    }

    cancel.cancel();
    worker.join().map_err(|_| anyhow!("Job worker panicked"))?;

    let done = completed.ok_or_else(|| anyhow!("Job worker stopped before job {} completed", job.id))?;
    progress.on_job_completed(&done);
    Ok(done)
}

fn format_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn list_jobs(ctx: &AppContext, page: usize, page_size: usize) -> Result<Outcome> {
    if page == 0 || page_size == 0 {
        bail!("Page and page size start at 1");
    }

    let store = ctx.store();
    let total = store.completed_job_count().context("Failed to read job history")?;
    let jobs = store
        .completed_jobs((page - 1) * page_size, page_size)
        .context("Failed to read job history")?;

    let pages = total.div_ceil(page_size).max(1);
    println!("Completed jobs: {} (page {}/{})", total, page, pages);
    for job in &jobs {
        println!(
            "{}  {}  {}  {} ok / {} failed{}",
            job.id,
            format_time(job.recency()),
            job.display_name(),
            job.successful_file_count(),
            job.failed_file_count(),
            if job.has_errors() { "  [errors]" } else { "" }
        );
    }
    Ok(Outcome::Success)
}

fn show_job(ctx: &AppContext, id: Uuid) -> Result<Outcome> {
    let job = ctx
        .store()
        .job(id)
        .context("Failed to read job history")?
        .ok_or_else(|| anyhow!("Job {} not found", id))?;

    println!("Job:         {}", job.id);
    println!("Folder:      {}", job.display_name());
    println!("Destination: {}", job.destination_path.display());
    println!("Status:      {} ({:.0}%)", job.status, job.progress_percentage);
    println!("Created:     {}", format_time(job.created_at));
    if let Some(completed_at) = job.completed_at {
        println!("Completed:   {}", format_time(completed_at));
    }
    println!(
        "Bytes:       {} of {}",
        CliProgress::format_bytes(job.bytes_transferred),
        CliProgress::format_bytes(job.total_bytes)
    );
    if let Some(backup) = &job.backup_directory {
        println!("Backup:      {}", backup.display());
    }

    println!();
    println!("Files:");
    for file in &job.files {
        let state = if file.is_successful {
            "moved"
        } else if file.error_message.is_some() {
            "failed"
        } else {
            "pending"
        };
        println!("  [{:7}] {}", state, file.source_path.display());
    }

    if job.has_errors() {
        println!();
        println!("Errors:");
        for error in &job.errors {
            println!(
                "  {} [{}] retried {}x at {}: {}",
                error.file_name,
                error.kind,
                error.retry_count,
                format_time(error.timestamp),
                error.message
            );
        }
    }
    Ok(Outcome::for_job(&job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn context(data_dir: &Path) -> AppContext {
        AppContext {
            data_dir: data_dir.to_path_buf(),
            settings: Settings {
                retry_delays_ms: vec![0],
                queue_poll_interval_ms: 10,
                ..Settings::default()
            },
        }
    }

    fn args(command: Command) -> Args {
        Args {
            data_dir: None,
            verbose: false,
            command,
        }
    }

    fn source(src: &Path) -> SourceArgs {
        SourceArgs {
            src: Some(src.to_path_buf()),
            no_recurse: false,
            ext: None,
        }
    }

    fn move_command(src: &Path, dst: &Path, folder: &str) -> Command {
        Command::Move {
            source: source(src),
            dst: Some(dst.to_path_buf()),
            folder: Some(folder.to_string()),
        }
    }

    fn only_job(data_dir: &Path) -> Job {
        let jobs = JobStore::new(data_dir.join(JOBS_FILE_NAME))
            .load_jobs()
            .expect("Failed to load jobs");
        assert_eq!(jobs.len(), 1);
        jobs.into_iter().next().expect("Job missing")
    }

    #[test]
    fn test_cli_move_with_valid_directories() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("scan.pdf"), "hello").expect("Failed to write file");
        std::fs::write(src_dir.path().join("notes.txt"), "skip me").expect("Failed to write file");

        let result = run_cli(
            &args(move_command(src_dir.path(), dst_dir.path(), "Invoices")),
            context(data_dir.path()),
        );

        assert_eq!(result.expect("CLI should succeed"), Outcome::Success);
        assert!(dst_dir.path().join("Invoices").join("scan.pdf").exists());
        assert!(!src_dir.path().join("scan.pdf").exists());
        assert!(src_dir.path().join("notes.txt").exists(), "Other extensions stay put");

        let job = only_job(data_dir.path());
        assert!(job.is_completed());
        assert_eq!(job.successful_file_count(), 1);
    }

    #[test]
    fn test_cli_move_remembers_folders() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("a.pdf"), "a").expect("Failed to write file");

        run_cli(
            &args(move_command(src_dir.path(), dst_dir.path(), "Taxes")),
            context(data_dir.path()),
        )
        .expect("CLI should succeed");

        let saved = Settings::load(&data_dir.path().join(SETTINGS_FILE_NAME)).expect("Failed to load settings");
        assert_eq!(saved.last_source_folder.as_deref(), Some(src_dir.path()));
        assert_eq!(saved.last_destination_folder.as_deref(), Some(dst_dir.path()));
        assert_eq!(saved.last_destination_folder_name.as_deref(), Some("Taxes"));
    }

    #[test]
    fn test_cli_rejects_missing_source() {
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = TempDir::new().expect("Failed to create temp dir");

        let result = run_cli(
            &args(move_command(Path::new("/nonexistent/path"), dst_dir.path(), "X")),
            context(data_dir.path()),
        );
        assert!(result.is_err(), "CLI should reject missing source");
    }

    #[test]
    fn test_cli_requires_source_when_none_remembered() {
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        let command = Command::Scan(SourceArgs {
            src: None,
            no_recurse: false,
            ext: None,
        });

        let result = run_cli(&args(command), context(data_dir.path()));
        assert!(result.is_err(), "CLI should ask for --src");
    }

    #[test]
    fn test_cli_move_with_no_documents_succeeds() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = TempDir::new().expect("Failed to create temp dir");

        let result = run_cli(
            &args(move_command(src_dir.path(), dst_dir.path(), "Empty")),
            context(data_dir.path()),
        );

        assert_eq!(result.expect("CLI should succeed"), Outcome::Success);
        assert!(!data_dir.path().join(JOBS_FILE_NAME).exists(), "No job for an empty scan");
    }

    #[test]
    fn test_cli_scan_saves_catalog() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::create_dir(src_dir.path().join("nested")).expect("Failed to create dir");
        std::fs::write(src_dir.path().join("a.pdf"), "a").expect("Failed to write file");
        std::fs::write(src_dir.path().join("nested").join("b.PDF"), "bb").expect("Failed to write file");

        let mut flat = source(src_dir.path());
        flat.no_recurse = true;
        run_cli(&args(Command::Scan(flat)), context(data_dir.path())).expect("Scan should succeed");
        let catalog = CatalogStore::new(data_dir.path().join(CATALOG_FILE_NAME));
        assert_eq!(catalog.load_snapshot().expect("Failed to load catalog").len(), 1);

        run_cli(&args(Command::Scan(source(src_dir.path()))), context(data_dir.path()))
            .expect("Scan should succeed");
        assert_eq!(catalog.load_snapshot().expect("Failed to load catalog").len(), 2);
    }

    #[test]
    fn test_cli_jobs_and_show_after_move() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("a.pdf"), "a").expect("Failed to write file");
        run_cli(
            &args(move_command(src_dir.path(), dst_dir.path(), "Box")),
            context(data_dir.path()),
        )
        .expect("Move should succeed");
        let job = only_job(data_dir.path());

        let listed = run_cli(
            &args(Command::Jobs { page: 1, page_size: 10 }),
            context(data_dir.path()),
        );
        assert_eq!(listed.expect("Jobs should succeed"), Outcome::Success);

        let shown = run_cli(&args(Command::Show { id: job.id }), context(data_dir.path()));
        assert_eq!(shown.expect("Show should succeed"), Outcome::Success);

        let retried = run_cli(&args(Command::Retry { id: job.id }), context(data_dir.path()));
        assert_eq!(retried.expect("Retry should succeed"), Outcome::Success);
    }

    #[test]
    fn test_cli_rejects_nested_folder_name() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(src_dir.path().join("a.pdf"), "a").expect("Failed to write file");

        let result = run_cli(
            &args(move_command(src_dir.path(), dst_dir.path(), "2024/Q1")),
            context(data_dir.path()),
        );

        assert!(result.is_err(), "Folder names with separators are rejected");
        assert!(src_dir.path().join("a.pdf").exists());
        assert!(!dst_dir.path().join("2024").exists());
    }

    #[test]
    fn test_cli_retry_of_interrupted_job_succeeds() {
        let src_dir = TempDir::new().expect("Failed to create temp dir");
        let dst_dir = TempDir::new().expect("Failed to create temp dir");
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        let path = src_dir.path().join("a.pdf");
        std::fs::write(&path, "a").expect("Failed to write file");
        let doc = engine::fs_ops::document_info(&path).expect("Failed to describe document");

        let mut job = Job::new("Box", dst_dir.path(), &[doc]);
        job.mark_interrupted(Utc::now());
        JobStore::new(data_dir.path().join(JOBS_FILE_NAME))
            .save_job(&job)
            .expect("Failed to save job");

        let retried = run_cli(&args(Command::Retry { id: job.id }), context(data_dir.path()));
        assert_eq!(retried.expect("Retry should succeed"), Outcome::Success);

        let done = only_job(data_dir.path());
        assert_eq!(done.successful_file_count(), 1);
        assert!(done.has_errors(), "Interrupted marker outlives the retry");
        assert!(dst_dir.path().join("Box").join("a.pdf").exists());

        let shown = run_cli(&args(Command::Show { id: job.id }), context(data_dir.path()));
        assert_eq!(shown.expect("Show should succeed"), Outcome::Success);

        // Everything moved: nothing left to offer
        let again = run_cli(&args(Command::Retry { id: job.id }), context(data_dir.path()));
        assert_eq!(again.expect("Retry should succeed"), Outcome::Success);
        assert_eq!(only_job(data_dir.path()).completed_at, done.completed_at);
    }

    #[test]
    fn test_outcome_follows_unmoved_files() {
        let doc = DocumentInfo {
            file_name: "a.pdf".to_string(),
            full_path: PathBuf::from("/in/a.pdf"),
            length: 1,
            last_write_time: Utc::now(),
        };
        let mut job = Job::new("X", Path::new("/out"), &[doc]);
        job.fail_with_general_error("Access denied: /out", Utc::now());
        assert_eq!(Outcome::for_job(&job), Outcome::PartialFailure);

        job.files[0].is_successful = true;
        assert!(job.has_errors());
        assert_eq!(Outcome::for_job(&job), Outcome::Success);
    }

    #[test]
    fn test_cli_rejects_unknown_job() {
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        let id = Uuid::new_v4();

        assert!(run_cli(&args(Command::Show { id }), context(data_dir.path())).is_err());
        assert!(run_cli(&args(Command::Retry { id }), context(data_dir.path())).is_err());
    }

    #[test]
    fn test_cli_rejects_page_zero() {
        let data_dir = TempDir::new().expect("Failed to create temp dir");
        let result = run_cli(&args(Command::Jobs { page: 0, page_size: 10 }), context(data_dir.path()));
        assert!(result.is_err());
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(CliProgress::format_bytes(512), "512.00 B");
        assert_eq!(CliProgress::format_bytes(16 * 1024 * 1024), "16.00 MB");
        assert_eq!(CliProgress::format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(CliProgress::format_duration(Duration::from_secs(3723)), "1h 2m 3s");
        assert_eq!(CliProgress::progress_bar(50), "[==========          ] 50%");
        assert_eq!(CliProgress::progress_bar(100), "[====================] 100%");
    }

    #[test]
    fn test_args_parse_subcommands() {
        let parsed = Args::try_parse_from([
            "docsort", "move", "--src", "/in", "--dst", "/out", "--folder", "Taxes", "--no-recurse",
        ])
        .expect("Arguments should parse");

        match parsed.command {
            Command::Move { source, dst, folder } => {
                assert_eq!(source.src, Some(PathBuf::from("/in")));
                assert!(source.no_recurse);
                assert_eq!(dst, Some(PathBuf::from("/out")));
                assert_eq!(folder.as_deref(), Some("Taxes"));
            }
            other => panic!("Unexpected command: {:?}", other),
        }

        let parsed = Args::try_parse_from(["docsort", "--verbose", "jobs"]).expect("Arguments should parse");
        assert!(parsed.verbose);
        assert!(matches!(parsed.command, Command::Jobs { page: 1, page_size: 20 }));
    }
}
