use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use docbulk_core::{
    encode_metadata_pairs, fetch_page, parse_metadata_search, path, BatchProgress, BulkConfig,
    BulkObserver, BulkOperationRunner, BulkSummary, CancellationToken, DocumentService,
    FilterSpec, MemoryDocumentService, OperationCatalog, OperationKind, PendingOperation,
    RunState,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docbulk")]
#[command(about = "docbulk CLI - bulk tag, metadata and field edits over a JSON document store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count documents matching a filter
    Count {
        /// Document store file (JSON array of documents)
        #[arg(long, default_value = "documents.json")]
        store: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Apply one operation to every matching document
    Apply {
        #[arg(long, default_value = "documents.json")]
        store: PathBuf,
        /// Operation kind, e.g. add-tags or set-field
        #[arg(long)]
        op: OperationKind,
        /// Operation payload as JSON
        #[arg(long, default_value = "null")]
        payload: String,
        #[command(flatten)]
        filter: FilterArgs,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
        /// Print previews for the first page without committing
        #[arg(long)]
        dry_run: bool,
        /// TOML file with run settings
        #[arg(long, env = "DOCBULK_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Print the value at a path inside a document's extracted fields
    Get {
        #[arg(long, default_value = "documents.json")]
        store: PathBuf,
        #[arg(long)]
        id: String,
        /// Path such as items[0].sku
        #[arg(long)]
        path: String,
    },
    /// Encode "key=value,..." search text as a metadata filter parameter
    EncodeMeta {
        text: String,
    },
}

#[derive(Args, Default)]
struct FilterArgs {
    /// Case-insensitive substring of the document name
    #[arg(long)]
    name: Option<String>,
    /// Required tag id (repeatable; all must be present)
    #[arg(long = "tag")]
    tags: Vec<String>,
    /// Metadata pairs, e.g. "author=John Smith,type=invoice"
    #[arg(long)]
    meta: Option<String>,
}

impl FilterArgs {
    fn to_filter(&self) -> Result<FilterSpec> {
        let mut filter = FilterSpec::new();
        if let Some(name) = &self.name {
            filter = filter.with_name_search(name.clone());
        }
        for tag in &self.tags {
            filter = filter.with_tag(tag.clone());
        }
        if let Some(meta) = &self.meta {
            for (key, value) in parse_metadata_search(meta).context("Invalid --meta filter")? {
                filter = filter.with_metadata_pair(key, value);
            }
        }
        Ok(filter)
    }
}

/// Stderr writer that clears the progress bar around each log line
struct BarAwareStderr(ProgressBar);

impl Write for BarAwareStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

fn main() -> Result<()> {
    // Hidden until a run starts; logs are routed around it from the beginning
    let bar = ProgressBar::hidden();
    let log_bar = bar.clone();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(move || BarAwareStderr(log_bar.clone()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Count { store, filter } => count(&store, &filter),
        Commands::Apply {
            store,
            op,
            payload,
            filter,
            yes,
            dry_run,
            config,
        } => apply(
            &store,
            op,
            &payload,
            &filter,
            ApplyOptions {
                yes,
                dry_run,
                config: config.as_deref(),
                bar,
            },
        ),
        Commands::Get { store, id, path } => get_value(&store, &id, &path),
        Commands::EncodeMeta { text } => encode_meta(&text),
    }
}

fn open_store(store: &Path) -> Result<MemoryDocumentService> {
    let service = MemoryDocumentService::load_json_file(store)
        .with_context(|| format!("Failed to load document store: {}", store.display()))?;
    info!(store = %store.display(), documents = service.len(), "loaded document store");
    Ok(service)
}

fn count(store: &Path, filter_args: &FilterArgs) -> Result<()> {
    let service = open_store(store)?;
    let filter = filter_args.to_filter()?;
    let page = service
        .list(&filter, 0, 1)
        .context("Failed to count matching documents")?;
    println!("{}", page.total_matched);
    Ok(())
}

/// Drives the progress bar from runner callbacks
struct ProgressPrinter {
    bar: ProgressBar,
    started: bool,
}

impl ProgressPrinter {
    fn new(bar: ProgressBar) -> Self {
        ProgressPrinter {
            bar,
            started: false,
        }
    }

    fn start(&mut self, total: usize) {
        self.bar.set_length(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
        {
            self.bar.set_style(style.progress_chars("█▓░"));
        }
        self.bar.set_draw_target(ProgressDrawTarget::stderr());
        self.started = true;
    }
}

impl BulkObserver for ProgressPrinter {
    fn on_progress(&mut self, progress: &BatchProgress) {
        if progress.total_matched == 0 {
            return;
        }
        if !self.started {
            self.start(progress.total_matched);
        }
        self.bar.set_position(progress.processed as u64);
        self.bar.set_message(format!(
            "{} ok, {} failed",
            progress.succeeded, progress.failed
        ));
    }

    fn on_finished(&mut self, summary: &BulkSummary) {
        if !self.started {
            return;
        }
        let outcome = if summary.cancelled { "cancelled" } else { "done" };
        self.bar.finish_with_message(format!(
            "{}: {} ok, {} failed",
            outcome, summary.succeeded, summary.failed
        ));
    }
}

struct ApplyOptions<'a> {
    yes: bool,
    dry_run: bool,
    config: Option<&'a Path>,
    bar: ProgressBar,
}

/// Cancel `token` on Ctrl-C
///
/// The returned runtime owns the signal listener and must outlive the run.
fn cancel_on_interrupt(token: CancellationToken) -> Result<Runtime> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .context("Failed to start signal listener")?;
    runtime.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current document");
            token.cancel();
        }
    });
    Ok(runtime)
}

fn apply(
    store: &Path,
    kind: OperationKind,
    payload: &str,
    filter_args: &FilterArgs,
    options: ApplyOptions<'_>,
) -> Result<()> {
    let payload: Value =
        serde_json::from_str(payload).with_context(|| format!("Invalid JSON payload: {}", payload))?;
    let config = match options.config {
        Some(path) => BulkConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => BulkConfig::default(),
    };
    let filter = filter_args.to_filter()?;
    let service = open_store(store)?;

    if options.dry_run {
        return preview(&service, &filter, kind, payload, &config);
    }

    let token = CancellationToken::new();
    let mut printer = ProgressPrinter::new(options.bar);
    let mut runner = BulkOperationRunner::new(&service, config);
    let state = runner
        .request(
            &filter,
            PendingOperation::new(kind, payload),
            token.clone(),
            &mut printer,
        )
        .context("Failed to prepare bulk operation")?;

    if state == RunState::AwaitingConfirmation {
        let total = runner.progress().total_matched;
        if !options.yes && !prompt(&format!("Apply {} to {} documents? [y/N] ", kind, total))? {
            runner.decline()?;
            println!("Aborted");
            return Ok(());
        }
        // Installed after the prompt so Ctrl-C there still exits
        let signals = cancel_on_interrupt(token)?;
        runner.confirm()?;
        let outcome = runner.run(&mut printer);
        signals.shutdown_background();
        // Documents committed before a failed page fetch are kept
        service
            .save_json_file(store)
            .with_context(|| format!("Failed to save document store: {}", store.display()))?;
        info!(store = %store.display(), "saved document store");
        outcome.context("Bulk operation failed")?;
    }

    let Some(summary) = runner.summary().copied() else {
        bail!("Bulk operation ended without a summary");
    };
    if summary.nothing_to_do() {
        println!("No documents match the filter");
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn preview(
    service: &MemoryDocumentService,
    filter: &FilterSpec,
    kind: OperationKind,
    payload: Value,
    config: &BulkConfig,
) -> Result<()> {
    let mutation = OperationCatalog::build(&PendingOperation::new(kind, payload))
        .context("Invalid operation payload")?;
    let page = fetch_page(service, filter, 0, config.page_size)
        .context("Failed to fetch documents for preview")?;

    for document in &page.items {
        match mutation.preview(document) {
            Ok(updated) => println!("{}", serde_json::to_string_pretty(&updated)?),
            Err(e) => eprintln!("{}: {}", document.id, e),
        }
    }
    if !page.is_last {
        eprintln!("(showing the first {} documents)", page.items.len());
    }
    Ok(())
}

fn prompt(question: &str) -> Result<bool> {
    eprint!("{}", question);
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn get_value(store: &Path, id: &str, path_text: &str) -> Result<()> {
    let service = open_store(store)?;
    let document = service
        .get(id)
        .with_context(|| format!("Document not found: {}", id))?;
    let tokens = path::tokenize(path_text)?;
    let value = path::get(&document.extracted_fields, &tokens)?;
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn encode_meta(text: &str) -> Result<()> {
    let pairs = parse_metadata_search(text).context("Invalid metadata search text")?;
    println!("{}", encode_metadata_pairs(&pairs));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(total: usize, processed: usize, failed: usize) -> BatchProgress {
        BatchProgress {
            total_matched: total,
            processed,
            succeeded: processed - failed,
            failed,
            cancelled: false,
        }
    }

    #[test]
    fn test_progress_printer_tracks_runner_progress() {
        let bar = ProgressBar::hidden();
        let mut printer = ProgressPrinter::new(bar.clone());

        printer.on_progress(&progress(40, 1, 0));
        assert_eq!(bar.length(), Some(40));
        assert_eq!(bar.position(), 1);

        printer.on_progress(&progress(40, 25, 2));
        assert_eq!(bar.position(), 25);
        assert_eq!(bar.message(), "23 ok, 2 failed");

        printer.on_finished(&BulkSummary {
            total_matched: 40,
            succeeded: 23,
            failed: 2,
            cancelled: true,
        });
        assert!(bar.is_finished());
        assert_eq!(bar.message(), "cancelled: 23 ok, 2 failed");
    }

    #[test]
    fn test_progress_printer_ignores_empty_runs() {
        let bar = ProgressBar::hidden();
        let mut printer = ProgressPrinter::new(bar.clone());

        printer.on_progress(&progress(0, 0, 0));
        printer.on_finished(&BulkSummary {
            total_matched: 0,
            succeeded: 0,
            failed: 0,
            cancelled: false,
        });
        assert!(!printer.started);
        assert!(!bar.is_finished());
    }
}
