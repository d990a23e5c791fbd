//! CLI binary for deckforge.
//!
//! A thin shim over the library crate that maps CLI flags to `RunConfig`,
//! renders progress, and prints the run summary.

use anyhow::{Context, Result};
use clap::Parser;
use deckforge::{
    run, BackendKind, RunConfig, RunProgress, RunSummary,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one bar across documents with per-document log lines.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>2}/{len} documents  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");

        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl RunProgress for CliProgress {
    fn on_run_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_documents} document(s)…"))
        ));
    }

    fn on_document_start(&self, document: &str, _index: usize, _total: usize) {
        self.bar.set_message(document.to_string());
    }

    fn on_document_done(&self, document: &str, cards: usize) {
        self.bar.println(format!(
            "  {} {:<40} {}",
            green("✓"),
            document,
            dim(&format!("{cards:>3} cards"))
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, document: &str, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            let short: String = error.chars().take(79).collect();
            format!("{short}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<40} {}", red("✗"), document, red(&msg)));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, _processed: usize, _errored: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract every deck in ./workspace/raw with Gemini, merge into a master
  deckforge --prompt qa_cloze --merge

  # Claude backend, custom tag prefix, keep intermediates for inspection
  deckforge --backend claude --tag Anatomy_ --no-cleanup

  # Repeatable comparison run: nothing is moved or deleted
  deckforge --compare --merge trial_deck

  # Slides are already sanitized; skip the rename pass
  deckforge --skip-sanitize

WORKSPACE LAYOUT:
  <workspace>/
    raw/          drop incoming PDF decks here
    slides/       sanitized inputs (processed this run, then archived to done/)
    cards/        intermediate card JSON (deleted unless --no-cleanup)
    decks/        per-document decks and the master deck
    errors/       errors.log — every failure, with raw backend responses
    prompts/      prompt .txt files (--prompt selects one by stem)

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY        Gemini credential (required for --backend gemini)
  GEMINI_MODEL          Gemini model id (default: gemini-2.5-pro)
  CLAUDE_API_KEY        Claude credential (required for --backend claude)
  CLAUDE_MODEL          Claude model id (default: claude-sonnet-4-5-20250929)
  MAX_RETRIES           Retries per chunk on transient failures (default: 3)
  RETRY_DELAY_SECONDS   Fixed delay between retries (default: 5)
  PDF_CHUNK_MIN_PAGES   Lower bound on chunk size (default: 25)
  PDF_CHUNK_MAX_PAGES   Upper bound on chunk size (default: 40)

  Variables are also read from a .env file in the working directory.

EXIT STATUS:
  0  every document processed and archived
  1  at least one document errored, or merge/archival failed
"#;

/// Convert slide-deck PDFs into importable flashcard decks using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "deckforge",
    version,
    about = "Convert slide-deck PDFs into importable flashcard decks using LLMs",
    long_about = "Batch-convert a workspace of slide-deck PDFs into flashcard decks. Each deck is \
chunked, sent to an AI extraction backend with bounded retries, transformed into tagged deck \
rows, and optionally merged into one master deck. One failing document never aborts the run.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Workspace root (created on first run).
    #[arg(short, long, env = "DECKFORGE_WORKSPACE", default_value = "./workspace")]
    workspace: PathBuf,

    /// Extraction backend: gemini or claude.
    #[arg(short, long, env = "DECKFORGE_BACKEND", default_value = "gemini")]
    backend: String,

    /// Prompt file stem in <workspace>/prompts/ (".txt" optional).
    #[arg(short, long, env = "DECKFORGE_PROMPT", default_value = "qa_cloze")]
    prompt: String,

    /// Tag prefix prepended to the document tag on every row.
    #[arg(short, long, env = "DECKFORGE_TAG", default_value = "")]
    tag: String,

    /// Merge per-document decks into a master deck; optional custom name.
    #[arg(short, long, num_args = 0..=1, default_missing_value = "_MASTERDECK")]
    merge: Option<String>,

    /// Compare mode: leave every file where it is for repeat runs.
    #[arg(long)]
    compare: bool,

    /// Keep intermediate card JSON (archived instead of deleted).
    #[arg(long)]
    no_cleanup: bool,

    /// Skip filename sanitization; slides/ must already hold clean inputs.
    #[arg(long)]
    skip_sanitize: bool,

    /// Model identifier override for the selected backend.
    #[arg(long, env = "DECKFORGE_MODEL")]
    model: Option<String>,

    /// Retries per chunk on transient extraction failures.
    #[arg(long, env = "MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Fixed delay between retries, in seconds.
    #[arg(long, env = "RETRY_DELAY_SECONDS", default_value_t = 5)]
    retry_delay: u64,

    /// Lower bound on chunk size, in pages.
    #[arg(long, env = "PDF_CHUNK_MIN_PAGES", default_value_t = 25)]
    chunk_min_pages: usize,

    /// Upper bound on chunk size, in pages.
    #[arg(long, env = "PDF_CHUNK_MAX_PAGES", default_value_t = 40)]
    chunk_max_pages: usize,

    /// Concurrent extraction calls per document.
    #[arg(long, env = "DECKFORGE_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// List available prompts and exit.
    #[arg(long)]
    list_prompts: bool,

    /// Print the run summary as JSON instead of a table.
    #[arg(long)]
    json: bool,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides the per-document feedback; keep library
    // logs quiet unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // ── List-prompts mode ────────────────────────────────────────────────
    if cli.list_prompts {
        let dir = cli.workspace.join("prompts");
        let prompts = deckforge::prompts::list_prompts(&dir);
        if prompts.is_empty() {
            eprintln!("No prompts found in {}", dir.display());
        } else {
            for name in prompts {
                println!("{name}");
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    // ── Build config ─────────────────────────────────────────────────────
    let backend: BackendKind = cli.backend.parse().context("Invalid --backend")?;

    let mut builder = RunConfig::builder(&cli.workspace)
        .backend(backend)
        .prompt(&cli.prompt)
        .tag_prefix(&cli.tag)
        .merge(cli.merge.clone())
        .compare_mode(cli.compare)
        .no_cleanup(cli.no_cleanup)
        .skip_sanitize(cli.skip_sanitize)
        .max_retries(cli.max_retries)
        .retry_delay(Duration::from_secs(cli.retry_delay))
        .chunk_bounds(cli.chunk_min_pages, cli.chunk_max_pages)
        .chunk_concurrency(cli.concurrency);

    if let Some(model) = &cli.model {
        builder = builder.model(model);
    }
    if show_progress {
        builder = builder.progress(CliProgress::new());
    }

    let config = builder.build().context("Invalid configuration")?;

    // ── Run pipeline ─────────────────────────────────────────────────────
    let summary = run(&config).await.context("Pipeline run failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        print_summary(&summary);
    }

    Ok(if summary.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Render the final per-document table and totals.
fn print_summary(summary: &RunSummary) {
    for outcome in &summary.outcomes {
        match &outcome.error {
            None => eprintln!(
                "{} {:<40} {}",
                green("✓"),
                outcome.document,
                dim(&format!("{:>3} cards", outcome.cards))
            ),
            Some(error) => eprintln!(
                "{} {:<40} {}",
                red("✗"),
                outcome.document,
                red(error)
            ),
        }
    }
    for error in &summary.run_errors {
        eprintln!("{} {}", red("✗"), red(error));
    }

    let status = if summary.is_failure() {
        red("✘")
    } else {
        green("✔")
    };
    eprintln!(
        "{status}  {} processed, {} errored, {} card(s) total",
        bold(&summary.processed().to_string()),
        if summary.errored() > 0 {
            red(&summary.errored().to_string())
        } else {
            summary.errored().to_string()
        },
        summary.total_cards(),
    );
    if let Some(master) = &summary.master_deck {
        eprintln!("   master deck: {}", bold(&master.display().to_string()));
    }
}
