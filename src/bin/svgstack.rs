//! CLI binary for svgstack.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, asks for a retention mode once the download is secured,
//! and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use svgstack::{
    secure, PageSize, PipelineConfig, PipelineProgressCallback, ProgressCallback, RetentionMode,
    RunReport, RunState,
};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner while the series is downloaded, then a bar
/// while pages are converted. Conversion events arrive out of order from
/// worker threads, so counters are atomics.
struct CliProgressCallback {
    /// Spinner shown during the fetch walk.
    fetch_bar: ProgressBar,
    /// Bar shown during conversion; hidden until the total is known.
    convert_bar: ProgressBar,
    secured: AtomicUsize,
    secured_bytes: AtomicU64,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let fetch_bar = ProgressBar::new_spinner();
        fetch_bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        fetch_bar.set_prefix("Fetching");
        fetch_bar.set_message("Connecting…");
        fetch_bar.enable_steady_tick(Duration::from_millis(80));

        let convert_bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden());

        Arc::new(Self {
            fetch_bar,
            convert_bar,
            secured: AtomicUsize::new(0),
            secured_bytes: AtomicU64::new(0),
            errors: AtomicUsize::new(0),
        })
    }

    /// Show the conversion bar once we know `total`.
    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.convert_bar.set_draw_target(ProgressDrawTarget::stderr());
        self.convert_bar.set_length(total as u64);
        self.convert_bar.set_style(style);
        self.convert_bar.set_prefix("Converting");
        self.convert_bar.reset_eta();
        self.convert_bar.enable_steady_tick(Duration::from_millis(80));
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_state_change(&self, state: RunState) {
        match state {
            RunState::Secured => {
                self.fetch_bar.finish_and_clear();
                let bytes = self.secured_bytes.load(Ordering::SeqCst);
                eprintln!(
                    "{} {} pages secured  {}",
                    green("✔"),
                    bold(&self.secured.load(Ordering::SeqCst).to_string()),
                    dim(&format!("{:.1} KiB", bytes as f64 / 1024.0)),
                );
            }
            RunState::Assembling => eprintln!("{} {}", cyan("◆"), bold("Assembling document…")),
            RunState::Cleanup => eprintln!("{} {}", cyan("◆"), bold("Cleaning up…")),
            _ => {}
        }
    }

    fn on_resource_secured(&self, index: u32, bytes: u64) {
        self.secured.fetch_add(1, Ordering::SeqCst);
        self.secured_bytes.fetch_add(bytes, Ordering::SeqCst);
        self.fetch_bar
            .set_message(format!("page {index}  {}", dim(&format!("{bytes} bytes"))));
    }

    fn on_conversion_start(&self, total: usize) {
        self.activate_bar(total);
        self.convert_bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Rasterising {total} pages…"))
        ));
    }

    fn on_item_complete(&self, _index: u32, _total: usize, _bytes: u64) {
        self.convert_bar.inc(1);
    }

    fn on_item_error(&self, index: u32, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['\u{2026}']).collect()
        } else {
            error.to_string()
        };

        self.convert_bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
        ));
        self.convert_bar.inc(1);
    }

    fn on_conversion_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.convert_bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages rasterised",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages rasterised  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Download, then choose what to keep from a menu
  svgstack https://example.com/deck/pages/

  # Straight to a PDF, deleting the intermediates
  svgstack https://example.com/deck/pages/ --mode 4 -o deck

  # Keep the PNGs at print density on US Letter
  svgstack https://example.com/deck/pages/ --mode document-keep-artifact \
      --dpi 600 --page-size letter

  # Machine-readable report
  svgstack https://example.com/deck/pages/ --mode 3 --json > report.json

RETENTION MODES:
  1  keep-source-only        Keep SVG files only
  2  keep-artifact-only      Convert to PNG, keep PNG files only
  3  keep-both               Convert to PNG, keep SVG and PNG files
  4  document-delete-all     Build PDF, delete SVG and PNG files
  5  document-keep-artifact  Build PDF, keep PNG files
  6  document-keep-both      Build PDF, keep SVG and PNG files

HOW THE SERIES IS FOUND:
  Pages are requested as {base}1, {base}2, … one at a time. The first
  index that does not answer 200 with a body ends the series. A network
  error therefore also ends it; the reason is printed with the summary.

ENVIRONMENT VARIABLES:
  SVGSTACK_*   Every flag can also be set from the environment
  RUST_LOG     Override the log filter (e.g. RUST_LOG=svgstack=debug)
"#;

/// Fetch a numbered series of SVG pages and bind it into a PDF.
#[derive(Parser, Debug)]
#[command(
    name = "svgstack",
    version,
    about = "Fetch a numbered series of SVG pages and bind it into a PDF",
    long_about = "Download {base}1, {base}2, … until the first missing page, store every SVG, \
then optionally rasterise the pages to PNG in parallel and place them, in order, one per page \
of a PDF. A retention mode decides which files are kept.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Base URL of the series; page N is fetched from {base}N.
    base_url: String,

    /// Directory for the SVG, PNG and PDF files.
    #[arg(short, long, env = "SVGSTACK_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// File name of the assembled PDF inside the output directory.
    #[arg(long, env = "SVGSTACK_DOCUMENT_NAME", default_value = "document.pdf")]
    document_name: String,

    /// Retention mode: 1–6 or its name. Prompted for when absent.
    #[arg(short, long, env = "SVGSTACK_MODE")]
    mode: Option<String>,

    /// Rasterisation DPI (72–600).
    #[arg(long, env = "SVGSTACK_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Concurrent conversions. Default: one less than the CPU count, minimum 2.
    #[arg(short, long, env = "SVGSTACK_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Page size: a4, letter, or WIDTHxHEIGHT in points.
    #[arg(long, env = "SVGSTACK_PAGE_SIZE", default_value = "a4")]
    page_size: String,

    /// Per-request timeout in seconds. Default: none.
    #[arg(long, env = "SVGSTACK_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    /// Do not load system fonts (SVG text is then not drawn).
    #[arg(long, env = "SVGSTACK_NO_SYSTEM_FONTS")]
    no_system_fonts: bool,

    /// Print the run report as JSON on stdout.
    #[arg(long, env = "SVGSTACK_JSON")]
    json: bool,

    /// Disable progress output.
    #[arg(long, env = "SVGSTACK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SVGSTACK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SVGSTACK_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress display replaces INFO logs; errors still come through.
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
        .with_writer(io::stderr)
        .init();

    // ── Validate before any network activity ─────────────────────────────
    // A mode given on the command line is checked now; a prompted one only
    // after the download, so a typo never costs the fetched pages.
    let preselected = cli
        .mode
        .as_deref()
        .map(RetentionMode::from_selection)
        .transpose()
        .context("Invalid --mode")?;

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let output_dir = config.layout.dir().to_path_buf();

    // ── Fetch ────────────────────────────────────────────────────────────
    let secured = secure(config).await.context("Download failed")?;

    // ── Choose what to keep ──────────────────────────────────────────────
    let mode = match preselected {
        Some(mode) => mode,
        None => {
            let answer = tokio::task::block_in_place(prompt_for_mode)
                .context("Failed to read mode selection")?;
            RetentionMode::from_selection(&answer).with_context(|| {
                format!(
                    "Invalid selection; the downloaded SVG files were kept in {}",
                    output_dir.display()
                )
            })?
        }
    };

    // ── Finish ───────────────────────────────────────────────────────────
    let report = secured.finish(mode).await.context("Run failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report);
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let page_size: PageSize = cli.page_size.parse().context("Invalid --page-size")?;

    let mut builder = PipelineConfig::builder(&cli.base_url)
        .output_dir(&cli.output_dir)
        .document_name(&cli.document_name)
        .dpi(cli.dpi)
        .page_size(page_size)
        .system_fonts(!cli.no_system_fonts);

    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(secs) = cli.request_timeout {
        builder = builder.request_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// List the modes on stderr and read one line from stdin.
fn prompt_for_mode() -> io::Result<String> {
    let mut stderr = io::stderr().lock();
    writeln!(stderr)?;
    writeln!(stderr, "{}", bold("What should be kept?"))?;
    for mode in RetentionMode::ALL {
        writeln!(
            stderr,
            "  {}  {:<24} {}",
            cyan(&mode.selection_number().to_string()),
            mode.name(),
            dim(mode.label())
        )?;
    }
    write!(stderr, "Select 1-6: ")?;
    stderr.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

fn print_summary(report: &RunReport) {
    let failed = report.failures.len();
    eprintln!(
        "{}  {} pages  mode {}  {}ms",
        if failed == 0 { green("✔") } else { cyan("⚠") },
        report.resources.len(),
        report.mode,
        report.stats.total_duration_ms,
    );
    if !report.terminal_reason.is_definitive() {
        eprintln!(
            "   {} series ended at page {} after {}; it may be incomplete",
            cyan("⚠"),
            report.terminal_index,
            report.terminal_reason
        );
    }
    if let Some(doc) = &report.document {
        eprintln!(
            "   {} pages  →  {}",
            doc.page_count(),
            bold(&doc.path.display().to_string())
        );
    } else if report.mode.assembles() {
        eprintln!("   {} no document was produced", red("✘"));
    }
    if let Some(cleanup) = &report.cleanup {
        if !cleanup.deleted.is_empty() {
            eprintln!("   {} files removed", dim(&cleanup.deleted.len().to_string()));
        }
    }
    for failure in &report.failures {
        eprintln!("   {} {}", red("✗"), failure);
    }
}
