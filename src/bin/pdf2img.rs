//! CLI binary for edgequake-pdf2img.
//!
//! Maps flags onto `ConversionConfig`, renders a progress bar while pages are
//! exported and writes the resulting zip archive to disk.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2img::{
    convert, inspect, save_archive, CancelFlag, ConversionConfig, ExportProgressCallback,
    ExportScope, ImageFormat, LlmNameSuggester, ProgressCallback, RenderScale,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────

/// Live progress bar plus one log line per exported page.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Pages already counted on the bar; retries report a page twice.
    counted: Mutex<HashSet<usize>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            counted: Mutex::new(HashSet::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Move the bar forward once per page, however often it is reported.
    fn advance(&self, page_num: usize) {
        let first_time = self
            .counted
            .lock()
            .map(|mut seen| seen.insert(page_num))
            .unwrap_or(false);
        if first_time {
            self.bar.inc(1);
        }
    }
}

impl ExportProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Rendering");
        self.bar.reset_eta();
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, _progress: u8, bytes: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{:>6} KiB", bytes / 1024)),
            dim(&format!("{secs:.2}s")),
        ));
        self.advance(page_num);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, _progress: u8, error: &str) {
        let secs = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&msg),
            dim(&format!("{secs:.2}s")),
        ));
        self.advance(page_num);
    }

    fn on_run_cancelled(&self, processed: usize, total_pages: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} cancelled after {}/{} pages, packaging what is done",
            yellow("⚠"),
            bold(&processed.to_string()),
            total_pages
        );
    }

    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} pages rendered",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages rendered  ({} failed)",
                if success_count == 0 { red("✘") } else { yellow("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Every page as JPEG at 1.5x, archive written to the current directory
  pdf2img document.pdf

  # PNG at 2x for pages 1 to 3 and 5
  pdf2img --format png --scale 2 --pages "1-3, 5" report.pdf -o out/

  # Render all pages but archive only the selection
  pdf2img --pages 2,4 --all-pages slides.pdf

  # Download, then name the archive from page 1's content
  pdf2img --smart-name https://arxiv.org/pdf/1706.03762 -o attention.zip

  # Print document facts only
  pdf2img --inspect-only document.pdf

PAGE RANGES:
  Comma-separated tokens, each a page "N" or a span "A-B" (1-based,
  inclusive). Invalid tokens are skipped; out-of-range pages are ignored.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to an existing libpdfium
  OPENAI_API_KEY          Used by --smart-name when no provider is given
  EDGEQUAKE_LLM_PROVIDER  Provider for --smart-name (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Model for --smart-name
"#;

/// Render PDF pages to images and package them into a zip archive.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2img",
    version,
    about = "Render PDF pages to JPEG/PNG/WebP images and package them into a zip archive",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Archive path, or an existing directory to write `{name}_exported.zip` into.
    #[arg(short, long, env = "PDF2IMG_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// Image encoding for every page.
    #[arg(long, env = "PDF2IMG_FORMAT", value_enum, default_value = "jpeg")]
    format: FormatArg,

    /// Lossy quality in [0.1, 1.0]. Ignored for PNG and WebP.
    #[arg(long, env = "PDF2IMG_QUALITY", default_value_t = 0.8)]
    quality: f32,

    /// Render multiplier: 1, 1.5, 2 or 3.
    #[arg(long, env = "PDF2IMG_SCALE", default_value_t = 1.5, value_parser = parse_scale)]
    scale: f32,

    /// Page range such as "1-3, 5". Default: every page.
    #[arg(long, env = "PDF2IMG_PAGES")]
    pages: Option<String>,

    /// Render every page; the archive still holds only the selected ones.
    #[arg(long, env = "PDF2IMG_ALL_PAGES")]
    all_pages: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2IMG_PASSWORD")]
    password: Option<String>,

    /// Explicit folder name inside the archive (also names the zip file).
    #[arg(long, env = "PDF2IMG_CONTAINER_NAME", conflicts_with = "smart_name")]
    container_name: Option<String>,

    /// Ask a vision LLM for a descriptive archive name.
    #[arg(long, env = "PDF2IMG_SMART_NAME")]
    smart_name: bool,

    /// LLM provider for --smart-name. Ignored without it.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// LLM model for --smart-name. Ignored without it.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Extra attempts for pages that failed to render.
    #[arg(long, env = "PDF2IMG_RETRY_FAILED", default_value_t = 0)]
    retry_failed: u32,

    /// Print a JSON report (ConversionOutput without the archive bytes) on stdout.
    #[arg(long, env = "PDF2IMG_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2IMG_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata only, no rendering.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2IMG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2IMG_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2IMG_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Largest accepted input, in MiB.
    #[arg(long, env = "PDF2IMG_MAX_FILE_SIZE", default_value_t = 50)]
    max_file_size: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Jpeg,
    Png,
    Webp,
}

impl From<FormatArg> for ImageFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Jpeg => ImageFormat::Jpeg,
            FormatArg::Png => ImageFormat::Png,
            FormatArg::Webp => ImageFormat::Webp,
        }
    }
}

fn parse_scale(s: &str) -> Result<f32, String> {
    let v: f32 = s.trim().parse().map_err(|_| format!("not a number: '{s}'"))?;
    RenderScale::try_from(v)
        .map(|_| v)
        .map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless -v is given.
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.input, cli.password.as_deref())
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            println!("Name:         {}", info.name);
            if let Some(ref t) = info.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = info.author {
                println!("Author:       {}", a);
            }
            println!("Pages:        {}", info.page_count);
            println!("Size:         {} bytes", info.size_bytes);
            println!("PDF Version:  {}", info.pdf_version);
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExportProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // Ctrl-C stops the run between pages; finished pages are still archived.
    let cancel = config.cancel.clone();
    tokio::spawn(watch_ctrl_c(cancel));

    // ── Run conversion ───────────────────────────────────────────────────
    let output = convert(&cli.input, &config)
        .await
        .context("Conversion failed")?;

    let path = save_archive(&output.archive, &output.archive_name, &cli.output)
        .await
        .context("Failed to write archive")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }

    if !cli.quiet {
        let stats = &output.stats;
        eprintln!(
            "{}  {}/{} pages archived  {}ms  →  {}",
            if stats.failed_pages == 0 && !stats.cancelled && stats.aborted.is_none() {
                green("✔")
            } else {
                yellow("⚠")
            },
            stats.archived_pages,
            stats.target_pages,
            stats.total_duration_ms,
            bold(&path.display().to_string()),
        );
        if let Some(ref reason) = stats.aborted {
            eprintln!("   {} run stopped early: {}", red("✗"), reason);
        }
        if stats.failed_pages > 0 {
            eprintln!(
                "   {} pages failed and were left out",
                red(&stats.failed_pages.to_string())
            );
        }
    }

    Ok(())
}

async fn watch_ctrl_c(cancel: CancelFlag) {
    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("\n{} stopping after the current page…", yellow("⚠"));
        cancel.cancel();
    }
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let scale = RenderScale::try_from(cli.scale).context("Invalid --scale")?;

    let mut builder = ConversionConfig::builder()
        .format(cli.format.into())
        .quality(cli.quality)
        .scale(scale)
        .scope(if cli.all_pages {
            ExportScope::AllPages
        } else {
            ExportScope::Selection
        })
        .retry_failed(cli.retry_failed)
        .download_timeout_secs(cli.download_timeout)
        .max_file_size_mb(cli.max_file_size);

    if let Some(ref pages) = cli.pages {
        builder = builder.pages(pages.clone());
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref name) = cli.container_name {
        builder = builder.container_name(name.clone());
    }
    if cli.smart_name {
        let suggester = LlmNameSuggester::from_env(cli.provider.as_deref(), cli.model.as_deref())
            .context("Failed to set up smart naming")?;
        builder = builder.name_suggester(Arc::new(suggester));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
