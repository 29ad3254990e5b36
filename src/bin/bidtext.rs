//! CLI binary for bidtext.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use bidtext::pipeline::input::resolve_input;
use bidtext::{
    CascadeConfig, DocumentFormat, ExtractionConfig, ExtractionOutput,
    ExtractionProgressCallback, ExtractionSource, Extractor, PageSelection, PageSeparator,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per page.
///
/// A ZIP may hold several PDFs; each one restarts the bar.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&page_num)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_document_start(&self, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("PDF with {total_pages} selected pages"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(page_num, Instant::now());
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_ocr(&self, page_num: usize, _total: usize) {
        self.bar.set_message(format!("page {page_num} (OCR)"));
    }

    fn on_page_complete(
        &self,
        page_num: usize,
        total: usize,
        source: ExtractionSource,
        text_len: usize,
    ) {
        let secs = self.elapsed_secs(page_num);
        let tag = match source {
            ExtractionSource::Ocr => yellow("ocr "),
            _ => dim("text"),
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            tag,
            dim(&format!("{text_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: String) {
        let secs = self.elapsed_secs(page_num);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_complete(&self, total_pages: usize, recovered_pages: usize) {
        let failed = total_pages.saturating_sub(recovered_pages);
        self.bar.println(format!(
            "{} {}/{} pages recovered{}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&recovered_pages.to_string()),
            total_pages,
            if failed > 0 {
                format!("  ({} unrecoverable)", red(&failed.to_string()))
            } else {
                String::new()
            }
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract a tender PDF to stdout (OCR keys from the environment)
  bidtext tender.pdf

  # A whole bid bundle, to a file
  bidtext 招标文件.zip -o bundle.txt

  # Structural text only, no OCR calls
  bidtext --no-ocr tender.pdf

  # Pages 3-15 with page markers
  bidtext --pages 3-15 --separator marker tender.pdf

  # Explicit provider tiers
  bidtext --tiers tiers.json https://ggzy.example.cn/files/notice.pdf

  # JSON output with per-page sources and stats
  bidtext --json tender.pdf > tender.json

TIER FILE (--tiers):
  {
    "budget": { "max_quota_failures": 2, "max_bad_requests": 3,
                "max_transient_retries": 1, "retry_backoff_ms": 500 },
    "tiers": [
      { "provider": { "id": "openai", "kind": "open_ai_compatible" },
        "models": [ { "id": "gpt-4o-mini" } ],
        "credentials": [ { "label": "team", "key_env": "OPENAI_API_KEY" } ] },
      { "provider": { "id": "gemini", "kind": "gemini" },
        "models": [ { "id": "gemini-2.0-flash" } ],
        "credentials": [ { "key_env": "GEMINI_API_KEY" } ] }
    ]
  }

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY(S)       OpenAI keys, comma-separated for several credentials
  ANTHROPIC_API_KEY(S)    Anthropic keys
  GEMINI_API_KEY(S)       Google Gemini keys
  PDFIUM_LIB_PATH         Directory or file of the pdfium shared library
  RUST_LOG                Override log filtering (e.g. bidtext=debug)
"#;

/// Extract text from bid and tender documents.
#[derive(Parser, Debug)]
#[command(
    name = "bidtext",
    version,
    about = "Extract text from bid and tender documents (PDF, DOCX, ZIP, text)",
    long_about = "Extract best-effort text from bid and tender documents. PDFs are read \
structurally with row/column reconstruction; pages without a usable text layer are sent \
through a tiered cascade of vision OCR providers. DOCX, plain text (any common encoding) \
and ZIP bundles are supported.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path or HTTP/HTTPS URL.
    input: String,

    /// Write text to this file instead of stdout.
    #[arg(short, long, env = "BIDTEXT_OUTPUT")]
    output: Option<PathBuf>,

    /// Input format; `auto` sniffs the content.
    #[arg(long, value_enum, default_value = "auto")]
    format: FormatArg,

    /// JSON file with OCR provider tiers (default: from API key variables).
    #[arg(long, env = "BIDTEXT_TIERS")]
    tiers: Option<PathBuf>,

    /// Disable OCR; use structural PDF text only.
    #[arg(long, env = "BIDTEXT_NO_OCR")]
    no_ocr: bool,

    /// Rasterisation scale for OCR (0.5–6.0).
    #[arg(long, env = "BIDTEXT_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "BIDTEXT_PAGES", default_value = "all")]
    pages: String,

    /// Page separator: none, ff, marker, or a custom string.
    #[arg(long, env = "BIDTEXT_SEPARATOR", default_value = "none")]
    separator: String,

    /// Drop `[[unrecoverable page N]]` markers from the text.
    #[arg(long)]
    strip_placeholders: bool,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "BIDTEXT_PASSWORD")]
    password: Option<String>,

    /// Output structured JSON (ExtractionOutput) instead of text.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "BIDTEXT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BIDTEXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "BIDTEXT_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "BIDTEXT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call OCR timeout in seconds.
    #[arg(long, env = "BIDTEXT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Auto,
    Pdf,
    Docx,
    Zip,
    Text,
}

impl FormatArg {
    fn format(self) -> Option<DocumentFormat> {
        match self {
            FormatArg::Auto => None,
            FormatArg::Pdf => Some(DocumentFormat::Pdf),
            FormatArg::Docx => Some(DocumentFormat::Docx),
            FormatArg::Zip => Some(DocumentFormat::Zip),
            FormatArg::Text => Some(DocumentFormat::PlainText),
        }
    }
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    if !cli.quiet && !cli.no_ocr && config.cascade.tiers.is_empty() {
        eprintln!(
            "{} no OCR providers configured; scanned pages will be unrecoverable",
            yellow("⚠")
        );
    }
    let extractor = Extractor::new(config).context("Failed to initialise extractor")?;

    // ── Run extraction ───────────────────────────────────────────────────
    let output = match cli.format.format() {
        None => extractor.extract_input(&cli.input).await,
        Some(format) => {
            let resolved = resolve_input(&cli.input, cli.download_timeout)
                .await
                .context("Failed to read input")?;
            extractor.extract_as(&resolved.bytes, format).await
        }
    }
    .with_context(|| format!("Extraction failed for '{}'", cli.input))?;

    let rendered = if cli.json {
        serde_json::to_string_pretty(&output).context("Failed to serialise output")?
    } else {
        output.text.clone()
    };

    match cli.output {
        Some(ref path) => write_atomic(path, &rendered).await?,
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
            if !rendered.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }

    if !cli.quiet {
        print_summary(&output, cli.output.as_deref());
    }
    Ok(())
}

fn print_summary(output: &ExtractionOutput, path: Option<&Path>) {
    let s = &output.stats;
    let failed_files = output.files.iter().filter(|f| f.error.is_some()).count();
    let ok = s.failed_pages == 0 && failed_files == 0;
    let mut line = format!(
        "{}  {}  {} chars",
        if ok { green("✔") } else { cyan("⚠") },
        output.format,
        output.text.chars().count()
    );
    if s.total_pages > 0 {
        line.push_str(&format!(
            "  {} pages ({} text / {} ocr / {} failed, {} OCR calls)",
            s.total_pages, s.structural_pages, s.ocr_pages, s.failed_pages, s.ocr_attempts
        ));
    }
    if !output.files.is_empty() {
        line.push_str(&format!(
            "  {} files ({} failed)",
            output.files.len(),
            failed_files
        ));
    }
    line.push_str(&format!("  {}ms", s.total_duration_ms));
    if let Some(p) = path {
        line.push_str(&format!("  →  {}", bold(&p.display().to_string())));
    }
    eprintln!("{line}");
}

/// Write to a temp file next to `path`, then rename.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move output to {}", path.display()))?;
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let cascade = match cli.tiers {
        Some(ref path) => CascadeConfig::from_json_file(path)
            .with_context(|| format!("Failed to load provider tiers from {}", path.display()))?,
        None => CascadeConfig::from_env(),
    };

    let mut builder = ExtractionConfig::builder()
        .cascade(cascade)
        .ocr_enabled(!cli.no_ocr)
        .render_scale(cli.scale)
        .pages(parse_pages(&cli.pages)?)
        .page_separator(parse_separator(&cli.separator))
        .keep_placeholders(!cli.strip_placeholders)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }
        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }
        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "ff" | "formfeed" => PageSeparator::FormFeed,
        "marker" => PageSeparator::Marker,
        _ => PageSeparator::Custom(s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_parse() {
        assert!(matches!(parse_pages("all").unwrap(), PageSelection::All));
        assert!(matches!(parse_pages("5").unwrap(), PageSelection::Single(5)));
        assert!(matches!(parse_pages("3-15").unwrap(), PageSelection::Range(3, 15)));
        match parse_pages("1, 3,5").unwrap() {
            PageSelection::Set(v) => assert_eq!(v, vec![1, 3, 5]),
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_pages("0").is_err());
        assert!(parse_pages("9-2").is_err());
    }

    #[test]
    fn separator_parse_keeps_custom_case() {
        assert!(matches!(parse_separator("FF"), PageSeparator::FormFeed));
        match parse_separator("=== Page ===") {
            PageSeparator::Custom(s) => assert_eq!(s, "=== Page ==="),
            other => panic!("unexpected {other:?}"),
        }
    }
}
