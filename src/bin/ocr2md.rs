//! CLI binary for edgequake-ocr2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `OcrConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_ocr2md::pipeline::input::{resolve_input, InputSource};
use edgequake_ocr2md::{
    convert_bytes, convert_file, ConversionOutput, ConversionProgressCallback, OcrConfig,
    PageSeparator, ProcessingFailure, ProgressCallback, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
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

/// Terminal progress callback: one spinner for the running stage and a log
/// line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, filename: &str) {
        self.bar.set_prefix("Converting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {filename} with Mistral OCR…"))
        ));
    }

    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<22} {}",
            green("✓"),
            stage.label(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        self.bar.println(format!("  {} {:<22} {}", red("✗"), stage.label(), red(error)));
        self.bar.finish_and_clear();
    }

    fn on_conversion_complete(&self, page_count: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages converted",
            green("✔"),
            bold(&page_count.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Basic conversion (stdout)
  ocr2md document.pdf

  # Convert to file
  ocr2md document.pdf -o output.md

  # Convert from URL
  ocr2md https://arxiv.org/pdf/1706.03762 -o attention.md

  # HTML comment between pages instead of a horizontal rule
  ocr2md --separator comment scan.pdf

  # JSON output with timings
  ocr2md --json document.pdf > output.json

  # Serve POST /v1/convert (requires the `server` feature)
  ocr2md --serve 127.0.0.1:8080

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY     Mistral API key (required)
  MISTRAL_BASE_URL    Override the API root (default https://api.mistral.ai/v1)
  MISTRAL_OCR_MODEL   Override the OCR model (default mistral-ocr-latest)
  RUST_LOG            Override the log filter

SETUP:
  1. Set API key:     export MISTRAL_API_KEY=...
  2. Convert:         ocr2md document.pdf -o output.md
"#;

/// Convert PDF files and URLs to Markdown using Mistral OCR.
#[derive(Parser, Debug)]
#[command(
    name = "ocr2md",
    version,
    about = "Convert PDF files and URLs to Markdown using Mistral OCR",
    long_about = "Convert PDF documents (local files or URLs) to Markdown with the Mistral OCR \
API. Extracted figures are inlined as data URIs so the output is a single self-contained file.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "serve")]
    input: Option<String>,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long, env = "OCR2MD_OUTPUT")]
    output: Option<PathBuf>,

    /// OCR model ID.
    #[arg(long, env = "MISTRAL_OCR_MODEL")]
    model: Option<String>,

    /// Mistral API key.
    #[arg(long, env = "MISTRAL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// API root URL.
    #[arg(long, env = "MISTRAL_BASE_URL")]
    base_url: Option<String>,

    /// Validity of the retrieval URL handed to the OCR job, in seconds (1–86400).
    #[arg(long, env = "OCR2MD_URL_EXPIRY", default_value_t = 120)]
    url_expiry: u64,

    /// Per-request timeout in seconds (also used for URL downloads).
    #[arg(long, env = "OCR2MD_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// Page separator: hr, comment, or custom string.
    #[arg(long, env = "OCR2MD_SEPARATOR", default_value = "hr")]
    separator: String,

    /// Output structured JSON (ConversionOutput, or the error body) instead of Markdown.
    #[arg(long, env = "OCR2MD_JSON")]
    json: bool,

    /// Disable progress spinner.
    #[arg(long, env = "OCR2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCR2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OCR2MD_QUIET")]
    quiet: bool,

    /// Serve `POST /v1/convert` on this address instead of converting a file.
    #[arg(long, value_name = "ADDR", conflicts_with_all = ["input", "output"])]
    serve: Option<SocketAddr>,

    /// Include provider diagnostics in error responses (with --serve).
    #[arg(long, requires = "serve")]
    expose_error_detail: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters to the user, so
    // library INFO logs are suppressed while it is shown.
    let show_progress = cli.serve.is_none() && !cli.quiet && !cli.no_progress && !cli.json;
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
        let cb = CliProgressCallback::new();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Server mode ──────────────────────────────────────────────────────
    if let Some(addr) = cli.serve {
        return serve(addr, config, cli.expose_error_detail).await;
    }

    let Some(input) = cli.input.as_deref() else {
        anyhow::bail!("An input file or URL is required");
    };

    // ── Run conversion ───────────────────────────────────────────────────
    let result = match resolve_input(input, cli.timeout).await {
        Ok(InputSource::Local(path)) => convert_file(&path, &config).await,
        Ok(InputSource::Downloaded { bytes, filename }) => {
            convert_bytes(&bytes, Some(&filename), &config).await
        }
        Err(cause) => Err(ProcessingFailure::new(input_name(input), cause)),
    };

    let output = match result {
        Ok(output) => output,
        Err(failure) => return report_failure(&cli, failure),
    };

    let rendered = if cli.json {
        serde_json::to_string_pretty(&output).context("Failed to serialise output")?
    } else {
        output.markdown.clone()
    };

    if let Some(ref output_path) = cli.output {
        write_atomic(output_path, rendered.as_bytes())
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(rendered.as_bytes())
            .context("Failed to write to stdout")?;
        // Ensure a trailing newline on stdout.
        if !rendered.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !cli.json {
        print_summary(&output, cli.output.as_deref());
    }

    Ok(())
}

/// Map CLI args to `OcrConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<OcrConfig> {
    let mut builder = OcrConfig::builder()
        .url_expiry_secs(cli.url_expiry)
        .request_timeout_secs(cli.timeout)
        .page_separator(parse_separator(&cli.separator));

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.trim().to_lowercase().as_str() {
        "hr" | "---" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        _ => PageSeparator::Custom(s.to_string()),
    }
}

/// Display name for an input that failed before the pipeline started.
fn input_name(input: &str) -> String {
    let last = input
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    edgequake_ocr2md::pipeline::input::sanitize_filename(last)
}

/// Print the failure (as JSON with `--json`) and exit non-zero.
fn report_failure(cli: &Cli, failure: ProcessingFailure) -> Result<()> {
    if cli.json {
        let body = serde_json::to_string_pretty(&failure.to_body(true))
            .context("Failed to serialise error")?;
        println!("{body}");
    } else {
        eprintln!("{} {}", red("✘"), failure);
        if let Some(detail) = failure.detail() {
            eprintln!("   {}", dim(&detail));
        }
    }
    std::process::exit(match failure.status_code() {
        400 => 2,
        _ => 1,
    });
}

fn print_summary(output: &ConversionOutput, written_to: Option<&Path>) {
    let target = written_to
        .map(|p| bold(&p.display().to_string()))
        .unwrap_or_else(|| "stdout".to_string());
    eprintln!(
        "{}  {} pages  {} images  {}ms  →  {}",
        green("✔"),
        output.page_count,
        output.stats.images_inlined,
        output.stats.total_ms,
        target,
    );
    eprintln!(
        "   {}",
        dim(&format!(
            "upload {}ms / url {}ms / ocr {}ms / assemble {}ms",
            output.stats.upload_ms,
            output.stats.retrieval_url_ms,
            output.stats.ocr_ms,
            output.stats.assemble_ms
        )),
    );
}

/// Write via a temp file in the target directory, then rename over `path`.
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).context("Failed to create temp file")?;
    tmp.write_all(contents).context("Failed to write temp file")?;
    tmp.persist(path).map_err(|e| e.error).context("Failed to move output into place")?;
    Ok(())
}

#[cfg(feature = "server")]
async fn serve(addr: SocketAddr, config: OcrConfig, expose_error_detail: bool) -> Result<()> {
    use edgequake_ocr2md::server::{self, ServerState};

    eprintln!("{} Serving POST /v1/convert on {}", cyan("◆"), bold(&addr.to_string()));
    let state = ServerState::new(config).expose_error_detail(expose_error_detail);
    server::serve(addr, state).await.context("Server error")
}

#[cfg(not(feature = "server"))]
async fn serve(_addr: SocketAddr, _config: OcrConfig, _expose_error_detail: bool) -> Result<()> {
    anyhow::bail!("--serve requires ocr2md to be built with the `server` feature")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separator_parsing() {
        assert_eq!(parse_separator("hr"), PageSeparator::HorizontalRule);
        assert_eq!(parse_separator("---"), PageSeparator::HorizontalRule);
        assert_eq!(parse_separator("Comment"), PageSeparator::Comment);
        assert_eq!(parse_separator("* * *"), PageSeparator::Custom("* * *".into()));
    }

    #[test]
    fn input_name_from_url_or_path() {
        assert_eq!(input_name("https://example.com/a/paper.pdf?x=1"), "paper.pdf");
        assert_eq!(input_name("/tmp/scans/report.pdf"), "report.pdf");
        assert_eq!(input_name("https://example.com/"), "example.com");
    }

    #[test]
    fn atomic_write_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.md");
        std::fs::write(&path, "old").unwrap();
        write_atomic(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn cli_requires_input_or_serve() {
        assert!(Cli::try_parse_from(["ocr2md", "doc.pdf"]).is_ok());
        assert!(Cli::try_parse_from(["ocr2md", "--serve", "127.0.0.1:8080"]).is_ok());
        assert!(Cli::try_parse_from(["ocr2md", "--json"]).is_err());
    }
}
