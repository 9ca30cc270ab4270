//! CLI binary for deckle.
//!
//! A thin shim over the library crate that maps flags to `DeckleConfig`,
//! draws the status line and writes the result.

use anyhow::{bail, Context, Result};
use clap::Parser;
use deckle::{
    convert, convert_to_file, CoverStyle, DeckleConfig, OutputFormat, ProgressCallback,
    SharedProgress,
};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── Status line ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Counters {
    total_articles: usize,
    done_articles: usize,
    total_images: usize,
    done_images: usize,
}

impl Counters {
    fn line(&self) -> String {
        let mut parts = Vec::new();
        if self.total_articles > 1 {
            parts.push(format!(
                "[downloaded {}/{} articles]",
                self.done_articles, self.total_articles
            ));
        } else if self.total_articles == 1 && self.done_articles == 0 && self.total_images == 0 {
            parts.push("[fetching]".to_string());
        }
        if self.total_images > 0 {
            parts.push(format!(
                "[optimizing {}/{} images]",
                self.done_images, self.total_images
            ));
        }
        if parts.is_empty() {
            parts.push("[processing]".to_string());
        }
        parts.join(" ")
    }
}

/// One spinner line on stdout, redrawn on every event and every 150ms.
struct StatusLine {
    bar: ProgressBar,
    counters: Mutex<Counters>,
}

impl StatusLine {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stdout());
        bar.set_style(
            ProgressStyle::with_template("{msg} {spinner}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["|", "/", "-", "\\", " "]),
        );
        bar.set_message(Counters::default().line());
        bar.enable_steady_tick(Duration::from_millis(150));
        Arc::new(Self {
            bar,
            counters: Mutex::new(Counters::default()),
        })
    }

    fn update(&self, f: impl FnOnce(&mut Counters)) {
        let Ok(mut c) = self.counters.lock() else {
            return;
        };
        f(&mut c);
        self.bar.set_message(c.line());
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }

    fn abandon(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for StatusLine {
    fn on_run_start(&self, total_articles: usize) {
        self.update(|c| c.total_articles = total_articles);
    }

    fn on_article_complete(&self, _index: usize, _title: &str) {
        self.update(|c| c.done_articles += 1);
    }

    fn on_article_failed(&self, index: usize, url: &str, error: &str) {
        self.bar.suspend(|| {
            eprintln!("  [{index}] {}: {error} (skipping)", deckle::progress::short_url(url))
        });
        self.update(|c| c.done_articles += 1);
    }

    fn on_images_found(&self, count: usize) {
        if count > 0 {
            self.update(|c| c.total_images += count);
        }
    }

    fn on_image_done(&self) {
        self.update(|c| c.done_images += 1);
    }
}

// ── Flags ────────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = r#"EXAMPLES:
  # One article as a standalone HTML page
  deckle https://example.com/post -o post.html

  # A reading list as an EPUB
  deckle -epub -o weekend.epub reading.txt https://example.com/extra

  # Markdown on stdout, no progress or logs
  deckle -markdown -silent https://example.com/post > post.md

  # Smaller, grey images for e-ink
  deckle -epub -o book.epub -max-width 600 -quality 50 -grayscale list.txt

URL FILES:
  Arguments ending in .txt are read as one URL per line; blank lines and
  lines starting with # are ignored. The first file's name becomes the book
  title unless -title is given.

Go-style single-dash flags (-epub, -max-width=600) are accepted.

ENVIRONMENT VARIABLES:
  Every flag has a DECKLE_* variable, e.g. DECKLE_PROXY, DECKLE_TIMEOUT.
  RUST_LOG                  Override the log filter (e.g. deckle=debug)
  DECKLE_TEST_ALLOW_LOCAL   Set to 1 to allow private/loopback addresses
"#;

/// Fetch articles and produce clean HTML, Markdown or EPUB for e-readers.
#[derive(Parser, Debug)]
#[command(
    name = "deckle",
    version,
    about = "Fetch articles and produce clean HTML, Markdown or EPUB for e-readers",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Article URLs or .txt files with one URL per line.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Produce an EPUB 3 book (requires -o).
    #[arg(long, env = "DECKLE_EPUB", conflicts_with = "markdown")]
    epub: bool,

    /// Produce CommonMark; images become alt-text placeholders.
    #[arg(long, env = "DECKLE_MARKDOWN")]
    markdown: bool,

    /// Output file (default: stdout).
    #[arg(short = 'o', long = "output", env = "DECKLE_OUTPUT")]
    output: Option<PathBuf>,

    /// Override the article or book title.
    #[arg(long, env = "DECKLE_TITLE")]
    title: Option<String>,

    /// EPUB cover style: collage, pattern or none.
    #[arg(long, env = "DECKLE_COVER", default_value = "collage")]
    cover: CoverStyle,

    /// Max image width in pixels; height scales proportionally.
    #[arg(long, env = "DECKLE_MAX_WIDTH", default_value_t = 800,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_width: u32,

    /// JPEG quality (1–95).
    #[arg(long, env = "DECKLE_QUALITY", default_value_t = 60,
          value_parser = clap::value_parser!(u8).range(1..=95))]
    quality: u8,

    /// Convert images to grayscale.
    #[arg(long, env = "DECKLE_GRAYSCALE")]
    grayscale: bool,

    /// Per-request timeout (Go duration: 30s, 1m30s, 500ms).
    #[arg(long, env = "DECKLE_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    timeout: Duration,

    /// HTTP User-Agent header.
    #[arg(long, env = "DECKLE_USER_AGENT", default_value = deckle::config::DEFAULT_USER_AGENT)]
    user_agent: String,

    /// Parallel image fetches per article.
    #[arg(long, env = "DECKLE_CONCURRENCY", default_value_t = 5,
          value_parser = clap::value_parser!(u64).range(1..))]
    concurrency: u64,

    /// Max bytes per HTTP response (0 = unlimited).
    #[arg(long, env = "DECKLE_MAX_RESPONSE_SIZE",
          default_value_t = deckle::config::DEFAULT_MAX_RESPONSE_BYTES)]
    max_response_size: u64,

    /// Route all HTTP through this proxy URL.
    #[arg(long, env = "DECKLE_PROXY")]
    proxy: Option<String>,

    /// Suppress all output except errors.
    #[arg(short = 's', long, env = "DECKLE_SILENT")]
    silent: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short = 'v', long, env = "DECKLE_VERBOSE")]
    verbose: bool,

    /// Print a JSON run summary on stderr when done.
    #[arg(long, env = "DECKLE_JSON")]
    json: bool,
}

impl Cli {
    fn format(&self) -> OutputFormat {
        if self.epub {
            OutputFormat::Epub
        } else if self.markdown {
            OutputFormat::Markdown
        } else {
            OutputFormat::Html
        }
    }
}

/// Rewrite Go-style `-flag` / `-flag=value` to `--flag` so clap accepts
/// them. Single-letter flags and everything after `--` are left alone.
fn normalize_args<I: IntoIterator<Item = String>>(args: I) -> Vec<String> {
    let mut out = Vec::new();
    let mut passthrough = false;
    for (i, arg) in args.into_iter().enumerate() {
        if i == 0 || passthrough {
            out.push(arg);
            continue;
        }
        if arg == "--" {
            passthrough = true;
            out.push(arg);
            continue;
        }
        let name = arg.split('=').next().unwrap_or("");
        let is_go_long = arg.starts_with('-')
            && !arg.starts_with("--")
            && name.len() > 2
            && name[1..].chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if is_go_long {
            out.push(format!("-{arg}"));
        } else {
            out.push(arg);
        }
    }
    out
}

/// Parse a Go duration: a sequence of decimal numbers with units
/// `ns`, `us`/`µs`, `ms`, `s`, `m`, `h`, e.g. `1h15m30.5s`. `0` is allowed.
fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err("empty duration".into());
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err(format!("invalid duration {s:?}"));
        }
        let value: f64 = rest[..num_len]
            .parse()
            .map_err(|_| format!("invalid duration {s:?}"))?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let secs_per_unit = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" | "μs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            "" => return Err(format!("missing unit in duration {s:?}")),
            other => return Err(format!("unknown unit {other:?} in duration {s:?}")),
        };
        rest = &rest[unit_len..];
        total += value * secs_per_unit;
    }
    Duration::try_from_secs_f64(total).map_err(|e| format!("invalid duration {s:?}: {e}"))
}

/// Whole seconds for the HTTP client, rounded up, at least one.
fn timeout_secs(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

// ── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse_from(normalize_args(std::env::args()));
    let format = cli.format();

    // ── Logging setup ────────────────────────────────────────────────────
    // The status line replaces INFO logs while it is visible.
    let show_progress = cli.output.is_some() && !cli.silent && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.silent || show_progress {
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

    if format == OutputFormat::Epub && cli.output.is_none() {
        bail!("-epub requires -o output.epub");
    }

    let status = show_progress.then(StatusLine::new);
    let config = build_config(&cli, format, status.clone().map(|s| s as SharedProgress))?;

    let result = match cli.output {
        Some(ref path) => convert_to_file(&cli.inputs, path, &config).await,
        None => convert(&cli.inputs, &config).await,
    };
    let output = match result {
        Ok(o) => o,
        Err(e) => {
            if let Some(ref s) = status {
                s.abandon();
            }
            return Err(e.into());
        }
    };

    match cli.output {
        Some(ref path) => {
            let done = match format {
                OutputFormat::Html => format!("\u{2713} {}", path.display()),
                _ => format!(
                    "\u{2713} {} ({} articles)",
                    path.display(),
                    output.stats.converted_articles
                ),
            };
            match status {
                Some(ref s) => s.finish(done),
                None if !cli.silent => eprintln!("{done}"),
                None => {}
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(&output.bytes)
                .context("Failed to write to stdout")?;
            handle.flush().context("Failed to write to stdout")?;
        }
    }

    if cli.json {
        let summary = serde_json::json!({
            "title": output.title,
            "stats": output.stats,
            "failures": output.failures,
        });
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    }

    Ok(())
}

/// Map CLI args to `DeckleConfig`.
fn build_config(
    cli: &Cli,
    format: OutputFormat,
    progress: Option<SharedProgress>,
) -> Result<DeckleConfig> {
    let mut builder = DeckleConfig::builder()
        .format(format)
        .cover(cli.cover)
        .max_width(cli.max_width)
        .quality(cli.quality)
        .grayscale(cli.grayscale)
        .timeout_secs(timeout_secs(cli.timeout))
        .user_agent(cli.user_agent.clone())
        .concurrency(usize::try_from(cli.concurrency).unwrap_or(usize::MAX))
        .max_response_bytes(cli.max_response_size);

    if let Some(ref title) = cli.title {
        builder = builder.title(title.clone());
    }
    if let Some(ref proxy) = cli.proxy {
        builder = builder.proxy(proxy.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
