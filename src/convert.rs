//! Run entry points: a reading list in, one rendered document out.
//!
//! ## Flow
//!
//! ```text
//! args ──▶ collect_urls ──▶ process_url × N ──▶ render (epub | markdown | html)
//!          (.txt lists)     (buffered, in order)
//! ```
//!
//! Failures of single articles are logged and skipped; the run only fails
//! when nothing converted, the arguments do not fit the format, or the
//! output cannot be written. Use [`crate::stream::article_stream`] to get
//! articles one by one instead.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::config::{DeckleConfig, OutputFormat};
use crate::epub::EpubWriter;
use crate::error::{ArticleError, DeckleError};
use crate::output::{Article, ConversionOutput, ConversionStats, SourceInfo};
use crate::pipeline::extract::extract_article;
use crate::pipeline::fetch::{human_size, Fetcher};
use crate::pipeline::headings::{clean_title, extract_title, normalize_headings, UNTITLED};
use crate::pipeline::images::{process_article_images, promote_lazy_src, ImageContext};
use crate::pipeline::markdown::articles_to_markdown;
use crate::progress::{NoopProgressCallback, SharedProgress};

/// Title used when nothing better is known.
const FALLBACK_BOOK_TITLE: &str = "Articles";

/// URLs gathered from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadingList {
    pub urls: Vec<String>,
    /// Basename (without `.txt`) of the first URL file, if any.
    pub name: Option<String>,
}

// ── Inputs ───────────────────────────────────────────────────────────────

/// Read a URL file: one URL per line, blank lines and `#` comments skipped.
pub fn read_url_file(path: &Path) -> Result<Vec<String>, DeckleError> {
    let text = std::fs::read_to_string(path).map_err(|e| DeckleError::InvalidInput {
        input: path.display().to_string(),
        reason: format!("reading URL file: {e}"),
    })?;
    Ok(parse_url_list(&text))
}

fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Expand arguments into URLs. Arguments ending in `.txt` are URL files.
pub fn collect_urls<S: AsRef<str>>(args: &[S]) -> Result<ReadingList, DeckleError> {
    let mut list = ReadingList::default();
    for arg in args {
        let arg = arg.as_ref();
        if arg.ends_with(".txt") {
            let path = Path::new(arg);
            list.urls.extend(read_url_file(path)?);
            if list.name.is_none() {
                list.name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .filter(|s| !s.is_empty());
            }
        } else {
            list.urls.push(arg.to_string());
        }
    }
    if list.urls.is_empty() {
        return Err(DeckleError::InvalidInput {
            input: args
                .iter()
                .map(|a| a.as_ref())
                .collect::<Vec<_>>()
                .join(" "),
            reason: "no URLs provided".into(),
        });
    }
    Ok(list)
}

/// Book title: explicit override, then the URL file name, then the first
/// article's title ("… & more" for several), then the output file stem.
pub fn derive_book_title(
    title_override: Option<&str>,
    list_name: Option<&str>,
    articles: &[Article],
    output_path: Option<&Path>,
) -> String {
    let non_empty = |s: &&str| !s.trim().is_empty();

    if let Some(t) = title_override.filter(non_empty) {
        return t.trim().to_string();
    }
    if let Some(n) = list_name.filter(non_empty) {
        return n.to_string();
    }
    if let Some(first) = articles.first() {
        let t = first.title.trim();
        if !t.is_empty() && t != UNTITLED {
            return if articles.len() > 1 {
                format!("{t} & more")
            } else {
                t.to_string()
            };
        }
    }
    output_path
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_BOOK_TITLE.to_string())
}

/// Reject argument combinations the format cannot handle.
pub fn check_format_args(format: OutputFormat, url_count: usize) -> Result<(), DeckleError> {
    if format == OutputFormat::Html && url_count != 1 {
        return Err(DeckleError::InvalidInput {
            input: format!("{url_count} URLs"),
            reason: "HTML output takes exactly one URL; use -epub or -markdown for several".into(),
        });
    }
    Ok(())
}

// ── Per-article pipeline ─────────────────────────────────────────────────

/// Shared HTTP client and image settings for a run.
pub fn image_context(config: &DeckleConfig) -> Result<ImageContext, DeckleError> {
    Ok(ImageContext {
        fetcher: Fetcher::new(config)?,
        opts: config.effective_optimize(),
        concurrency: config.concurrency,
        progress: progress_of(config),
    })
}

fn progress_of(config: &DeckleConfig) -> SharedProgress {
    config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback))
}

/// Title override that applies to individual articles.
///
/// EPUB runs use `-title` for the book instead.
pub(crate) fn article_title_override(config: &DeckleConfig, url_count: usize) -> Option<String> {
    if config.format == OutputFormat::Epub || url_count != 1 {
        return None;
    }
    config
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

/// Fetch one URL and run it through extraction, images and headings.
///
/// `index` is the 1-based position in the reading list.
pub async fn process_url(
    index: usize,
    url: &str,
    title_override: Option<&str>,
    ctx: &ImageContext,
) -> Result<Article, DeckleError> {
    let page = ctx.fetcher.fetch_html(url).await?;
    let html = promote_lazy_src(&page.html);
    let page_url = page.url.to_string();

    let extracted = tokio::task::spawn_blocking(move || extract_article(&html, &page_url))
        .await
        .map_err(|e| DeckleError::ExtractionFailure {
            url: url.to_string(),
            reason: format!("extraction task failed: {e}"),
        })??;
    info!("Title: {}", extracted.title);

    let body = process_article_images(&extracted.content, ctx).await;

    let title = match title_override.filter(|t| !t.trim().is_empty()) {
        Some(t) => clean_title(t),
        None if !extracted.title.is_empty() => clean_title(&extracted.title),
        None => extract_title(&body),
    };

    let source = SourceInfo {
        url: url.to_string(),
        byline: extracted.byline,
        site_name: extracted.site_name,
        published: extracted.published,
    };
    let html = normalize_headings(&body, Some(&title), &source);

    Ok(Article {
        index,
        title,
        html,
        source,
    })
}

/// Process every URL with bounded concurrency, keeping reading-list order.
///
/// A single-URL run returns that URL's error directly; longer runs log and
/// skip failures and only fail when none converted.
pub async fn fetch_articles(
    urls: &[String],
    config: &DeckleConfig,
) -> Result<(Vec<Article>, Vec<ArticleError>), DeckleError> {
    let ctx = image_context(config)?;
    let progress = progress_of(config);
    let total = urls.len();
    let title_override = article_title_override(config, total);

    progress.on_run_start(total);

    let results: Vec<(usize, &String, Result<Article, DeckleError>)> =
        stream::iter(urls.iter().enumerate())
            .map(|(i, url)| {
                let ctx = &ctx;
                let progress = &progress;
                let title_override = title_override.as_deref();
                async move {
                    let index = i + 1;
                    info!("[{index}/{total}] {url}");
                    progress.on_article_start(index, url);
                    let result = process_url(index, url, title_override, ctx).await;
                    match &result {
                        Ok(article) => progress.on_article_complete(index, &article.title),
                        Err(e) => {
                            warn!("{url}: {e} (skipping)");
                            progress.on_article_failed(index, url, &e.to_string());
                        }
                    }
                    (index, url, result)
                }
            })
            .buffered(config.article_concurrency)
            .collect()
            .await;

    let mut articles = Vec::new();
    let mut failures = Vec::new();
    let mut single_error = None;
    for (index, url, result) in results {
        match result {
            Ok(a) => articles.push(a),
            Err(e) => {
                failures.push(ArticleError::new(index, url.as_str(), &e));
                single_error = Some(e);
            }
        }
    }

    progress.on_run_complete(articles.len(), total);

    if articles.is_empty() {
        return Err(match single_error {
            Some(e) if total == 1 => e,
            _ => DeckleError::NoArticlesConverted { total },
        });
    }
    Ok((articles, failures))
}

// ── Rendering ────────────────────────────────────────────────────────────

/// Render converted articles in the configured format.
pub async fn render(
    format: OutputFormat,
    articles: &[Article],
    title: &str,
    config: &DeckleConfig,
) -> Result<Vec<u8>, DeckleError> {
    match format {
        OutputFormat::Html => articles
            .first()
            .map(|a| a.html.clone().into_bytes())
            .ok_or(DeckleError::NoArticlesConverted { total: 0 }),
        OutputFormat::Markdown => Ok(articles_to_markdown(articles)?.into_bytes()),
        OutputFormat::Epub => {
            info!("Building epub from {} articles...", articles.len());
            let writer = EpubWriter::new(title).cover(config.cover);
            let articles = articles.to_vec();
            tokio::task::spawn_blocking(move || writer.build(&articles))
                .await
                .map_err(|e| DeckleError::PackagingFailure {
                    reason: format!("packaging task failed: {e}"),
                })?
        }
    }
}

async fn run(
    inputs: &[String],
    config: &DeckleConfig,
    output_path: Option<&Path>,
) -> Result<ConversionOutput, DeckleError> {
    let start = Instant::now();
    let list = collect_urls(inputs)?;
    check_format_args(config.format, list.urls.len())?;
    info!(
        "Starting {} run: {} URL(s)",
        config.format,
        list.urls.len()
    );

    let (articles, failures) = fetch_articles(&list.urls, config).await?;

    let title = match config.format {
        OutputFormat::Html => articles
            .first()
            .map(|a| a.title.clone())
            .unwrap_or_default(),
        _ => derive_book_title(
            config.title.as_deref(),
            list.name.as_deref(),
            &articles,
            output_path,
        ),
    };

    let bytes = render(config.format, &articles, &title, config).await?;

    let stats = ConversionStats {
        total_articles: list.urls.len(),
        converted_articles: articles.len(),
        failed_articles: failures.len(),
        output_bytes: bytes.len(),
        total_duration_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Converted {}/{} articles, {} in {}ms",
        stats.converted_articles,
        stats.total_articles,
        human_size(stats.output_bytes as u64),
        stats.total_duration_ms
    );

    Ok(ConversionOutput {
        articles,
        failures,
        title,
        bytes,
        stats,
    })
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Convert a reading list into the configured format, in memory.
///
/// `inputs` are URLs or paths to `.txt` URL files.
///
/// # Example
/// ```rust,no_run
/// use deckle::{convert, DeckleConfig, OutputFormat};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = DeckleConfig::builder().format(OutputFormat::Markdown).build()?;
/// let out = convert(&["https://example.com/post"], &config).await?;
/// println!("{}", String::from_utf8_lossy(&out.bytes));
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// Fatal only: no URLs, a format/argument mismatch, nothing converted, or
/// the renderer failing. Skipped articles are listed in
/// [`ConversionOutput::failures`].
pub async fn convert<S: AsRef<str>>(
    inputs: &[S],
    config: &DeckleConfig,
) -> Result<ConversionOutput, DeckleError> {
    let inputs: Vec<String> = inputs.iter().map(|s| s.as_ref().to_string()).collect();
    run(&inputs, config, None).await
}

/// Convert and write the result to `output_path`.
///
/// The file is written to a temporary sibling and renamed into place, so a
/// failed run never leaves a partial file behind.
pub async fn convert_to_file<S: AsRef<str>>(
    inputs: &[S],
    output_path: impl AsRef<Path>,
    config: &DeckleConfig,
) -> Result<ConversionOutput, DeckleError> {
    let path = output_path.as_ref();
    let inputs: Vec<String> = inputs.iter().map(|s| s.as_ref().to_string()).collect();
    let output = run(&inputs, config, Some(path)).await?;
    write_atomic(path, &output.bytes)?;
    debug!(path = %path.display(), bytes = output.bytes.len(), "output written");
    Ok(output)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync<S: AsRef<str>>(
    inputs: &[S],
    config: &DeckleConfig,
) -> Result<ConversionOutput, DeckleError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DeckleError::InvalidConfig(format!("Failed to create tokio runtime: {e}")))?
        .block_on(convert(inputs, config))
}

/// Write `bytes` to `path` via a temp file in the same directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DeckleError> {
    let write_err = |source: std::io::Error| DeckleError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
