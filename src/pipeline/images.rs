//! Article image pipeline: make every image self-contained and e-ink sized.
//!
//! ## Stages
//!
//! ```text
//! promote lazy src ──▶ fetch & embed ──▶ collapse <picture> ──▶ optimize data: URIs
//! ```
//!
//! 1. `data-src` / `data-srcset` become `src` / `srcset`; SVG placeholders
//!    sitting next to a `data-src` are dropped.
//! 2. Every `<img src="http(s)://…">` is downloaded (bounded concurrency)
//!    and inlined as a `data:` URI. Skipped in Markdown mode.
//! 3. Each `<picture>` becomes a single `<img>`: the first embedded source
//!    that optimizes, else the first decodable one, else the widest
//!    external `srcset` candidate.
//! 4. Every remaining `<img src="data:…">` is re-encoded as JPEG.
//!
//! The rewrite is regex based and works on the raw fragment; the sanitizer
//! runs afterwards and removes whatever slipped through. Results are always
//! substituted back in input order. Per-image failures are logged and the
//! original markup is kept.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{info, warn};

use super::fetch::{human_size, Fetcher};
use super::optimize::{decode_base64, optimize_data_uri, optimize_image, OptimizeStats};
use crate::config::OptimizeOptions;
use crate::progress::SharedProgress;

// ── Patterns ─────────────────────────────────────────────────────────────

static RE_DATA_URI_IMG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(<img\b[^>]*?\bsrc\s*=\s*")data:([^;]+);base64,([^"]*)(")"#).unwrap()
});
static RE_PICTURE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<picture\b[^>]*>.*?</picture>").unwrap());
static RE_DATA_URI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"data:([^;]+);base64,([^\s",]+)"#).unwrap());
static RE_SRCSET_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(https?://[^\s",]+)(?:\s+(\d+)w)?"#).unwrap());
static RE_ALT: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\balt\s*=\s*"([^"]*)""#).unwrap());
static RE_LAZY_SRC: Lazy<Regex> = Lazy::new(|| Regex::new(r"(<img\b[^>]*?)\bdata-src=").unwrap());
static RE_LAZY_SRCSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(<img\b[^>]*?)\bdata-srcset=").unwrap());
static RE_LAZY_IMG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<img\b[^>]*\bdata-src\s*=[^>]*>").unwrap());
static RE_SVG_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bsrc\s*=\s*"data:image/svg\+xml;base64,[^"]*""#).unwrap()
});
static RE_EXTERNAL_IMG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(<img\b[^>]*?\bsrc\s*=\s*")(https?://[^"]+)(")"#).unwrap());

/// Everything the image stages need from the run.
#[derive(Clone)]
pub struct ImageContext {
    pub fetcher: Fetcher,
    pub opts: OptimizeOptions,
    /// Parallel image fetches / encodes.
    pub concurrency: usize,
    pub progress: SharedProgress,
}

// ── Entry point ──────────────────────────────────────────────────────────

/// Run all image stages over an article fragment.
pub async fn process_article_images(html: &str, ctx: &ImageContext) -> String {
    let mut stats = OptimizeStats::default();

    let mut html = promote_lazy_src(html);
    if !ctx.opts.skip_image_fetch {
        html = fetch_and_embed(&html, ctx).await;
    }
    html = collapse_pictures(&html, ctx, &mut stats).await;
    html = optimize_embedded(&html, ctx, &mut stats).await;

    if stats.count > 0 {
        info!(
            "Optimized {} images: {} → {}",
            stats.count,
            human_size(stats.original_bytes),
            human_size(stats.optimized_bytes)
        );
    } else {
        info!("No optimizable images found.");
    }
    html
}

// ── Stage 1: lazy loading ────────────────────────────────────────────────

/// Rewrite `data-src`/`data-srcset` to `src`/`srcset`, dropping SVG
/// placeholder `src` attributes on the same tags.
pub fn promote_lazy_src(html: &str) -> String {
    let without_placeholders = RE_LAZY_IMG.replace_all(html, |caps: &Captures| {
        RE_SVG_PLACEHOLDER.replace_all(&caps[0], "").into_owned()
    });
    let promoted = RE_LAZY_SRC.replace_all(&without_placeholders, "${1}src=");
    RE_LAZY_SRCSET
        .replace_all(&promoted, "${1}srcset=")
        .into_owned()
}

// ── Stage 2: external images ─────────────────────────────────────────────

/// Download every external `<img src>` and inline it as a `data:` URI.
pub async fn fetch_and_embed(html: &str, ctx: &ImageContext) -> String {
    let matches: Vec<(usize, usize, String, String)> = RE_EXTERNAL_IMG
        .captures_iter(html)
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some((whole.start(), whole.end(), c[1].to_string(), c[2].to_string()))
        })
        .collect();
    if matches.is_empty() {
        return html.to_string();
    }
    ctx.progress.on_images_found(matches.len());

    let urls: Vec<String> = matches.iter().map(|m| m.3.clone()).collect();
    let results: Vec<Option<String>> = stream::iter(urls)
        .map(|url| async move {
            let embedded = match ctx.fetcher.fetch_image(&url).await {
                Ok(img) => Some(format!("data:{};base64,{}", img.mime, STANDARD.encode(&img.bytes))),
                Err(e) => {
                    warn!("could not fetch {url}: {e}");
                    None
                }
            };
            ctx.progress.on_image_done();
            embedded
        })
        .buffered(ctx.concurrency.max(1))
        .collect()
        .await;

    let mut out = String::with_capacity(html.len());
    let mut prev = 0;
    let mut fetched = 0;
    for ((start, end, prefix, _), result) in matches.iter().zip(results) {
        out.push_str(&html[prev..*start]);
        match result {
            Some(uri) => {
                out.push_str(prefix);
                out.push_str(&uri);
                out.push('"');
                fetched += 1;
            }
            None => out.push_str(&html[*start..*end]),
        }
        prev = *end;
    }
    out.push_str(&html[prev..]);

    if fetched > 0 {
        info!("Fetched and embedded {fetched} external images");
    }
    out
}

// ── Stage 3: <picture> ───────────────────────────────────────────────────

async fn collapse_pictures(html: &str, ctx: &ImageContext, stats: &mut OptimizeStats) -> String {
    let spans: Vec<(usize, usize)> = RE_PICTURE
        .find_iter(html)
        .map(|m| (m.start(), m.end()))
        .collect();
    if spans.is_empty() {
        return html.to_string();
    }
    ctx.progress.on_images_found(spans.len());

    let mut out = String::with_capacity(html.len());
    let mut prev = 0;
    for (start, end) in spans {
        out.push_str(&html[prev..start]);
        let picture = &html[start..end];
        let replacement = collapse_picture(picture, ctx, stats).await;
        out.push_str(replacement.as_deref().unwrap_or(picture));
        ctx.progress.on_image_done();
        prev = end;
    }
    out.push_str(&html[prev..]);
    out
}

/// Replacement `<img>` for one `<picture>`, or `None` to keep it as is.
async fn collapse_picture(
    picture: &str,
    ctx: &ImageContext,
    stats: &mut OptimizeStats,
) -> Option<String> {
    let alt = RE_ALT
        .captures(picture)
        .map(|c| c[1].to_string())
        .unwrap_or_default();
    let img = |src: &str| format!(r#"<img src="{src}" alt="{alt}">"#);

    let uris: Vec<(String, String)> = RE_DATA_URI
        .captures_iter(picture)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect();

    for (mime, b64) in &uris {
        let (uri, delta) = optimize_blocking(mime.clone(), b64.clone(), ctx.opts).await;
        stats.merge(delta);
        if let Some(uri) = uri {
            return Some(img(&uri));
        }
    }
    // Nothing optimizable: keep the first source that decodes.
    for (mime, b64) in &uris {
        if let Ok(raw) = decode_base64(b64) {
            return Some(img(&format!("data:{mime};base64,{}", STANDARD.encode(raw))));
        }
    }

    if ctx.opts.skip_image_fetch {
        return None;
    }
    let url = pick_best_srcset_url(picture)?;
    let fetched = match ctx.fetcher.fetch_image(&url).await {
        Ok(f) => f,
        Err(e) => {
            warn!("could not fetch picture image {url}: {e}");
            return None;
        }
    };

    let opts = ctx.opts;
    let mime = fetched.mime.clone();
    let bytes = fetched.bytes;
    let result = tokio::task::spawn_blocking(move || {
        let optimized = optimize_image(&bytes, &mime, &opts);
        (optimized, bytes)
    })
    .await;
    match result {
        Ok((Ok(Some(o)), bytes)) => {
            stats.record(bytes.len(), o.jpeg_len);
            Some(img(&o.data_uri))
        }
        Ok((other, bytes)) => {
            if let Err(e) = other {
                warn!("{e}");
            }
            Some(img(&format!(
                "data:{};base64,{}",
                fetched.mime,
                STANDARD.encode(bytes)
            )))
        }
        Err(e) => {
            warn!("image task failed: {e}");
            None
        }
    }
}

/// Best external candidate in a `<picture>`: the widest `Nw` descriptor,
/// skipping `/format:webp/` variants unless nothing else exists. Ties keep
/// the first candidate.
pub fn pick_best_srcset_url(picture: &str) -> Option<String> {
    let candidates: Vec<(String, u64)> = RE_SRCSET_URL
        .captures_iter(picture)
        .map(|c| {
            let width = c.get(2).and_then(|w| w.as_str().parse().ok()).unwrap_or(0);
            (c[1].to_string(), width)
        })
        .collect();

    let widest = |allow_webp: bool| {
        let mut best: Option<&(String, u64)> = None;
        for cand in &candidates {
            if !allow_webp && cand.0.contains("/format:webp/") {
                continue;
            }
            if best.is_none_or(|b| cand.1 > b.1) {
                best = Some(cand);
            }
        }
        best.map(|b| b.0.clone())
    };
    widest(false).or_else(|| widest(true))
}

// ── Stage 4: standalone data URIs ────────────────────────────────────────

async fn optimize_embedded(
    html: &str,
    ctx: &ImageContext,
    stats: &mut OptimizeStats,
) -> String {
    let matches: Vec<(usize, usize, String, String, String)> = RE_DATA_URI_IMG
        .captures_iter(html)
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some((
                whole.start(),
                whole.end(),
                c[1].to_string(),
                c[2].to_string(),
                c[3].to_string(),
            ))
        })
        .collect();
    if matches.is_empty() {
        return html.to_string();
    }
    ctx.progress.on_images_found(matches.len());

    let jobs: Vec<(String, String)> = matches
        .iter()
        .map(|m| (m.3.clone(), m.4.clone()))
        .collect();
    let opts = ctx.opts;
    let results: Vec<(Option<String>, OptimizeStats)> = stream::iter(jobs)
        .map(|(mime, b64)| async move {
            let r = optimize_blocking(mime, b64, opts).await;
            ctx.progress.on_image_done();
            r
        })
        .buffered(ctx.concurrency.max(1))
        .collect()
        .await;

    let mut out = String::with_capacity(html.len());
    let mut prev = 0;
    for ((start, end, prefix, _, _), (uri, delta)) in matches.iter().zip(results) {
        stats.merge(delta);
        out.push_str(&html[prev..*start]);
        match uri {
            Some(uri) => {
                out.push_str(prefix);
                out.push_str(&uri);
                out.push('"');
            }
            None => out.push_str(&html[*start..*end]),
        }
        prev = *end;
    }
    out.push_str(&html[prev..]);
    out
}

/// Decode + optimize on the blocking pool.
async fn optimize_blocking(
    mime: String,
    b64: String,
    opts: OptimizeOptions,
) -> (Option<String>, OptimizeStats) {
    tokio::task::spawn_blocking(move || {
        let mut stats = OptimizeStats::default();
        let uri = optimize_data_uri(&mime, &b64, &opts, &mut stats);
        (uri, stats)
    })
    .await
    .unwrap_or_else(|e| {
        warn!("image task failed: {e}");
        (None, OptimizeStats::default())
    })
}
