//! Configuration types for a deckle run.
//!
//! All run-wide behaviour is controlled through [`DeckleConfig`], built via
//! its [`DeckleConfigBuilder`]. The HTTP settings (size cap, proxy, timeout,
//! user agent) live here rather than in process globals, so two runs with
//! different settings can share a process and tests can run in parallel.

use crate::error::DeckleError;
use crate::progress::SharedProgress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User agent sent when `-user-agent` is not given.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:133.0) Gecko/20100101 Firefox/133.0";

/// Default per-response body cap: 128 MiB.
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 128 * 1024 * 1024;

/// Environment switch that disables the SSRF guard (local test servers).
pub const ALLOW_LOCAL_ENV: &str = "DECKLE_TEST_ALLOW_LOCAL";

/// Image optimisation knobs. Immutable for the duration of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeOptions {
    /// Images wider than this are downscaled to it. Never upscaled. Default: 800.
    pub max_width: u32,
    /// JPEG quality, 1–95. Default: 60.
    pub quality: u8,
    /// Convert to 8-bit grayscale before encoding. Default: false.
    pub grayscale: bool,
    /// Leave external `<img src="http…">` alone (Markdown output). Default: false.
    pub skip_image_fetch: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            max_width: 800,
            quality: 60,
            grayscale: false,
            skip_image_fetch: false,
        }
    }
}

/// Configuration for a deckle run.
///
/// Built via [`DeckleConfig::builder()`] or using [`DeckleConfig::default()`].
///
/// # Example
/// ```rust
/// use deckle::{DeckleConfig, OutputFormat};
///
/// let config = DeckleConfig::builder()
///     .format(OutputFormat::Epub)
///     .max_width(600)
///     .grayscale(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.optimize.max_width, 600);
/// ```
#[derive(Clone)]
pub struct DeckleConfig {
    /// Image optimisation options.
    pub optimize: OptimizeOptions,

    /// Per-request timeout in seconds. Default: 30.
    pub timeout_secs: u64,

    /// `User-Agent` header for every request.
    pub user_agent: String,

    /// Parallel image fetches per article. Default: 5.
    pub concurrency: usize,

    /// Articles processed at once in multi-URL runs. Default: 5.
    pub article_concurrency: usize,

    /// Per-response body cap in bytes; 0 means unlimited. Default: 128 MiB.
    pub max_response_bytes: u64,

    /// Route all HTTP through this proxy URL.
    pub proxy: Option<String>,

    /// Disable the SSRF guard. Defaults to `DECKLE_TEST_ALLOW_LOCAL=1`.
    pub allow_private_network: bool,

    /// What to produce. Default: [`OutputFormat::Html`].
    pub format: OutputFormat,

    /// Cover style for EPUB output. Default: [`CoverStyle::Collage`].
    pub cover: CoverStyle,

    /// Override for the article title (single URL) or book title (EPUB).
    pub title: Option<String>,

    /// Receives per-article and per-image events.
    pub progress_callback: Option<SharedProgress>,
}

impl Default for DeckleConfig {
    fn default() -> Self {
        Self {
            optimize: OptimizeOptions::default(),
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            concurrency: 5,
            article_concurrency: 5,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            proxy: None,
            allow_private_network: std::env::var(ALLOW_LOCAL_ENV).is_ok_and(|v| v == "1"),
            format: OutputFormat::default(),
            cover: CoverStyle::default(),
            title: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DeckleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeckleConfig")
            .field("optimize", &self.optimize)
            .field("timeout_secs", &self.timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("concurrency", &self.concurrency)
            .field("article_concurrency", &self.article_concurrency)
            .field("max_response_bytes", &self.max_response_bytes)
            .field("proxy", &self.proxy)
            .field("allow_private_network", &self.allow_private_network)
            .field("format", &self.format)
            .field("cover", &self.cover)
            .field("title", &self.title)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ProgressCallback>"),
            )
            .finish()
    }
}

impl DeckleConfig {
    /// Create a new builder for `DeckleConfig`.
    pub fn builder() -> DeckleConfigBuilder {
        DeckleConfigBuilder {
            config: Self::default(),
        }
    }

    /// Options actually used by the image pipeline for this run.
    ///
    /// Markdown output keeps remote images as links, so fetching is skipped.
    pub fn effective_optimize(&self) -> OptimizeOptions {
        let mut opts = self.optimize;
        if self.format == OutputFormat::Markdown {
            opts.skip_image_fetch = true;
        }
        opts
    }
}

/// Builder for [`DeckleConfig`].
#[derive(Debug)]
pub struct DeckleConfigBuilder {
    config: DeckleConfig,
}

impl DeckleConfigBuilder {
    pub fn max_width(mut self, px: u32) -> Self {
        self.config.optimize.max_width = px.max(1);
        self
    }

    pub fn quality(mut self, q: u8) -> Self {
        self.config.optimize.quality = q.clamp(1, 95);
        self
    }

    pub fn grayscale(mut self, v: bool) -> Self {
        self.config.optimize.grayscale = v;
        self
    }

    pub fn skip_image_fetch(mut self, v: bool) -> Self {
        self.config.optimize.skip_image_fetch = v;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn article_concurrency(mut self, n: usize) -> Self {
        self.config.article_concurrency = n.max(1);
        self
    }

    pub fn max_response_bytes(mut self, n: u64) -> Self {
        self.config.max_response_bytes = n;
        self
    }

    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.config.proxy = Some(url.into());
        self
    }

    pub fn allow_private_network(mut self, v: bool) -> Self {
        self.config.allow_private_network = v;
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn cover(mut self, style: CoverStyle) -> Self {
        self.config.cover = style;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    pub fn progress_callback(mut self, cb: SharedProgress) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DeckleConfig, DeckleError> {
        let c = &self.config;
        if c.optimize.quality == 0 || c.optimize.quality > 95 {
            return Err(DeckleError::InvalidConfig(format!(
                "JPEG quality must be 1–95, got {}",
                c.optimize.quality
            )));
        }
        if c.timeout_secs == 0 {
            return Err(DeckleError::InvalidConfig(
                "Timeout must be at least 1s".into(),
            ));
        }
        if let Some(ref proxy) = c.proxy {
            if reqwest::Url::parse(proxy).is_err() {
                return Err(DeckleError::InvalidConfig(format!(
                    "Proxy '{proxy}' is not a valid URL"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Output container produced by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// EPUB 3 book with a contents page and cover. Requires an output path.
    Epub,
    /// CommonMark; images become alt-text placeholders.
    Markdown,
    /// A single self-contained HTML document (one URL only). (default)
    #[default]
    Html,
}

impl FromStr for OutputFormat {
    type Err = DeckleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "epub" => Ok(OutputFormat::Epub),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "html" => Ok(OutputFormat::Html),
            other => Err(DeckleError::UnknownFormat {
                format: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Epub => "epub",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Html => "html",
        })
    }
}

/// How the EPUB cover is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoverStyle {
    /// Tiles naming each article around the title band. (default)
    #[default]
    Collage,
    /// Deterministic circle grid seeded from the title.
    Pattern,
    /// No cover image.
    None,
}

impl FromStr for CoverStyle {
    type Err = DeckleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "collage" => Ok(CoverStyle::Collage),
            "pattern" => Ok(CoverStyle::Pattern),
            "none" => Ok(CoverStyle::None),
            other => Err(DeckleError::InvalidInput {
                input: other.to_string(),
                reason: "cover style must be collage, pattern or none".into(),
            }),
        }
    }
}
