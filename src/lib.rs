//! # deckle
//!
//! Turn a reading list of article URLs into a clean EPUB 3, Markdown or
//! standalone HTML file for e-readers.
//!
//! ## Why this crate?
//!
//! Web pages are full of scripts, trackers, lazy-loaded images and markup
//! that strict e-reader engines reject. deckle keeps only the article:
//! readability extraction, images downloaded and shrunk to e-ink size, and
//! an XHTML sanitizer whose output always passes an EPUB validator.
//!
//! ## Pipeline Overview
//!
//! ```text
//! URL
//!  │
//!  ├─ 1. Fetch     pooled HTTP client, size cap, SSRF guard
//!  ├─ 2. Extract   readability (dom_smoothie, spawn_blocking)
//!  ├─ 3. Images    fetch, embed, collapse <picture>, re-encode as JPEG
//!  ├─ 4. Headings  title <h1>, byline, shifted outline
//!  └─ 5. Output    EPUB (sanitized XHTML + cover) | Markdown | HTML
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use deckle::{convert_to_file, CoverStyle, DeckleConfig, OutputFormat};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DeckleConfig::builder()
//!         .format(OutputFormat::Epub)
//!         .cover(CoverStyle::Pattern)
//!         .grayscale(true)
//!         .build()?;
//!     let out = convert_to_file(&["reading.txt"], "weekend.epub", &config).await?;
//!     eprintln!(
//!         "{} of {} articles",
//!         out.stats.converted_articles, out.stats.total_articles
//!     );
//!     Ok(())
//! }
//! ```
//!
//! The sanitizer is usable on its own:
//!
//! ```rust
//! let xhtml = deckle::sanitize("<p>Hello<br>world<script>x()</script></p>");
//! assert_eq!(xhtml, "<p>Hello<br/>world</p>");
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `deckle` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! deckle = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod dom;
pub mod epub;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod sanitize;
pub mod stream;
pub mod templates;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CoverStyle, DeckleConfig, DeckleConfigBuilder, OptimizeOptions, OutputFormat};
pub use convert::{collect_urls, convert, convert_sync, convert_to_file, process_url, ReadingList};
pub use epub::EpubWriter;
pub use error::{ArticleError, DeckleError};
pub use output::{Article, ConversionOutput, ConversionStats, SourceInfo};
pub use progress::{NoopProgressCallback, ProgressCallback, SharedProgress};
pub use sanitize::sanitize;
pub use stream::{article_stream, ArticleStream};
