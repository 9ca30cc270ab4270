//! Progress-callback trait for per-article and per-image events.
//!
//! Inject an [`Arc<dyn ProgressCallback>`] via
//! [`crate::config::DeckleConfigBuilder::progress_callback`] to receive
//! events as the run fetches articles and optimises their images.
//!
//! The library does not draw anything itself. The `deckle` binary renders
//! these events as a single status line; other hosts can forward them to a
//! channel, a log, or a UI.
//!
//! # Example
//!
//! ```rust
//! use deckle::{DeckleConfig, ProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     images: AtomicUsize,
//! }
//!
//! impl ProgressCallback for CountingCallback {
//!     fn on_image_done(&self) {
//!         self.images.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { images: AtomicUsize::new(0) });
//!
//! let config = DeckleConfig::builder()
//!     .progress_callback(counter as Arc<dyn ProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes a reading list.
///
/// Implementations must be `Send + Sync`: articles and image fetches run
/// concurrently, so every method may be called from several tasks at once.
/// All methods have default no-op implementations.
pub trait ProgressCallback: Send + Sync {
    /// Called once before the first article is fetched.
    fn on_run_start(&self, total_articles: usize) {
        let _ = total_articles;
    }

    /// Called just before an article's page is fetched.
    ///
    /// * `index` — 1-indexed position in the reading list
    fn on_article_start(&self, index: usize, url: &str) {
        let _ = (index, url);
    }

    /// Called when an article made it through the whole pipeline.
    fn on_article_complete(&self, index: usize, title: &str) {
        let _ = (index, title);
    }

    /// Called when an article was skipped.
    fn on_article_failed(&self, index: usize, url: &str, error: &str) {
        let _ = (index, url, error);
    }

    /// Called when the image pipeline discovers `count` more images to handle.
    fn on_images_found(&self, count: usize) {
        let _ = count;
    }

    /// Called once per image after it was fetched or optimised (or given up on).
    fn on_image_done(&self) {}

    /// Called once after every article has been attempted.
    fn on_run_complete(&self, succeeded: usize, total: usize) {
        let _ = (succeeded, total);
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl ProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::DeckleConfig`].
pub type SharedProgress = Arc<dyn ProgressCallback>;

/// Compact display form of a URL: host + path, no scheme, no trailing slash,
/// truncated to 60 characters.
pub fn short_url(raw: &str) -> String {
    let display = match reqwest::Url::parse(raw) {
        Ok(u) => format!("{}{}", u.host_str().unwrap_or_default(), u.path()),
        Err(_) => return raw.to_string(),
    };
    let display = display.strip_suffix('/').unwrap_or(&display);
    if display.chars().count() > 60 {
        let head: String = display.chars().take(57).collect();
        format!("{head}...")
    } else {
        display.to_string()
    }
}
