//! Error types for the deckle library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DeckleError`] — **Fatal** for the operation that returned it: the run
//!   cannot proceed (bad flag combination, no article converted, output not
//!   writable), or a single fetch failed and the caller decides what that
//!   means. Returned as `Err(DeckleError)` from the `convert*` and `fetch*`
//!   functions.
//!
//! * [`ArticleError`] — **Non-fatal**: one URL of a reading list failed
//!   (network error, readability found nothing) but the other articles are
//!   fine. Stored in [`crate::output::ConversionOutput::failures`] so callers
//!   can report skipped articles rather than losing the whole book.
//!
//! Per-image failures never surface as errors at all: the image pipeline
//! logs a warning and keeps the original markup.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the deckle library.
#[derive(Debug, Error)]
pub enum DeckleError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A URL, file argument or flag combination is unusable.
    #[error("Invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    /// `-format` (or the library equivalent) named something we cannot write.
    #[error("unknown format '{format}'\nSupported formats: epub, markdown, html.")]
    UnknownFormat { format: String },

    // ── Network errors ────────────────────────────────────────────────────
    /// Connection, proxy or TLS failure.
    #[error("Failed to fetch '{url}': {reason}")]
    NetworkFailure { url: String, reason: String },

    /// The request exceeded the configured per-request deadline.
    #[error("Fetch timed out after {secs}s for '{url}'\nIncrease -timeout.")]
    Timeout { url: String, secs: u64 },

    /// Server answered with a non-2xx status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// The body was larger than `max_response_bytes`.
    #[error("Failed to read '{url}': response body exceeds maximum allowed size ({limit})")]
    ResponseTooLarge { url: String, limit: String },

    /// SSRF guard refused a loopback / private / link-local destination.
    #[error("blocked connection to private/local IP for {host}")]
    BlockedDestination { host: String },

    // ── Content errors ────────────────────────────────────────────────────
    /// Readability produced no article body.
    #[error("Could not extract an article from '{url}': {reason}")]
    ExtractionFailure { url: String, reason: String },

    /// Image bytes could not be decoded.
    #[error("could not decode image ({mime}): {reason}")]
    DecodeFailure { mime: String, reason: String },

    /// JPEG / PNG encoding failed.
    #[error("image encode failed: {reason}")]
    EncodeFailure { reason: String },

    /// Writing the EPUB container failed.
    #[error("building epub: {reason}")]
    PackagingFailure { reason: String },

    /// Every URL of the run failed.
    #[error("no articles converted ({total} attempted)")]
    NoArticlesConverted { total: usize },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A non-fatal error for a single article of a reading list.
///
/// The run continues with the remaining URLs unless every one of them fails.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("Article {index} ({url}): {detail}")]
pub struct ArticleError {
    /// 1-indexed position in the reading list.
    pub index: usize,
    pub url: String,
    pub detail: String,
}

impl ArticleError {
    pub fn new(index: usize, url: impl Into<String>, err: &DeckleError) -> Self {
        Self {
            index,
            url: url.into(),
            detail: err.to_string(),
        }
    }
}
