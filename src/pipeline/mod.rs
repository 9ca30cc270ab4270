//! Pipeline stages for turning one article URL into a finished document.
//!
//! Each submodule implements one transformation step and is testable on
//! its own.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ images (lazy src) ──▶ extract ──▶ images ──▶ headings
//! (HTTP)                          (readability)  (embed,    (h1, byline,
//!                                                 optimize)  HTML shell)
//! ```
//!
//! 1. [`fetch`]    — pooled HTTP client with size cap and browser headers;
//!    [`ssrf`] keeps it away from private addresses
//! 2. [`images`]   — lazy-load promotion, external fetch, `<picture>`
//!    collapse and re-encoding via [`optimize`] (CPU work in
//!    `spawn_blocking`)
//! 3. [`extract`]  — readability over the fetched page
//! 4. [`headings`] — title `<h1>`, byline, heading shift, standalone HTML
//! 5. [`markdown`] — CommonMark output for the `markdown` format

pub mod extract;
pub mod fetch;
pub mod headings;
pub mod images;
pub mod markdown;
pub mod optimize;
pub mod ssrf;
