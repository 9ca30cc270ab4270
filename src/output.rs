//! Result types produced by a deckle run.

use crate::error::ArticleError;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Attribution for one article, shown in its byline and the contents page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// URL exactly as given on the reading list.
    pub url: String,
    pub byline: Option<String>,
    pub site_name: Option<String>,
    pub published: Option<DateTime<FixedOffset>>,
}

impl SourceInfo {
    /// `date · byline · site`, unescaped; empty parts are skipped.
    pub fn meta_parts(&self) -> Vec<String> {
        let mut parts = Vec::new();
        if let Some(ts) = self.published {
            parts.push(ts.format("%B %-d, %Y").to_string());
        }
        if let Some(ref b) = self.byline {
            if !b.trim().is_empty() {
                parts.push(b.trim().to_string());
            }
        }
        if let Some(ref s) = self.site_name {
            if !s.trim().is_empty() {
                parts.push(s.trim().to_string());
            }
        }
        parts
    }

    /// The URL without scheme and trailing slash.
    pub fn display_url(&self) -> &str {
        let u = self
            .url
            .strip_prefix("https://")
            .or_else(|| self.url.strip_prefix("http://"))
            .unwrap_or(&self.url);
        u.strip_suffix('/').unwrap_or(u)
    }
}

/// One article after the full pipeline: a complete HTML document whose body
/// starts with `<h1>title</h1>` and the byline.
///
/// Created once per URL and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    /// 1-indexed position in the reading list.
    pub index: usize,
    pub title: String,
    pub html: String,
    pub source: SourceInfo,
}

/// Aggregate numbers for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_articles: usize,
    pub converted_articles: usize,
    pub failed_articles: usize,
    /// Bytes of the rendered output.
    pub output_bytes: usize,
    pub total_duration_ms: u64,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Successful articles, in reading-list order.
    pub articles: Vec<Article>,
    /// Skipped articles, in reading-list order.
    pub failures: Vec<ArticleError>,
    /// Book or document title actually used.
    pub title: String,
    /// The rendered EPUB / Markdown / HTML bytes.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub stats: ConversionStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn meta_parts_order_and_date_format() {
        let ts = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 5, 10, 0, 0)
            .unwrap();
        let src = SourceInfo {
            url: "https://example.com/post/".into(),
            byline: Some("Jane Doe".into()),
            site_name: Some("Example".into()),
            published: Some(ts),
        };
        assert_eq!(src.meta_parts(), vec!["March 5, 2024", "Jane Doe", "Example"]);
        assert_eq!(src.display_url(), "example.com/post");
    }

    #[test]
    fn meta_parts_skips_blank() {
        let src = SourceInfo {
            url: "http://a.example".into(),
            byline: Some("  ".into()),
            ..Default::default()
        };
        assert!(src.meta_parts().is_empty());
        assert_eq!(src.display_url(), "a.example");
    }
}
