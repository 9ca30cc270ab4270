//! Article extraction via readability.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use dom_smoothie::{Config, Readability};
use tracing::debug;

use crate::error::DeckleError;

/// Readability gives up on pages with more elements than this.
const MAX_ELEMENTS_TO_PARSE: usize = 9000;

/// What readability found on a page.
#[derive(Debug, Clone, Default)]
pub struct ExtractedArticle {
    /// Body HTML fragment.
    pub content: String,
    pub title: String,
    pub byline: Option<String>,
    pub site_name: Option<String>,
    pub published: Option<DateTime<FixedOffset>>,
}

/// Run readability over a fetched page.
///
/// `url` resolves relative links inside the extracted content.
pub fn extract_article(html: &str, url: &str) -> Result<ExtractedArticle, DeckleError> {
    let cfg = Config {
        max_elements_to_parse: MAX_ELEMENTS_TO_PARSE,
        ..Default::default()
    };

    let failure = |reason: String| DeckleError::ExtractionFailure {
        url: url.to_string(),
        reason,
    };

    let mut readability =
        Readability::new(html, Some(url), Some(cfg)).map_err(|e| failure(e.to_string()))?;
    let article = readability.parse().map_err(|e| failure(e.to_string()))?;

    let content = article.content.to_string();
    if content.trim().is_empty() {
        return Err(failure("no article content found".into()));
    }

    let published = article.published_time.as_deref().and_then(parse_published);
    debug!(url, title = %article.title, has_date = published.is_some(), "extracted article");

    Ok(ExtractedArticle {
        content,
        title: article.title.trim().to_string(),
        byline: non_blank(article.byline),
        site_name: non_blank(article.site_name),
        published,
    })
}

/// Parse a publication timestamp: RFC 3339, then a bare date, then a
/// date-time without offset (taken as UTC).
pub fn parse_published(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    let utc = FixedOffset::east_opt(0)?;
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return utc.from_local_datetime(&d.and_hms_opt(0, 0, 0)?).single();
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&dt).fixed_offset());
    }
    debug!(raw, "unparseable publication date");
    None
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><head>
<title>How Rivers Bend - River Weekly</title>
<meta name="author" content="Ada Lovelace">
<meta property="og:site_name" content="River Weekly">
<meta property="article:published_time" content="2024-05-01T08:30:00Z">
</head><body>
<nav><a href="/">Home</a> <a href="/about">About</a></nav>
<article>
<h1>How Rivers Bend</h1>
<p>Rivers rarely run straight. Over centuries the outer bank of every curve is
eroded while the inner bank collects sediment, so the loop grows wider and the
channel migrates across the valley floor.</p>
<p>Eventually two loops meet and the river abandons the bend altogether,
leaving a crescent-shaped oxbow lake behind. Geologists can read the history of
a floodplain from the pattern these lakes leave in the landscape.</p>
<p>The same mechanics explain why engineered channels need constant
maintenance: left alone, the water will always find its way back to a curve.</p>
</article>
<footer>Copyright River Weekly</footer>
</body></html>"#;

    #[test]
    fn extracts_content_and_metadata() {
        let a = extract_article(PAGE, "https://rivers.example/bend").unwrap();
        assert!(a.content.contains("oxbow lake"));
        assert!(!a.content.contains("Copyright River Weekly"));
        assert!(a.title.contains("How Rivers Bend"));
        assert_eq!(a.byline.as_deref(), Some("Ada Lovelace"));
        assert_eq!(a.site_name.as_deref(), Some("River Weekly"));
        assert_eq!(a.published.map(|d| d.year()), Some(2024));
    }

    #[test]
    fn empty_page_is_an_extraction_failure() {
        let err = extract_article("<html><body></body></html>", "https://x.example/").unwrap_err();
        assert!(matches!(err, DeckleError::ExtractionFailure { .. }));
    }

    #[test]
    fn published_formats() {
        let d = parse_published("2023-11-02T10:00:00+02:00").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2023, 11, 2));
        assert_eq!(d.offset().local_minus_utc(), 7200);

        let d = parse_published("2023-11-02").unwrap();
        assert_eq!((d.month(), d.day()), (11, 2));

        let d = parse_published("2023-11-02T23:59:59").unwrap();
        assert_eq!(d.offset().local_minus_utc(), 0);

        assert!(parse_published("yesterday").is_none());
        assert!(parse_published("  ").is_none());
    }
}
