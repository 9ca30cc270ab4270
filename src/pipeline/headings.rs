//! Title detection, heading shifting, bylines and the standalone HTML shell.
//!
//! Every article gets exactly one `<h1>` (its title) followed by a byline;
//! headings already in the body move down one level so the outline stays
//! consistent across a book.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::dom::{escape, unescape};
use crate::output::SourceInfo;
use crate::templates::READING_CSS;

static RE_TITLE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<title>([^<]+)</title>").unwrap());
static RE_FIRST_H1: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").unwrap());
static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<(/?)h([1-6])([^>]*)>").unwrap());
static RE_TITLE_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[-|\x{2013}\x{2014}]\s+").unwrap());
static RE_BODY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<body[^>]*>").unwrap());

pub const UNTITLED: &str = "Untitled";

/// Drop a trailing site name: `"Article - Site"` → `"Article"`.
pub fn clean_title(title: &str) -> String {
    let first = RE_TITLE_SPLIT.split(title).next().unwrap_or("").trim();
    if first.is_empty() {
        UNTITLED.to_string()
    } else {
        first.to_string()
    }
}

/// `<title>` if it yields something useful, else the first `<h1>` text,
/// else "Untitled".
pub fn extract_title(html: &str) -> String {
    if let Some(caps) = RE_TITLE_TAG.captures(html) {
        let title = clean_title(unescape(caps[1].trim()).as_ref());
        if title != UNTITLED {
            return title;
        }
    }
    if let Some(caps) = RE_FIRST_H1.captures(html) {
        let text = RE_TAG.replace_all(&caps[1], "");
        let text = text.trim();
        if !text.is_empty() {
            return text.to_string();
        }
    }
    UNTITLED.to_string()
}

/// Text of the first `<h1>`, tags stripped; empty when there is none.
pub fn first_h1_text(html: &str) -> String {
    RE_FIRST_H1
        .captures(html)
        .map(|caps| RE_TAG.replace_all(&caps[1], "").trim().to_string())
        .unwrap_or_default()
}

/// `h1`→`h2` … `h5`→`h6`; `h6` stays. Attributes are kept, tag names are
/// lowercased.
pub fn shift_headings(html: &str) -> String {
    RE_HEADING
        .replace_all(html, |caps: &Captures| {
            let level: u8 = caps[2].parse().unwrap_or(6);
            let level = (level + 1).min(6);
            if &caps[1] == "/" {
                format!("</h{level}>")
            } else {
                format!("<h{level}{}>", &caps[3])
            }
        })
        .into_owned()
}

/// `<p class="byline">date · byline · site<br/><a href="url">display</a></p>`,
/// or an empty string when there is nothing to show.
pub fn format_byline(src: &SourceInfo) -> String {
    let line = meta_line(src);
    if line.is_empty() {
        return String::new();
    }
    format!(r#"<p class="byline">{line}</p>"#)
}

/// Escaped inner markup of a byline: `date · byline · site<br/><a …>…</a>`.
pub fn meta_line(src: &SourceInfo) -> String {
    let mut line = src
        .meta_parts()
        .iter()
        .map(|p| escape(p))
        .collect::<Vec<_>>()
        .join(" \u{b7} ");

    if !src.url.is_empty() {
        let link = format!(
            r#"<a href="{}">{}</a>"#,
            escape(&src.url),
            escape(src.display_url())
        );
        if !line.is_empty() {
            line.push_str("<br/>");
        }
        line.push_str(&link);
    }
    line
}

/// Shift headings, insert the title `<h1>` and byline, and wrap the result
/// in a full HTML document.
///
/// A non-empty `title_override` wins over whatever the HTML says.
pub fn normalize_headings(html: &str, title_override: Option<&str>, src: &SourceInfo) -> String {
    let title = match title_override.map(str::trim).filter(|t| !t.is_empty()) {
        Some(t) => clean_title(t),
        None => extract_title(html),
    };

    let shifted = shift_headings(html);

    let mut header = format!("<h1>{}</h1>\n", escape(&title));
    let byline = format_byline(src);
    if !byline.is_empty() {
        header.push_str(&byline);
        header.push('\n');
    }

    let text = match RE_BODY_TAG.find(&shifted) {
        Some(m) => {
            let pos = m.end();
            format!("{}\n{}{}", &shifted[..pos], header, &shifted[pos..])
        }
        None => format!("{header}{shifted}"),
    };

    render_full_html(&text, &title, src)
}

/// Wrap an article fragment in a complete HTML5 document.
///
/// Input that already has `<html`, `<!doctype` or `<body` is returned as is.
pub fn render_full_html(fragment: &str, title: &str, src: &SourceInfo) -> String {
    let lower = fragment.to_ascii_lowercase();
    if lower.contains("<html") || lower.contains("<!doctype") || lower.contains("<body") {
        return fragment.to_string();
    }

    let mut head_extra = String::new();
    if let Some(author) = src.byline.as_deref().filter(|b| !b.trim().is_empty()) {
        head_extra.push_str(&format!(
            "\t<meta name=\"author\" content=\"{}\">\n",
            escape(author)
        ));
    }
    if let Some(ts) = src.published {
        head_extra.push_str(&format!("\t<meta name=\"date\" content=\"{}\">\n", ts.to_rfc3339()));
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n\t<meta charset=\"utf-8\">\n\t<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\t<title>{}</title>\n{}\t<style>\n{}\t</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape(title),
        head_extra,
        READING_CSS,
        fragment
    )
}

/// Content between `<body…>` and `</body>`, or the whole input when there
/// is no body tag.
pub fn extract_body_content(html: &str) -> &str {
    let Some(open) = RE_BODY_TAG.find(html) else {
        return html;
    };
    let rest = &html[open.end()..];
    let lower = rest.to_ascii_lowercase();
    match lower.find("</body>") {
        Some(end) => &rest[..end],
        None => rest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn title_from_title_tag_strips_site_suffix() {
        assert_eq!(
            extract_title("<html><head><title>My Article - Site Name</title></head></html>"),
            "My Article"
        );
        assert_eq!(
            extract_title("<title>Tom &amp; Jerry | Cartoons</title>"),
            "Tom & Jerry"
        );
    }

    #[test]
    fn title_falls_back_to_h1_then_untitled() {
        assert_eq!(
            extract_title(r##"<body><h1><a href="#">Link <em>Title</em></a></h1></body>"##),
            "Link Title"
        );
        assert_eq!(extract_title("<title>Untitled</title><h1>Real</h1>"), "Real");
        assert_eq!(extract_title("<p>No headings here</p>"), "Untitled");
    }

    #[test]
    fn clean_title_separators() {
        assert_eq!(clean_title("Article | Site"), "Article");
        assert_eq!(clean_title("Article \u{2014} Site"), "Article");
        assert_eq!(clean_title("Article \u{2013} Site"), "Article");
        assert_eq!(clean_title("Well-known Facts"), "Well-known Facts");
        assert_eq!(clean_title(""), "Untitled");
        assert_eq!(clean_title(" - Site"), "Untitled");
    }

    #[test]
    fn shift_all_levels() {
        for (input, want) in [
            ("<h1>one</h1>", "<h2>one</h2>"),
            ("<h3>three</h3>", "<h4>three</h4>"),
            ("<h5>five</h5>", "<h6>five</h6>"),
            ("<h6>six</h6>", "<h6>six</h6>"),
            ("<H1>Up</H1>", "<h2>Up</h2>"),
        ] {
            assert_eq!(shift_headings(input), want);
        }
        assert_eq!(
            shift_headings(r#"<h2 class="foo" id="bar">t</h2>"#),
            r#"<h3 class="foo" id="bar">t</h3>"#
        );
    }

    #[test]
    fn byline_with_everything() {
        let src = SourceInfo {
            url: "https://example.com/a?x=1&y=2".into(),
            byline: Some("Jane <Doe>".into()),
            site_name: Some("Example".into()),
            published: Some(
                FixedOffset::east_opt(0)
                    .unwrap()
                    .with_ymd_and_hms(2006, 1, 2, 15, 4, 5)
                    .unwrap(),
            ),
        };
        assert_eq!(
            format_byline(&src),
            "<p class=\"byline\">January 2, 2006 \u{b7} Jane &lt;Doe&gt; \u{b7} Example<br/>\
             <a href=\"https://example.com/a?x=1&amp;y=2\">example.com/a?x=1&amp;y=2</a></p>"
        );
    }

    #[test]
    fn byline_empty_or_link_only() {
        assert_eq!(format_byline(&SourceInfo::default()), "");
        let src = SourceInfo {
            url: "http://example.com/".into(),
            ..Default::default()
        };
        assert_eq!(
            format_byline(&src),
            r#"<p class="byline"><a href="http://example.com/">example.com</a></p>"#
        );
    }

    #[test]
    fn normalize_inserts_h1_before_shifted_headings() {
        let html = "<html><head><title>My Article</title></head><body><h1>Old H1</h1><p>text</p></body></html>";
        let out = normalize_headings(html, None, &SourceInfo::default());
        let h1 = out.find("<h1>My Article</h1>").unwrap();
        let h2 = out.find("<h2>Old H1</h2>").unwrap();
        assert!(h1 < h2);
        // already a full document: not wrapped again
        assert_eq!(out.matches("<html").count(), 1);
    }

    #[test]
    fn normalize_fragment_with_override() {
        let src = SourceInfo {
            url: "https://example.com/post".into(),
            byline: Some("Ann".into()),
            ..Default::default()
        };
        let out = normalize_headings("<p>body</p>", Some("Custom - Site"), &src);
        assert!(out.starts_with("<!DOCTYPE html>"));
        assert!(out.contains("<title>Custom</title>"));
        assert!(out.contains("<h1>Custom</h1>\n<p class=\"byline\">Ann<br/>"));
        assert!(out.contains(r#"<meta name="author" content="Ann">"#));
        assert!(out.contains("<p>body</p>"));
    }

    #[test]
    fn full_html_passthrough() {
        let doc = "<!doctype html><p>x</p>";
        assert_eq!(render_full_html(doc, "t", &SourceInfo::default()), doc);
    }

    #[test]
    fn body_content() {
        assert_eq!(
            extract_body_content("<html><body class=\"x\"><p>a</p></BODY></html>"),
            "<p>a</p>"
        );
        assert_eq!(extract_body_content("<p>a</p>"), "<p>a</p>");
        assert_eq!(first_h1_text("<h1 id=\"t\">A <b>B</b></h1>"), "A B");
        assert_eq!(first_h1_text("<p>none</p>"), "");
    }
}
