//! Fixed stylesheets and document skeletons used by the HTML renderer and
//! the EPUB packager.

/// Stylesheet embedded in the standalone HTML document.
pub const READING_CSS: &str = r#"		body {
			font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Helvetica, Arial, sans-serif;
			line-height: 1.6;
			color: #333;
			max-width: 800px;
			margin: 0 auto;
			padding: 2rem 1rem;
		}
		img { max-width: 100%; height: auto; }
		pre { white-space: pre-wrap; word-wrap: break-word; }
		.byline { color: #666; font-style: italic; margin-bottom: 2rem; }
		blockquote { border-left: 4px solid #eee; padding-left: 1rem; margin-left: 0; color: #666; }
"#;

/// `EPUB/css/styles.css`, tuned for e-ink screens.
pub const EPUB_CSS: &str = r#"body { margin: 1em; line-height: 1.5; }
img { max-width: 100%; height: auto; }
pre, code { font-size: 0.85em; }
pre { white-space: pre-wrap; }
blockquote { margin-left: 1em; padding-left: 0.5em; border-left: 2px solid #999; }
.byline { font-size: 0.85em; color: #666; margin-top: -0.5em; margin-bottom: 1.5em; }
.byline a { color: #666; }
.toc { list-style-type: none; padding-left: 0; }
.toc li { margin-bottom: 1.2em; }
.toc a { text-decoration: none; }
.toc-meta { font-size: 0.85em; color: #666; margin-top: 0.1em; }
.toc-meta a { color: #666; }
.cover { margin: 0; padding: 0; text-align: center; }
.cover img { max-width: 100%; max-height: 100%; }
"#;

/// Zip entry that must come first, stored uncompressed.
pub const MIMETYPE: &[u8] = b"application/epub+zip";

/// `META-INF/container.xml`.
pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="EPUB/package.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

/// Wrap an XHTML body fragment into a complete EPUB content document.
///
/// `title` must already be escaped. `css_href` is relative to the document.
pub fn xhtml_document(title: &str, css_href: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" xml:lang="en" lang="en">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
  <link rel="stylesheet" type="text/css" href="{css_href}"/>
</head>
<body>
{body}
</body>
</html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_points_at_package() {
        assert!(CONTAINER_XML.contains(r#"full-path="EPUB/package.opf""#));
    }

    #[test]
    fn xhtml_document_declares_epub_namespace() {
        let doc = xhtml_document("T", "../css/styles.css", "<p>x</p>");
        assert!(doc.starts_with("<?xml"));
        assert!(doc.contains(r#"xmlns:epub="http://www.idpf.org/2007/ops""#));
        assert!(doc.contains("<title>T</title>"));
        assert!(doc.contains("<p>x</p>"));
    }
}
