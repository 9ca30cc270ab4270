//! EPUB 3 packager.
//!
//! Turns processed articles into a zip container:
//!
//! ```text
//! mimetype                      (stored, first entry)
//! META-INF/container.xml
//! EPUB/package.opf              metadata, manifest, spine
//! EPUB/nav.xhtml                EPUB 3 navigation document
//! EPUB/toc.ncx                  EPUB 2 fallback
//! EPUB/css/styles.css
//! EPUB/images/cover.png         unless the cover style is `none`
//! EPUB/images/chNNN_imgNNN.ext  images lifted out of data: URIs
//! EPUB/xhtml/cover.xhtml
//! EPUB/xhtml/contents.xhtml     front-matter table of contents
//! EPUB/xhtml/articleNNN.xhtml   one per article, sanitized
//! ```

pub mod cover;

use std::io::{Cursor, Write};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::CoverStyle;
use crate::dom::{escape, unescape};
use crate::error::DeckleError;
use crate::output::Article;
use crate::pipeline::headings::{extract_body_content, first_h1_text, meta_line};
use crate::pipeline::optimize::decode_base64;
use crate::sanitize::sanitize;
use crate::templates::{xhtml_document, CONTAINER_XML, EPUB_CSS, MIMETYPE};

use cover::generate_cover;

static RE_IMG_DATA_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(<img\b[^>]*?\bsrc\s*=\s*")data:([^;"]+);base64,([^"]*)(")"#).unwrap()
});

const CSS_HREF: &str = "../css/styles.css";

/// A resource file lifted out of a chapter.
#[derive(Debug, Clone)]
pub struct ImageResource {
    /// File name inside `EPUB/images/`.
    pub filename: String,
    pub media_type: &'static str,
    pub data: Vec<u8>,
}

/// One article, ready to be written as `articleNNN.xhtml`.
#[derive(Debug, Clone)]
pub struct Chapter {
    pub filename: String,
    /// Plain-text title (not escaped).
    pub title: String,
    /// Sanitized XHTML body fragment.
    pub body: String,
    pub images: Vec<ImageResource>,
}

/// Builds an EPUB from processed articles.
///
/// ```rust,no_run
/// use deckle::epub::EpubWriter;
/// use deckle::CoverStyle;
/// # fn demo(articles: &[deckle::Article]) -> Result<(), deckle::DeckleError> {
/// let bytes = EpubWriter::new("Weekend Reading")
///     .cover(CoverStyle::Pattern)
///     .build(articles)?;
/// # Ok(()) }
/// ```
#[derive(Debug, Clone)]
pub struct EpubWriter {
    title: String,
    cover: CoverStyle,
    modified: DateTime<Utc>,
}

impl EpubWriter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            cover: CoverStyle::default(),
            modified: Utc::now(),
        }
    }

    pub fn cover(mut self, style: CoverStyle) -> Self {
        self.cover = style;
        self
    }

    /// Timestamp written to `dcterms:modified`.
    pub fn modified(mut self, ts: DateTime<Utc>) -> Self {
        self.modified = ts;
        self
    }

    /// Package `articles` into EPUB bytes.
    pub fn build(&self, articles: &[Article]) -> Result<Vec<u8>, DeckleError> {
        let chapters: Vec<Chapter> = articles
            .iter()
            .enumerate()
            .map(|(i, a)| prepare_chapter(a, i + 1))
            .collect();

        let cover_png = match generate_cover(&self.title, articles, self.cover) {
            Ok(png) => png,
            Err(e) => {
                warn!("could not generate cover: {e}");
                None
            }
        };

        let identifier = book_identifier(&self.title, articles);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(6));

        add_file(&mut zip, "mimetype", MIMETYPE, stored)?;
        add_file(&mut zip, "META-INF/container.xml", CONTAINER_XML.as_bytes(), deflated)?;

        let opf = self.package_document(&identifier, &chapters, cover_png.is_some());
        add_file(&mut zip, "EPUB/package.opf", opf.as_bytes(), deflated)?;
        add_file(&mut zip, "EPUB/nav.xhtml", nav_document(&chapters).as_bytes(), deflated)?;
        add_file(
            &mut zip,
            "EPUB/toc.ncx",
            self.ncx_document(&identifier, &chapters).as_bytes(),
            deflated,
        )?;
        add_file(&mut zip, "EPUB/css/styles.css", EPUB_CSS.as_bytes(), deflated)?;

        if let Some(png) = &cover_png {
            add_file(&mut zip, "EPUB/images/cover.png", png, stored)?;
            let page = xhtml_document(
                "Cover",
                CSS_HREF,
                r#"<div class="cover"><img src="../images/cover.png" alt="Cover"/></div>"#,
            );
            add_file(&mut zip, "EPUB/xhtml/cover.xhtml", page.as_bytes(), deflated)?;
        }

        let contents = xhtml_document("Contents", CSS_HREF, &toc_body(articles));
        add_file(&mut zip, "EPUB/xhtml/contents.xhtml", contents.as_bytes(), deflated)?;

        for ch in &chapters {
            let page = xhtml_document(&escape(&ch.title), CSS_HREF, &ch.body);
            add_file(&mut zip, &format!("EPUB/xhtml/{}", ch.filename), page.as_bytes(), deflated)?;
            for img in &ch.images {
                add_file(&mut zip, &format!("EPUB/images/{}", img.filename), &img.data, deflated)?;
            }
        }

        let cursor = zip.finish().map_err(packaging)?;
        let bytes = cursor.into_inner();
        debug!(
            chapters = chapters.len(),
            bytes = bytes.len(),
            "epub packaged"
        );
        Ok(bytes)
    }

    fn package_document(&self, identifier: &str, chapters: &[Chapter], has_cover: bool) -> String {
        let mut opf = String::new();
        opf.push_str(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\" unique-identifier=\"BookId\" xml:lang=\"en\">\n\
             \x20 <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n",
        );
        opf.push_str(&format!(
            "    <dc:identifier id=\"BookId\">{}</dc:identifier>\n",
            escape(identifier)
        ));
        opf.push_str(&format!("    <dc:title>{}</dc:title>\n", escape(&self.title)));
        opf.push_str("    <dc:language>en</dc:language>\n");
        opf.push_str("    <dc:creator>deckle</dc:creator>\n");
        opf.push_str(&format!(
            "    <meta property=\"dcterms:modified\">{}</meta>\n",
            self.modified.format("%Y-%m-%dT%H:%M:%SZ")
        ));
        if has_cover {
            opf.push_str("    <meta name=\"cover\" content=\"cover-image\"/>\n");
        }
        opf.push_str("  </metadata>\n  <manifest>\n");

        let mut item = |id: &str, href: &str, media: &str, props: Option<&str>| {
            let props = props
                .map(|p| format!(" properties=\"{p}\""))
                .unwrap_or_default();
            opf.push_str(&format!(
                "    <item id=\"{}\" href=\"{}\" media-type=\"{}\"{}/>\n",
                escape(id),
                escape(href),
                media,
                props
            ));
        };
        item("nav", "nav.xhtml", "application/xhtml+xml", Some("nav"));
        item("ncx", "toc.ncx", "application/x-dtbncx+xml", None);
        item("css", "css/styles.css", "text/css", None);
        if has_cover {
            item("cover-image", "images/cover.png", "image/png", Some("cover-image"));
            item("cover", "xhtml/cover.xhtml", "application/xhtml+xml", None);
        }
        item("contents", "xhtml/contents.xhtml", "application/xhtml+xml", None);
        for ch in chapters {
            let id = ch.filename.trim_end_matches(".xhtml");
            item(id, &format!("xhtml/{}", ch.filename), "application/xhtml+xml", None);
            for img in &ch.images {
                let img_id = format!("img-{}", img.filename.replace('.', "-"));
                item(&img_id, &format!("images/{}", img.filename), img.media_type, None);
            }
        }

        opf.push_str("  </manifest>\n  <spine toc=\"ncx\">\n");
        if has_cover {
            opf.push_str("    <itemref idref=\"cover\" linear=\"no\"/>\n");
        }
        opf.push_str("    <itemref idref=\"contents\"/>\n");
        for ch in chapters {
            opf.push_str(&format!(
                "    <itemref idref=\"{}\"/>\n",
                escape(ch.filename.trim_end_matches(".xhtml"))
            ));
        }
        opf.push_str("  </spine>\n</package>\n");
        opf
    }

    fn ncx_document(&self, identifier: &str, chapters: &[Chapter]) -> String {
        let mut ncx = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n\
             \x20 <head>\n\
             \x20   <meta name=\"dtb:uid\" content=\"{}\"/>\n\
             \x20   <meta name=\"dtb:depth\" content=\"1\"/>\n\
             \x20   <meta name=\"dtb:totalPageCount\" content=\"0\"/>\n\
             \x20   <meta name=\"dtb:maxPageNumber\" content=\"0\"/>\n\
             \x20 </head>\n\
             \x20 <docTitle><text>{}</text></docTitle>\n\
             \x20 <navMap>\n",
            escape(identifier),
            escape(&self.title)
        );

        let entries = std::iter::once(("Contents".to_string(), "xhtml/contents.xhtml".to_string()))
            .chain(
                chapters
                    .iter()
                    .map(|c| (c.title.clone(), format!("xhtml/{}", c.filename))),
            );
        for (n, (label, href)) in entries.enumerate() {
            let order = n + 1;
            ncx.push_str(&format!(
                "    <navPoint id=\"navPoint-{order}\" playOrder=\"{order}\">\n\
                 \x20     <navLabel><text>{}</text></navLabel>\n\
                 \x20     <content src=\"{}\"/>\n\
                 \x20   </navPoint>\n",
                escape(&label),
                escape(&href)
            ));
        }
        ncx.push_str("  </navMap>\n</ncx>\n");
        ncx
    }
}

// ── Chapters ─────────────────────────────────────────────────────────────

/// Sanitize an article and lift its embedded images into resources.
///
/// `n` is the 1-based chapter number.
pub fn prepare_chapter(article: &Article, n: usize) -> Chapter {
    let body = extract_body_content(&article.html);
    let title = unescape(&first_h1_text(body)).trim().to_string();
    let title = if title.is_empty() {
        format!("Article {n}")
    } else {
        title
    };

    let xhtml = sanitize(body);
    let (body, images) = extract_images(&xhtml, n);
    Chapter {
        filename: chapter_filename(n),
        title,
        body,
        images,
    }
}

pub fn chapter_filename(n: usize) -> String {
    format!("article{n:03}.xhtml")
}

/// Replace every `<img src="data:…">` with a reference to a resource file.
///
/// Images whose base64 does not decode keep their data URI.
pub fn extract_images(xhtml: &str, chapter: usize) -> (String, Vec<ImageResource>) {
    let mut images = Vec::new();
    let mut idx = 0usize;

    let body = RE_IMG_DATA_URI.replace_all(xhtml, |caps: &Captures| {
        let mime = &caps[2];
        let (ext, media_type) = image_kind(mime);
        let filename = format!("ch{chapter:03}_img{idx:03}.{ext}");
        idx += 1;

        match decode_base64(&caps[3]) {
            Ok(data) => {
                let out = format!("{}../images/{}{}", &caps[1], filename, &caps[4]);
                images.push(ImageResource {
                    filename,
                    media_type,
                    data,
                });
                out
            }
            Err(e) => {
                warn!("invalid base64 for {filename}: {e}");
                caps[0].to_string()
            }
        }
    });
    (body.into_owned(), images)
}

/// File extension and manifest media type for an image MIME type.
fn image_kind(mime: &str) -> (&'static str, &'static str) {
    if mime.contains("png") {
        ("png", "image/png")
    } else if mime.contains("gif") {
        ("gif", "image/gif")
    } else if mime.contains("svg") {
        ("svg", "image/svg+xml")
    } else if mime.contains("webp") {
        ("webp", "image/webp")
    } else {
        ("jpg", "image/jpeg")
    }
}

// ── Navigation ───────────────────────────────────────────────────────────

/// Body of `contents.xhtml`.
pub fn toc_body(articles: &[Article]) -> String {
    let mut b = String::from("<h1>Contents</h1>\n<ol class=\"toc\">\n");
    for (i, a) in articles.iter().enumerate() {
        let title = if a.title.trim().is_empty() {
            format!("Article {}", i + 1)
        } else {
            a.title.trim().to_string()
        };
        b.push_str("<li>\n");
        b.push_str(&format!(
            "<a href=\"{}\">{}</a>\n",
            chapter_filename(i + 1),
            escape(&title)
        ));
        let meta = meta_line(&a.source);
        if !meta.is_empty() {
            b.push_str(&format!("<p class=\"toc-meta\">{meta}</p>\n"));
        }
        b.push_str("</li>\n");
    }
    b.push_str("</ol>\n");
    b
}

fn nav_document(chapters: &[Chapter]) -> String {
    let mut items = String::from("      <li><a href=\"xhtml/contents.xhtml\">Contents</a></li>\n");
    for ch in chapters {
        items.push_str(&format!(
            "      <li><a href=\"xhtml/{}\">{}</a></li>\n",
            ch.filename,
            escape(&ch.title)
        ));
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <!DOCTYPE html>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" xml:lang=\"en\" lang=\"en\">\n\
         <head>\n  <meta charset=\"UTF-8\"/>\n  <title>Contents</title>\n</head>\n\
         <body>\n  <nav epub:type=\"toc\" id=\"toc\">\n    <h1>Contents</h1>\n    <ol>\n{items}    </ol>\n  </nav>\n</body>\n</html>\n"
    )
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// `urn:uuid:` derived from the book title and article URLs, so rebuilding
/// the same reading list yields the same identifier.
pub fn book_identifier(title: &str, articles: &[Article]) -> String {
    let mut h = sha1_smol::Sha1::new();
    h.update(title.as_bytes());
    for a in articles {
        h.update(b"\n");
        h.update(a.source.url.as_bytes());
    }
    let mut b = h.digest().bytes();
    b[6] = (b[6] & 0x0f) | 0x50;
    b[8] = (b[8] & 0x3f) | 0x80;
    let hex: String = b[..16].iter().map(|x| format!("{x:02x}")).collect();
    format!(
        "urn:uuid:{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

fn add_file(
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    name: &str,
    data: &[u8],
    options: SimpleFileOptions,
) -> Result<(), DeckleError> {
    zip.start_file(name, options).map_err(packaging)?;
    zip.write_all(data).map_err(packaging)?;
    Ok(())
}

fn packaging(e: impl std::fmt::Display) -> DeckleError {
    DeckleError::PackagingFailure {
        reason: e.to_string(),
    }
}
