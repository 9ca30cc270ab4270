//! End-to-end tests against a local HTTP server.
//!
//! A tiny tokio server serves fixture pages and images on 127.0.0.1, so the
//! runs below go through the real fetch → readability → images → headings
//! → output path. The SSRF guard is switched off for them with
//! `allow_private_network(true)`, except in the test that checks it.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

use deckle::{
    article_stream, convert, convert_to_file, pipeline::images::ImageContext, process_url,
    CoverStyle, DeckleConfig, DeckleError, OutputFormat, ProgressCallback,
};
use base64::Engine as _;
use futures::StreamExt;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

// ── Test server ──────────────────────────────────────────────────────────────

struct Route {
    path: String,
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
    /// Wait before answering.
    delay: Duration,
}

fn page(path: &str, html: String) -> Route {
    Route {
        path: path.to_string(),
        status: 200,
        content_type: "text/html; charset=utf-8",
        body: html.into_bytes(),
        delay: Duration::ZERO,
    }
}

fn png_route(path: &str, body: Vec<u8>, delay: Duration) -> Route {
    Route {
        path: path.to_string(),
        status: 200,
        content_type: "image/png",
        body,
        delay,
    }
}

/// Bind a server on an ephemeral port. `routes` receives the base URL
/// (`http://127.0.0.1:PORT`) so fixtures can link back to it.
async fn serve(routes: impl FnOnce(&str) -> Vec<Route>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let routes = Arc::new(routes(&base));

    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match sock.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&buf);
                let path = request.split_whitespace().nth(1).unwrap_or("/");

                let (status, content_type, body, delay) =
                    match routes.iter().find(|r| r.path == path) {
                        Some(r) => (r.status, r.content_type, r.body.clone(), r.delay),
                        None => (404, "text/plain", b"not found".to_vec(), Duration::ZERO),
                    };
                tokio::time::sleep(delay).await;
                let reason = if status == 200 { "OK" } else { "Not Found" };
                let head = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = sock.write_all(head.as_bytes()).await;
                let _ = sock.write_all(&body).await;
                let _ = sock.shutdown().await;
            });
        }
    });
    base
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

const PARAGRAPH: &str = "The river bends north past the old mill, where the water slows and \
the banks widen into marsh. Herons wait in the shallows through the early morning, and by \
noon the light turns the reeds a pale gold. Locals say the current here has not changed in \
a hundred years, though the maps disagree about where the channel actually runs.";

fn article_html(base: &str, title: &str, with_image: bool) -> String {
    let img = if with_image {
        format!(r#"<p>Seen from the bridge:</p><figure><img src="{base}/wide.png" alt="Chart"/><figcaption>The bend</figcaption></figure>"#)
    } else {
        String::new()
    };
    format!(
        r#"<!DOCTYPE html>
<html><head>
<title>{title} - Example Site</title>
<meta name="author" content="Jane Doe">
<meta property="og:site_name" content="Example Site">
<script>window.tracker = true;</script>
</head><body>
<nav><a href="/">Home</a> | <a href="/about">About</a></nav>
<article>
<h1>{title}</h1>
<p>{PARAGRAPH}</p>
<h2>Upstream</h2>
<p>{PARAGRAPH}</p>
{img}
<p>{PARAGRAPH}</p>
<p>{PARAGRAPH}</p>
</article>
<footer>Copyright Example Site</footer>
</body></html>"#
    )
}

fn wide_png() -> Vec<u8> {
    png(1600, 120)
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, _| image::Rgb([(x % 256) as u8, 80, 160]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

async fn fixture_server() -> String {
    serve(|base| {
        vec![
            page("/rivers", article_html(base, "Rivers of the North", true)),
            page("/lakes", article_html(base, "Lakes and Ponds", false)),
            png_route("/wide.png", wide_png(), Duration::ZERO),
        ]
    })
    .await
}

fn local_config() -> deckle::DeckleConfigBuilder {
    DeckleConfig::builder()
        .allow_private_network(true)
        .timeout_secs(10)
}

fn context(config: &DeckleConfig) -> ImageContext {
    deckle::convert::image_context(config).unwrap()
}

// ── Single article ───────────────────────────────────────────────────────────

#[tokio::test]
async fn process_url_runs_the_whole_pipeline() {
    let base = fixture_server().await;
    let config = local_config().build().unwrap();
    let url = format!("{base}/rivers");

    let article = process_url(1, &url, None, &context(&config)).await.unwrap();

    assert_eq!(article.index, 1);
    assert_eq!(article.title, "Rivers of the North");
    assert_eq!(article.source.url, url);
    assert!(article.html.starts_with("<!DOCTYPE html>"));
    assert!(article.html.contains("<h1>Rivers of the North</h1>"));
    assert!(article.html.contains(r#"<p class="byline">"#));
    assert!(!article.html.contains("window.tracker"));
    // the remote image was fetched, shrunk and embedded
    assert!(article.html.contains("data:image/jpeg;base64,"));
    assert!(!article.html.contains(&format!(r#"src="{base}/wide.png""#)));
}

#[tokio::test]
async fn title_override_wins() {
    let base = fixture_server().await;
    let config = local_config().build().unwrap();
    let article = process_url(1, &format!("{base}/lakes"), Some("My Lakes"), &context(&config))
        .await
        .unwrap();
    assert_eq!(article.title, "My Lakes");
    assert!(article.html.contains("<title>My Lakes</title>"));
}

#[tokio::test]
async fn html_run_writes_one_document() {
    let base = fixture_server().await;
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("rivers.html");
    let config = local_config().title("Custom Title").build().unwrap();

    let output = convert_to_file(&[format!("{base}/rivers")], &out, &config)
        .await
        .unwrap();

    let written = std::fs::read_to_string(&out).unwrap();
    assert_eq!(written.len(), output.stats.output_bytes);
    assert!(written.contains("<h1>Custom Title</h1>"));
    assert_eq!(output.title, "Custom Title");
}

// ── Multi-article formats ────────────────────────────────────────────────────

#[tokio::test]
async fn epub_run_skips_failures_and_packages_the_rest() {
    let base = fixture_server().await;
    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("weekend.txt");
    std::fs::write(
        &list,
        format!("# reading\n{base}/rivers\n\n{base}/missing\n{base}/lakes\n"),
    )
    .unwrap();
    let out = dir.path().join("book.epub");
    let config = local_config()
        .format(OutputFormat::Epub)
        .cover(CoverStyle::Pattern)
        .build()
        .unwrap();

    let output = convert_to_file(&[list.display().to_string()], &out, &config)
        .await
        .unwrap();

    assert_eq!(output.stats.total_articles, 3);
    assert_eq!(output.stats.converted_articles, 2);
    assert_eq!(output.failures.len(), 1);
    assert_eq!(output.failures[0].index, 2);
    assert!(output.failures[0].detail.contains("404"));
    assert_eq!(output.title, "weekend");

    let mut zip = zip::ZipArchive::new(std::fs::File::open(&out).unwrap()).unwrap();
    assert_eq!(zip.by_index(0).unwrap().name(), "mimetype");
    for name in [
        "EPUB/package.opf",
        "EPUB/nav.xhtml",
        "EPUB/xhtml/contents.xhtml",
        "EPUB/xhtml/article001.xhtml",
        "EPUB/xhtml/article002.xhtml",
        "EPUB/images/cover.png",
    ] {
        assert!(zip.by_name(name).is_ok(), "missing {name}");
    }

    let mut chapter = String::new();
    zip.by_name("EPUB/xhtml/article001.xhtml")
        .unwrap()
        .read_to_string(&mut chapter)
        .unwrap();
    assert!(chapter.contains("Rivers of the North"));
    assert!(chapter.contains("../images/ch001_img000.jpg"));
    assert!(zip.by_name("EPUB/images/ch001_img000.jpg").is_ok());

    let mut contents = String::new();
    zip.by_name("EPUB/xhtml/contents.xhtml")
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    let first = contents.find("Rivers of the North").unwrap();
    let second = contents.find("Lakes and Ponds").unwrap();
    assert!(first < second, "reading-list order kept");
}

#[tokio::test]
async fn markdown_run_keeps_remote_images_as_links() {
    let base = fixture_server().await;
    let config = local_config().format(OutputFormat::Markdown).build().unwrap();

    let output = convert(&[format!("{base}/rivers"), format!("{base}/lakes")], &config)
        .await
        .unwrap();
    let md = String::from_utf8(output.bytes).unwrap();

    assert!(md.starts_with("# Rivers of the North"), "{md}");
    assert!(md.contains("\n\n---\n\n# Lakes and Ponds"), "{md}");
    assert!(md.contains("## Upstream") || md.contains("### Upstream"), "{md}");
    assert!(md.contains(&format!("![Chart]({base}/wide.png)")), "{md}");
    assert!(!md.contains("data:image"));
    assert_eq!(output.title, "Rivers of the North & more");
}

#[tokio::test]
async fn all_failures_is_fatal() {
    let base = fixture_server().await;
    let config = local_config().format(OutputFormat::Markdown).build().unwrap();
    let err = convert(&[format!("{base}/nope"), format!("{base}/gone")], &config)
        .await
        .unwrap_err();
    assert!(matches!(err, DeckleError::NoArticlesConverted { total: 2 }));
}

// ── Fetch limits ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn http_errors_surface_for_single_urls() {
    let base = fixture_server().await;
    let config = local_config().build().unwrap();
    let err = convert(&[format!("{base}/missing")], &config).await.unwrap_err();
    assert!(matches!(err, DeckleError::HttpStatus { status: 404, .. }), "{err}");
}

#[tokio::test]
async fn response_size_cap() {
    let base = fixture_server().await;
    let config = local_config().max_response_bytes(256).build().unwrap();
    let err = convert(&[format!("{base}/rivers")], &config).await.unwrap_err();
    assert!(matches!(err, DeckleError::ResponseTooLarge { .. }), "{err}");
    assert!(err
        .to_string()
        .contains("response body exceeds maximum allowed size"));
}

#[tokio::test]
async fn private_addresses_are_blocked() {
    let base = fixture_server().await;
    let config = DeckleConfig::builder()
        .allow_private_network(false)
        .build()
        .unwrap();
    let err = convert(&[format!("{base}/rivers")], &config).await.unwrap_err();
    assert!(matches!(err, DeckleError::BlockedDestination { .. }), "{err}");
}

#[tokio::test]
async fn images_are_substituted_in_document_order() {
    let base = serve(|_| {
        vec![
            png_route("/slow.png", png(40, 10), Duration::from_millis(400)),
            png_route("/fast.png", png(20, 10), Duration::ZERO),
        ]
    })
    .await;
    let config = local_config().concurrency(3).build().unwrap();
    let html = format!(
        r#"<p><img src="{base}/slow.png" alt="slow"/><img src="{base}/fast.png" alt="fast"/><img src="{base}/gone.png" alt="gone"/></p>"#
    );

    let out = deckle::pipeline::images::process_article_images(&html, &context(&config)).await;

    let srcs: Vec<&str> = out
        .split("<img")
        .skip(1)
        .filter_map(|tag| tag.split("src=\"").nth(1)?.split('"').next())
        .collect();
    assert_eq!(srcs.len(), 3, "{out}");
    let width = |src: &str| {
        let b64 = src.strip_prefix("data:image/jpeg;base64,").expect("embedded jpeg");
        let bytes = base64::engine::general_purpose::STANDARD.decode(b64).unwrap();
        image::load_from_memory(&bytes).unwrap().width()
    };
    // the slow first image still lands first
    assert_eq!(width(srcs[0]), 40);
    assert_eq!(width(srcs[1]), 20);
    assert_eq!(srcs[2], format!("{base}/gone.png"));
}

// ── Progress and streaming ───────────────────────────────────────────────────

#[derive(Default)]
struct Tracker {
    runs: AtomicUsize,
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    images_found: AtomicUsize,
    images_done: AtomicUsize,
}

impl ProgressCallback for Tracker {
    fn on_run_start(&self, _total: usize) {
        self.runs.fetch_add(1, Ordering::SeqCst);
    }
    fn on_article_start(&self, _index: usize, _url: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn on_article_complete(&self, _index: usize, _title: &str) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_article_failed(&self, _index: usize, _url: &str, _error: &str) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
    fn on_images_found(&self, count: usize) {
        self.images_found.fetch_add(count, Ordering::SeqCst);
    }
    fn on_image_done(&self) {
        self.images_done.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_events_are_reported() {
    let base = fixture_server().await;
    let tracker = Arc::new(Tracker::default());
    let config = local_config()
        .format(OutputFormat::Epub)
        .cover(CoverStyle::None)
        .progress_callback(tracker.clone())
        .build()
        .unwrap();

    convert(
        &[format!("{base}/rivers"), format!("{base}/missing"), format!("{base}/lakes")],
        &config,
    )
    .await
    .unwrap();

    assert_eq!(tracker.runs.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.started.load(Ordering::SeqCst), 3);
    assert_eq!(tracker.completed.load(Ordering::SeqCst), 2);
    assert_eq!(tracker.failed.load(Ordering::SeqCst), 1);
    assert!(tracker.images_found.load(Ordering::SeqCst) >= 1);
    assert!(tracker.images_done.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn stream_yields_every_article() {
    let base = fixture_server().await;
    let config = local_config().article_concurrency(2).build().unwrap();
    let urls = vec![
        format!("{base}/lakes"),
        format!("{base}/missing"),
        format!("{base}/rivers"),
    ];

    let mut items: Vec<_> = article_stream(urls, &config).unwrap().collect().await;
    items.sort_by_key(|(i, _)| *i);

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].1.as_ref().unwrap().title, "Lakes and Ponds");
    assert!(items[1].1.is_err());
    assert_eq!(items[2].1.as_ref().unwrap().title, "Rivers of the North");
}
