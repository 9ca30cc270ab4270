//! HTTP fetching: article pages and their images.
//!
//! One pooled [`reqwest::Client`] serves a whole run. It carries the
//! configured timeout, proxy and user agent, and the SSRF guard from
//! [`super::ssrf`]. Bodies are streamed and capped at
//! `max_response_bytes`; the cap trips after reading `cap + 1` bytes.

use std::fmt::Display;
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::Url;
use tracing::{debug, info};

use super::ssrf;
use crate::config::DeckleConfig;
use crate::error::DeckleError;

/// A fetched article page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: Url,
    pub html: String,
}

/// A fetched image and its MIME type.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// Shared HTTP client plus the limits of the run.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout_secs: u64,
    max_response_bytes: u64,
    allow_private: bool,
}

impl Fetcher {
    /// Build the client from the run configuration.
    pub fn new(config: &DeckleConfig) -> Result<Self, DeckleError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .redirect(ssrf::redirect_policy(config.allow_private_network));

        let mut proxy_host = None;
        if let Some(ref proxy) = config.proxy {
            let p = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| DeckleError::InvalidConfig(format!("invalid proxy '{proxy}': {e}")))?;
            proxy_host = Url::parse(proxy)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string));
            builder = builder.proxy(p);
        } else {
            builder = builder.no_proxy();
        }

        if !config.allow_private_network {
            builder = builder.dns_resolver(ssrf::SsrfResolver::new(proxy_host));
        }

        let client = builder.build().map_err(|e| DeckleError::NetworkFailure {
            url: String::new(),
            reason: format!("building HTTP client: {e}"),
        })?;

        Ok(Self {
            client,
            timeout_secs: config.timeout_secs,
            max_response_bytes: config.max_response_bytes,
            allow_private: config.allow_private_network,
        })
    }

    /// Download an article page with browser-like headers.
    pub async fn fetch_html(&self, raw_url: &str) -> Result<FetchedPage, DeckleError> {
        let url = self.parse_url(raw_url)?;
        let response = self
            .client
            .get(url.clone())
            .headers(page_headers())
            .send()
            .await
            .map_err(|e| self.classify(raw_url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeckleError::HttpStatus {
                url: raw_url.to_string(),
                status: status.as_u16(),
            });
        }
        let final_url = response.url().clone();
        let body = read_limited(Box::pin(response.bytes_stream()), self.max_response_bytes)
            .await
            .map_err(|e| self.body_error(raw_url, e))?;

        info!("Fetched {} ({})", raw_url, human_size(body.len() as u64));
        Ok(FetchedPage {
            url: final_url,
            html: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    /// Download an image. `raw_url` may still carry HTML entities (`&amp;`).
    pub async fn fetch_image(&self, raw_url: &str) -> Result<FetchedImage, DeckleError> {
        let unescaped = crate::dom::unescape(raw_url);
        let url = self.parse_url(&unescaped)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(&unescaped, e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(DeckleError::HttpStatus {
                url: unescaped.into_owned(),
                status: status.as_u16(),
            });
        }
        let header_mime = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = read_limited(Box::pin(response.bytes_stream()), self.max_response_bytes)
            .await
            .map_err(|e| self.body_error(&unescaped, e))?;

        let mime = detect_mime(header_mime.as_deref(), &bytes);
        debug!(url = %unescaped, mime = %mime, size = bytes.len(), "fetched image");
        Ok(FetchedImage { bytes, mime })
    }

    fn parse_url(&self, raw: &str) -> Result<Url, DeckleError> {
        let url = Url::parse(raw).map_err(|e| DeckleError::InvalidInput {
            input: raw.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DeckleError::InvalidInput {
                input: raw.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        ssrf::check_url(&url, self.allow_private)?;
        Ok(url)
    }

    fn classify(&self, url: &str, e: reqwest::Error) -> DeckleError {
        if let Some(host) = ssrf::blocked_host(&e) {
            return DeckleError::BlockedDestination { host };
        }
        if e.is_timeout() {
            return DeckleError::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            };
        }
        DeckleError::NetworkFailure {
            url: url.to_string(),
            reason: error_chain(&e),
        }
    }

    fn body_error(&self, url: &str, e: BodyError) -> DeckleError {
        match e {
            BodyError::TooLarge { limit } => DeckleError::ResponseTooLarge {
                url: url.to_string(),
                limit: human_size(limit),
            },
            BodyError::Read(reason) => DeckleError::NetworkFailure {
                url: url.to_string(),
                reason: format!("reading response: {reason}"),
            },
        }
    }
}

fn page_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    h.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    h.insert("Sec-Fetch-Dest", HeaderValue::from_static("document"));
    h.insert("Sec-Fetch-Mode", HeaderValue::from_static("navigate"));
    h.insert("Sec-Fetch-Site", HeaderValue::from_static("none"));
    h
}

/// Render an error with its source chain, `a: b: c`.
fn error_chain(e: &(dyn std::error::Error + 'static)) -> String {
    let mut msg = e.to_string();
    let mut cur = e.source();
    while let Some(s) = cur {
        let part = s.to_string();
        if !msg.contains(&part) {
            msg.push_str(": ");
            msg.push_str(&part);
        }
        cur = s.source();
    }
    msg
}

/// Why reading a body stopped.
#[derive(Debug)]
pub enum BodyError {
    TooLarge { limit: u64 },
    Read(String),
}

/// Collect a byte stream, failing once more than `limit` bytes arrived.
/// A `limit` of 0 disables the cap.
pub async fn read_limited<S, B, E>(mut stream: S, limit: u64) -> Result<Vec<u8>, BodyError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| BodyError::Read(e.to_string()))?;
        let chunk = chunk.as_ref();
        if limit > 0 {
            let room = (limit + 1).saturating_sub(buf.len() as u64) as usize;
            buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if buf.len() as u64 > limit {
                return Err(BodyError::TooLarge { limit });
            }
        } else {
            buf.extend_from_slice(chunk);
        }
    }
    Ok(buf)
}

/// MIME type from a `Content-Type` header, sniffed from the bytes when the
/// header is missing or generic.
pub fn detect_mime(content_type: Option<&str>, bytes: &[u8]) -> String {
    let declared = content_type
        .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_string())
        .unwrap_or_default();
    if !declared.is_empty() && declared != "application/octet-stream" {
        return declared;
    }
    sniff_mime(bytes).to_string()
}

/// Content sniffing for the image formats the pipeline cares about.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type();
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]).to_ascii_lowercase();
    let head = head.trim_start();
    if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
        "image/svg+xml"
    } else if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" && &bytes[8..12] == b"avif" {
        "image/avif"
    } else if head.starts_with("<!doctype html") || head.starts_with("<html") {
        "text/html"
    } else {
        "application/octet-stream"
    }
}

/// Human-readable byte count: `1.5MB`.
pub fn human_size(n: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut f = n as f64;
    for unit in UNITS {
        if f < 1024.0 {
            return format!("{f:.1}{unit}");
        }
        f /= 1024.0;
    }
    format!("{:.1}{}", f * 1024.0, UNITS[UNITS.len() - 1])
}
