//! Streaming API: emit articles as they finish.
//!
//! Unlike [`crate::convert::convert`], which waits for the whole reading
//! list and renders one document, [`article_stream`] yields each processed
//! [`Article`] as soon as it is ready. Items arrive in completion order;
//! sort by the index if order matters.

use std::pin::Pin;

use futures::stream::{self, StreamExt};
use tokio_stream::Stream;
use tracing::{info, warn};

use crate::config::DeckleConfig;
use crate::convert::{article_title_override, image_context, process_url};
use crate::error::{ArticleError, DeckleError};
use crate::output::Article;

/// A boxed stream of `(index, result)` pairs; `index` is 1-based.
pub type ArticleStream =
    Pin<Box<dyn Stream<Item = (usize, Result<Article, ArticleError>)> + Send>>;

/// Process `urls`, yielding articles in completion order.
///
/// At most `config.article_concurrency` articles are in flight.
///
/// # Errors
/// Only setup failures (the HTTP client could not be built). Per-article
/// failures arrive as `Err(ArticleError)` items.
pub fn article_stream(
    urls: Vec<String>,
    config: &DeckleConfig,
) -> Result<ArticleStream, DeckleError> {
    let ctx = image_context(config)?;
    let total = urls.len();
    let title_override = article_title_override(config, total);
    info!("Starting streaming run: {} URL(s)", total);

    let s = stream::iter(urls.into_iter().enumerate().map(move |(i, url)| {
        let ctx = ctx.clone();
        let title_override = title_override.clone();
        async move {
            let index = i + 1;
            ctx.progress.on_article_start(index, &url);
            let result = process_url(index, &url, title_override.as_deref(), &ctx).await;
            let item = match result {
                Ok(article) => {
                    ctx.progress.on_article_complete(index, &article.title);
                    Ok(article)
                }
                Err(e) => {
                    warn!("{url}: {e} (skipping)");
                    ctx.progress.on_article_failed(index, &url, &e.to_string());
                    Err(ArticleError::new(index, url, &e))
                }
            };
            (index, item)
        }
    }))
    .buffer_unordered(config.article_concurrency);

    Ok(Box::pin(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failures_are_items_not_errors() {
        let config = DeckleConfig::builder()
            .allow_private_network(false)
            .article_concurrency(2)
            .build()
            .unwrap();
        let urls = vec!["ftp://example.com/a".to_string(), "http://127.0.0.1:1/".to_string()];
        let stream = article_stream(urls, &config).unwrap();
        let mut items: Vec<_> = stream.collect().await;
        items.sort_by_key(|(i, _)| *i);

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].0, 1);
        assert!(items.iter().all(|(_, r)| r.is_err()));
        let err = items[1].1.as_ref().unwrap_err();
        assert_eq!(err.url, "http://127.0.0.1:1/");
    }

    #[tokio::test]
    async fn empty_list_yields_nothing() {
        let config = DeckleConfig::default();
        let stream = article_stream(Vec::new(), &config).unwrap();
        assert_eq!(stream.count().await, 0);
    }
}
