pub mod compress;
pub mod strategies;

pub use compress::{compress_image, decode_data_uri, CompressedImage};

use crate::error::EnrichmentError;
use crate::fetcher::Fetcher;
use std::sync::Arc;
use tracing::{debug, warn};

use strategies::Strategy;

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub is_header: bool,
    /// Pre-rendered page DOM, when the caller already fetched it. Saves
    /// the DOM-based strategies a second render of the same page.
    pub page_html: Option<String>,
}

/// Ordered-strategy image extraction.
///
/// Walks the strategy chain in its fixed order, gated per strategy by
/// `can_handle`, and returns the first hit. A `SkipArticle` from any
/// strategy aborts the chain; every other strategy error is logged and
/// the chain continues.
pub struct ImageExtractor {
    fetcher: Arc<Fetcher>,
}

impl ImageExtractor {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn extract(
        &self,
        url: &str,
        opts: &ExtractOptions,
    ) -> Result<Option<CompressedImage>, EnrichmentError> {
        // The DOM is fetched at most once, lazily, and shared by every
        // strategy that needs it.
        let mut page_html: Option<String> = opts.page_html.clone();

        for strategy in Strategy::ORDER {
            if !strategy.can_handle(url) {
                continue;
            }

            let outcome = match strategy {
                Strategy::DirectImage => strategies::run_direct_image(&self.fetcher, url, opts.is_header).await,
                Strategy::YoutubeThumbnail => {
                    strategies::run_youtube_thumbnail(&self.fetcher, url, opts.is_header).await
                }
                Strategy::Twitter => match self.page_html(&mut page_html, url).await {
                    Ok(html) => strategies::run_twitter(&self.fetcher, url, html, opts.is_header).await,
                    Err(e) => Err(e),
                },
                Strategy::MetaTags => match self.page_html(&mut page_html, url).await {
                    Ok(html) => strategies::run_meta_tags(&self.fetcher, url, html, opts.is_header).await,
                    Err(e) => Err(e),
                },
                Strategy::InlineSvg => match self.page_html(&mut page_html, url).await {
                    Ok(html) => strategies::run_inline_svg(html),
                    Err(e) => Err(e),
                },
                Strategy::PageImages => match self.page_html(&mut page_html, url).await {
                    Ok(html) => strategies::run_page_images(&self.fetcher, url, html, opts.is_header).await,
                    Err(e) => Err(e),
                },
            };

            match outcome {
                Ok(Some(image)) => {
                    debug!(url, strategy = strategy.name(), "image extracted");
                    return Ok(Some(image));
                }
                Ok(None) => continue,
                Err(e) if e.is_skip() => return Err(e.at_step("extract_images")),
                Err(e) => {
                    warn!(url, strategy = strategy.name(), error = %e, "image strategy failed, trying next");
                }
            }
        }

        debug!(url, "no image strategy produced a result");
        Ok(None)
    }

    async fn page_html<'a>(
        &self,
        cache: &'a mut Option<String>,
        url: &str,
    ) -> Result<&'a str, EnrichmentError> {
        if cache.is_none() {
            *cache = Some(strategies::fetch_page_html(&self.fetcher, url).await?);
        }
        Ok(cache.as_deref().expect("just populated"))
    }
}
