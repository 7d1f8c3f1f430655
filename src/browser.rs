use crate::error::{AggregatorError, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Process-wide headless browser with a bounded page pool.
///
/// One Chromium instance serves every aggregation run; concurrent page
/// count is capped by a semaphore and each page is closed on every exit
/// path, including navigation failures and timeouts.
pub struct BrowserPool {
    browser: Mutex<Browser>,
    pages: Semaphore,
    nav_timeout: Duration,
    selector_timeout: Duration,
    _handler_task: JoinHandle<()>,
}

impl BrowserPool {
    pub async fn launch(
        max_pages: usize,
        nav_timeout: Duration,
        selector_timeout: Duration,
    ) -> Result<Arc<Self>> {
        let config = BrowserConfig::builder()
            .build()
            .map_err(AggregatorError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AggregatorError::Browser(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler event error");
                }
            }
            debug!("browser handler stream ended");
        });

        info!(max_pages, "launched headless browser");

        Ok(Arc::new(Self {
            browser: Mutex::new(browser),
            pages: Semaphore::new(max_pages.max(1)),
            nav_timeout,
            selector_timeout,
            _handler_task: handler_task,
        }))
    }

    /// Navigate to `url`, optionally wait for a selector to appear, and
    /// return the rendered document. Errors come back as plain messages so
    /// the fetcher can scan them for embedded HTTP statuses.
    pub async fn render(&self, url: &str, wait_for_selector: Option<&str>) -> std::result::Result<String, String> {
        let _permit = self
            .pages
            .acquire()
            .await
            .map_err(|_| "browser pool is shut down".to_string())?;

        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| format!("page creation failed: {e}"))?
        };

        let outcome = self.drive(&page, url, wait_for_selector).await;

        if let Err(e) = page.close().await {
            warn!(url, error = %e, "failed to close browser page");
        }

        outcome
    }

    async fn drive(
        &self,
        page: &Page,
        url: &str,
        wait_for_selector: Option<&str>,
    ) -> std::result::Result<String, String> {
        let navigation = async {
            page.goto(url).await.map_err(|e| format!("navigation failed: {e}"))?;
            page.wait_for_navigation()
                .await
                .map_err(|e| format!("navigation failed: {e}"))?;
            Ok::<(), String>(())
        };
        tokio::time::timeout(self.nav_timeout, navigation)
            .await
            .map_err(|_| format!("navigation timed out after {:?}", self.nav_timeout))??;

        if let Some(selector) = wait_for_selector {
            self.wait_for_selector(page, url, selector).await?;
        }

        tokio::time::timeout(self.nav_timeout, page.content())
            .await
            .map_err(|_| "content capture timed out".to_string())?
            .map_err(|e| format!("content capture failed: {e}"))
    }

    /// Poll for a selector with its own sub-timeout. Sites that never
    /// produce the element fail the fetch rather than hanging the run.
    async fn wait_for_selector(&self, page: &Page, url: &str, selector: &str) -> std::result::Result<(), String> {
        let deadline = tokio::time::Instant::now() + self.selector_timeout;
        loop {
            if page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                debug!(url, selector, "selector never appeared");
                return Err(format!(
                    "selector `{selector}` not found within {:?}",
                    self.selector_timeout
                ));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    pub async fn shutdown(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            error!(error = %e, "browser shutdown failed");
        }
    }
}
