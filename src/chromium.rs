//! Chromium binding for the browser capabilities
//!
//! Launches one headless Chrome process per run through `chromiumoxide` and
//! drives the Chrome DevTools Protocol handler on a background task.

use crate::browser::{BrowserLauncher, BrowserPage, BrowserSession, Navigation};
use crate::config::{create_browser_config, ChromeConfig};
use crate::error::BrowserError;
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ChromiumLauncher {
    config: ChromeConfig,
}

impl ChromiumLauncher {
    pub fn new(config: ChromeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>, BrowserError> {
        let browser_config = create_browser_config(&self.config)
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        // The handler implements Stream and must be polled for the browser to
        // make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Chrome DevTools handler error: {}", e);
                }
            }
            debug!("Chrome DevTools handler stream ended");
        });

        info!("Browser launched");
        Ok(Arc::new(ChromiumSession {
            browser: Mutex::new(browser),
            handler: handler_task,
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct ChromiumSession {
    browser: Mutex<Browser>,
    handler: tokio::task::JoinHandle<()>,
    closed: AtomicBool,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, BrowserError> {
        let browser = self.browser.lock().await;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::PageError(e.to_string()))?;
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        let _ = browser.wait().await;
        self.handler.abort();
        info!("Browser closed");
    }
}

pub struct ChromiumPage {
    page: Page,
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn navigate(&self, url: &str) -> Result<Navigation, BrowserError> {
        self.page.goto(url).await?;

        let request = self.page.wait_for_navigation_response().await?;
        let (status, redirect_count) = match request.as_deref() {
            Some(request) => (
                request
                    .response
                    .as_ref()
                    .and_then(|response| u16::try_from(response.status).ok()),
                request.redirect_chain.len(),
            ),
            None => (None, 0),
        };

        Ok(Navigation {
            status,
            redirect_count,
        })
    }

    async fn wait_for_selector(&self, selector: &str) -> Result<(), BrowserError> {
        // Bounded by the caller's timeout.
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn content(&self) -> Result<String, BrowserError> {
        self.page
            .content()
            .await
            .map_err(|e| BrowserError::PageError(e.to_string()))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();

        self.page
            .screenshot(params)
            .await
            .map_err(|e| BrowserError::CaptureFailed(e.to_string()))
    }

    async fn current_url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    async fn close(&self) {
        if let Err(e) = self.page.clone().close().await {
            debug!("Failed to close tab: {}", e);
        }
    }
}
