//! Browser-automation capabilities consumed by the link checker
//!
//! The checker never talks to Chrome directly. It launches a
//! [`BrowserSession`] through a [`BrowserLauncher`], opens one
//! [`BrowserPage`] (tab) per link and closes it when the link is done.
//! [`crate::chromium`] provides the Chromium binding.

use crate::error::BrowserError;
use crate::metrics;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

static OPEN_TABS: AtomicUsize = AtomicUsize::new(0);

/// What the browser reports after navigating to a URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigation {
    /// Status of the final response, `None` when no HTTP response was seen.
    pub status: Option<u16>,
    /// Number of redirects followed before the final response.
    pub redirect_count: usize,
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>, BrowserError>;
}

/// A running browser process shared by all tabs of one run.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, BrowserError>;

    async fn close(&self);
}

/// A single tab. Owned by exactly one task for its lifetime.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<Navigation, BrowserError>;

    async fn wait_for_selector(&self, selector: &str) -> Result<(), BrowserError>;

    /// Serialized DOM of the rendered page.
    async fn content(&self) -> Result<String, BrowserError>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError>;

    async fn current_url(&self) -> Option<String>;

    async fn close(&self);
}

/// Scoped ownership of a tab
///
/// Callers should `close().await` the guard on the way out. If the owning
/// future is dropped first (cancellation, panic unwinding), the guard schedules
/// the close on the runtime instead.
pub struct TabGuard {
    page: Arc<dyn BrowserPage>,
    closed: bool,
}

impl TabGuard {
    pub fn new(page: Box<dyn BrowserPage>) -> Self {
        metrics::set_active_tabs(OPEN_TABS.fetch_add(1, Ordering::Relaxed) + 1);
        Self {
            page: Arc::from(page),
            closed: false,
        }
    }

    pub fn page(&self) -> &dyn BrowserPage {
        self.page.as_ref()
    }

    pub async fn close(mut self) {
        self.closed = true;
        self.page.close().await;
        tab_released();
    }
}

fn tab_released() {
    let previous = OPEN_TABS.fetch_sub(1, Ordering::Relaxed);
    metrics::set_active_tabs(previous.saturating_sub(1));
}

impl Drop for TabGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        debug!("Tab dropped without explicit close, closing in background");
        tab_released();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let page = self.page.clone();
            handle.spawn(async move {
                page.close().await;
            });
        }
    }
}
