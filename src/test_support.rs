//! Scripted browser fakes shared by the unit and end-to-end tests.

use crate::browser::{BrowserLauncher, BrowserPage, BrowserSession, Navigation};
use crate::error::BrowserError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted navigation outcome.
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond {
        status: Option<u16>,
        redirects: usize,
        delay: Duration,
    },
    Fail(BrowserError),
    Panic,
}

impl Scripted {
    pub fn status(status: u16) -> Self {
        Scripted::Respond {
            status: Some(status),
            redirects: 0,
            delay: Duration::ZERO,
        }
    }

    pub fn redirected(status: u16, redirects: usize) -> Self {
        Scripted::Respond {
            status: Some(status),
            redirects,
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(status: u16, millis: u64) -> Self {
        Scripted::Respond {
            status: Some(status),
            redirects: 0,
            delay: Duration::from_millis(millis),
        }
    }

    pub fn no_response() -> Self {
        Scripted::Respond {
            status: None,
            redirects: 0,
            delay: Duration::ZERO,
        }
    }

    pub fn error(error: BrowserError) -> Self {
        Scripted::Fail(error)
    }
}

#[derive(Default)]
struct PageState {
    /// Outcomes per URL, consumed in order. The last one repeats.
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    html: Mutex<String>,
    missing_selectors: Mutex<Vec<String>>,
    fixed_url: Mutex<Option<String>>,
    navigations: AtomicUsize,
    navigated: Mutex<Vec<String>>,
    screenshots: AtomicUsize,
    tabs_opened: AtomicUsize,
    tabs_closed: AtomicUsize,
    open_tabs: AtomicUsize,
    max_open_tabs: AtomicUsize,
}

impl PageState {
    fn next_outcome(&self, url: &str) -> Scripted {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| Scripted::status(200)),
            None => Scripted::status(200),
        }
    }

    fn tab_opened(&self) {
        self.tabs_opened.fetch_add(1, Ordering::SeqCst);
        let open = self.open_tabs.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open_tabs.fetch_max(open, Ordering::SeqCst);
    }
}

/// Builder methods shared by [`FakePage`] and [`FakeBrowser`].
macro_rules! scripting {
    () => {
        pub fn script(self, url: &str, outcomes: Vec<Scripted>) -> Self {
            self.state
                .scripts
                .lock()
                .unwrap()
                .insert(url.to_string(), outcomes.into());
            self
        }

        pub fn with_html(self, html: &str) -> Self {
            *self.state.html.lock().unwrap() = html.to_string();
            self
        }

        pub fn without_selector(self, selector: &str) -> Self {
            self.state
                .missing_selectors
                .lock()
                .unwrap()
                .push(selector.to_string());
            self
        }

        /// Reports `url` as the current URL regardless of navigation.
        pub fn at_url(self, url: &str) -> Self {
            *self.state.fixed_url.lock().unwrap() = Some(url.to_string());
            self
        }

        pub fn navigations(&self) -> usize {
            self.state.navigations.load(Ordering::SeqCst)
        }

        pub fn navigated(&self) -> Vec<String> {
            self.state.navigated.lock().unwrap().clone()
        }

        pub fn screenshot_calls(&self) -> usize {
            self.state.screenshots.load(Ordering::SeqCst)
        }

        pub fn tabs_closed(&self) -> usize {
            self.state.tabs_closed.load(Ordering::SeqCst)
        }
    };
}

pub struct FakePage {
    state: Arc<PageState>,
    current: Mutex<Option<String>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::with_state(Arc::new(PageState::default()))
    }

    fn with_state(state: Arc<PageState>) -> Self {
        Self {
            state,
            current: Mutex::new(None),
        }
    }

    scripting!();
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn navigate(&self, url: &str) -> Result<Navigation, BrowserError> {
        self.state.navigations.fetch_add(1, Ordering::SeqCst);
        self.state.navigated.lock().unwrap().push(url.to_string());

        match self.state.next_outcome(url) {
            Scripted::Respond {
                status,
                redirects,
                delay,
            } => {
                tokio::time::sleep(delay).await;
                *self.current.lock().unwrap() = Some(url.to_string());
                Ok(Navigation {
                    status,
                    redirect_count: redirects,
                })
            }
            Scripted::Fail(error) => Err(error),
            Scripted::Panic => panic!("scripted panic navigating to {url}"),
        }
    }

    async fn wait_for_selector(&self, selector: &str) -> Result<(), BrowserError> {
        let missing = self
            .state
            .missing_selectors
            .lock()
            .unwrap()
            .iter()
            .any(|s| s == selector);
        if missing {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn content(&self) -> Result<String, BrowserError> {
        Ok(self.state.html.lock().unwrap().clone())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        self.state.screenshots.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn current_url(&self) -> Option<String> {
        let fixed = self.state.fixed_url.lock().unwrap().clone();
        fixed.or_else(|| self.current.lock().unwrap().clone())
    }

    async fn close(&self) {
        self.state.tabs_closed.fetch_add(1, Ordering::SeqCst);
        self.state.open_tabs.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Browser whose tabs all share one script.
pub struct FakeBrowser {
    state: Arc<PageState>,
    /// Tabs beyond this many fail to open.
    tab_limit: Option<usize>,
    close_calls: AtomicUsize,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            state: Arc::new(PageState::default()),
            tab_limit: None,
            close_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_tabs_after(mut self, opened: usize) -> Self {
        self.tab_limit = Some(opened);
        self
    }

    scripting!();

    pub fn tabs_opened(&self) -> usize {
        self.state.tabs_opened.load(Ordering::SeqCst)
    }

    pub fn max_open_tabs(&self) -> usize {
        self.state.max_open_tabs.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, BrowserError> {
        if let Some(limit) = self.tab_limit {
            if self.state.tabs_opened.load(Ordering::SeqCst) >= limit {
                return Err(BrowserError::PageError("too many tabs".to_string()));
            }
        }
        self.state.tab_opened();
        Ok(Box::new(FakePage::with_state(self.state.clone())))
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeLauncher {
    browser: Option<Arc<FakeBrowser>>,
}

impl FakeLauncher {
    pub fn new(browser: Arc<FakeBrowser>) -> Self {
        Self {
            browser: Some(browser),
        }
    }

    pub fn failing() -> Self {
        Self { browser: None }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Arc<dyn BrowserSession>, BrowserError> {
        match &self.browser {
            Some(browser) => Ok(browser.clone() as Arc<dyn BrowserSession>),
            None => Err(BrowserError::LaunchFailed("chrome not found".to_string())),
        }
    }
}
