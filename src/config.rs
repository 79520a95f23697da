//! Configuration management with serde serialization/deserialization
//!
//! This module provides the run options consumed by the link checker and the
//! Chrome launch settings used by the bundled browser binding.

use crate::error::ConfigError;
use crate::policy::ExpectedStatus;
use crate::utils::{normalize_url, validate_url};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Options for a single link-checking run
///
/// Every field except `origin_url` has a default, so a JSON document only
/// needs to name what it changes.
///
/// # Examples
///
/// ```rust
/// use linkprobe::{CaptureCondition, CheckerOptions, LinkOrder};
///
/// let options: CheckerOptions = serde_json::from_str(
///     r#"{ "origin_url": "https://example.com", "link_order": "RANDOM" }"#,
/// ).unwrap();
///
/// assert_eq!(options.link_limit, 50);
/// assert_eq!(options.link_order, LinkOrder::Random);
/// assert_eq!(options.screenshot_options.capture_condition, CaptureCondition::Failing);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CheckerOptions {
    /// Page whose links are checked; navigated and rendered first.
    pub origin_url: String,

    /// Maximum number of followed links checked (default: 50)
    ///
    /// Zero disables follow-link checks entirely; the origin is still checked.
    pub link_limit: usize,

    /// How scraped links are picked when more exist than `link_limit`.
    pub link_order: LinkOrder,

    /// CSS selector matching link-bearing elements (default: `"a"`).
    pub query_selector_all: String,

    /// Attributes holding link targets, tried in order (default: `["href"]`).
    pub get_attributes: Vec<String>,

    /// Timeout for each navigation attempt in milliseconds (default: 30000)
    pub link_timeout_millis: u64,

    /// Additional attempts after a transient failure (default: 0)
    pub max_retries: usize,

    /// Longest redirect chain accepted before a link fails (default: 10)
    pub max_redirects: usize,

    /// Selector awaited on the origin page before links are scraped.
    pub wait_for_selector: Option<String>,

    /// Number of links checked at the same time, one tab each (default: 5)
    pub concurrency: usize,

    /// Expected status for followed links without a per-link override.
    ///
    /// When unset, followed links are expected to answer with a 2xx status.
    pub followed_link_expected_status: Option<ExpectedStatus>,

    pub screenshot_options: ScreenshotOptions,

    /// Overrides keyed by exact absolute URL.
    pub per_link_options: BTreeMap<String, PerLinkOption>,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            origin_url: String::new(),
            link_limit: 50,
            link_order: LinkOrder::FirstN,
            query_selector_all: "a".to_string(),
            get_attributes: vec!["href".to_string()],
            link_timeout_millis: 30_000,
            max_retries: 0,
            max_redirects: 10,
            wait_for_selector: None,
            concurrency: 5,
            followed_link_expected_status: None,
            screenshot_options: ScreenshotOptions::default(),
            per_link_options: BTreeMap::new(),
        }
    }
}

impl CheckerOptions {
    pub fn for_origin(origin_url: impl Into<String>) -> Self {
        Self {
            origin_url: origin_url.into(),
            ..Default::default()
        }
    }

    /// Checks bounds and fills in defaults for blank fields.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.origin_url = self.origin_url.trim().to_string();
        if self.origin_url.is_empty() {
            return Err(ConfigError::MissingOrigin);
        }
        validate_url(&self.origin_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.origin_url.clone(),
            reason: e.to_string(),
        })?;

        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "concurrency",
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.link_timeout_millis == 0 {
            return Err(ConfigError::InvalidValue {
                field: "link_timeout_millis",
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.query_selector_all.trim().is_empty() {
            self.query_selector_all = "a".to_string();
        }
        scraper::Selector::parse(&self.query_selector_all).map_err(|e| {
            ConfigError::InvalidValue {
                field: "query_selector_all",
                reason: e.to_string(),
            }
        })?;

        self.get_attributes.retain(|attr| !attr.trim().is_empty());
        if self.get_attributes.is_empty() {
            self.get_attributes = vec!["href".to_string()];
        }

        if self
            .wait_for_selector
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            self.wait_for_selector = None;
        }

        // Keys are matched against scraped targets, which carry no fragment.
        let mut per_link_options = BTreeMap::new();
        for (url, link_override) in std::mem::take(&mut self.per_link_options) {
            let key = normalize_url(&url).map_err(|reason| ConfigError::InvalidUrl {
                url: url.clone(),
                reason,
            })?;
            if link_override.link_timeout_millis == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "per_link_options.link_timeout_millis",
                    reason: format!("must be greater than 0 for {url}"),
                });
            }
            per_link_options.insert(key, link_override);
        }
        self.per_link_options = per_link_options;

        Ok(self)
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_millis)
    }

    /// The longest budget any single navigation may be given.
    pub fn max_link_timeout(&self) -> Duration {
        self.per_link_options
            .values()
            .filter_map(|o| o.link_timeout_millis)
            .map(Duration::from_millis)
            .fold(self.link_timeout(), Duration::max)
    }

    pub fn screenshots_enabled(&self) -> bool {
        self.screenshot_options.capture_condition != CaptureCondition::None
    }
}

/// Order in which scraped links are considered before truncation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkOrder {
    /// Keep document order and take the first `link_limit` links
    #[default]
    FirstN,
    /// Shuffle before taking `link_limit` links
    Random,
}

/// When a screenshot of a checked link is captured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureCondition {
    /// After every link check
    Always,
    /// Only when the link failed (default)
    #[default]
    Failing,
    /// Never
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScreenshotOptions {
    pub capture_condition: CaptureCondition,

    /// `<bucket>[/<folder>...]`; empty selects the default bucket for the
    /// project and region.
    pub storage_location: String,
}

/// Per-URL override of the global timeout and expected status
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PerLinkOption {
    pub link_timeout_millis: Option<u64>,
    pub expected_status_code: Option<ExpectedStatus>,
}

const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// Chrome launch settings for the bundled browser binding
///
/// # Examples
///
/// ```rust
/// use linkprobe::ChromeConfig;
///
/// let config = ChromeConfig {
///     chrome_path: Some("/usr/bin/chromium".to_string()),
///     ..Default::default()
/// };
/// assert_eq!(config.viewport.width, 1920);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChromeConfig {
    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Browser viewport used for rendering and screenshots
    pub viewport: Viewport,

    /// Custom User-Agent string for navigations
    pub user_agent: Option<String>,

    /// Time allowed for the browser process to come up
    pub launch_timeout: Duration,

    /// CDP request deadline. Kept above every link timeout so the checker's
    /// own per-link budget is the one that fires.
    pub request_timeout: Duration,
}

impl ChromeConfig {
    /// Raises `request_timeout` past the longest link timeout in `options`.
    pub fn covering(mut self, options: &CheckerOptions) -> Self {
        let needed = options.max_link_timeout() + REQUEST_TIMEOUT_MARGIN;
        self.request_timeout = self.request_timeout.max(needed);
        self
    }
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            viewport: Viewport::default(),
            user_agent: None,
            launch_timeout: Duration::from_secs(20),
            request_timeout: Duration::from_secs(30) + REQUEST_TIMEOUT_MARGIN,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Viewport {
    /// Viewport width in pixels (default: 1920)
    pub width: u32,

    /// Viewport height in pixels (default: 1080)
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Generate Chrome command-line arguments for a headless probe run
///
/// Each launch gets its own user data directory so concurrent runs on one
/// host never share a profile.
pub fn get_chrome_args(config: &ChromeConfig) -> Vec<String> {
    let unique_id = format!("{}-{}", std::process::id(), uuid::Uuid::new_v4());

    let mut args = vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-features=TranslateUI".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
        format!("--user-data-dir=/tmp/linkprobe-chrome-{unique_id}"),
    ];

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

pub fn create_browser_config(
    config: &ChromeConfig,
) -> Result<chromiumoxide::browser::BrowserConfig, ConfigError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .window_size(config.viewport.width, config.viewport.height)
        .launch_timeout(config.launch_timeout)
        .request_timeout(config.request_timeout)
        .args(get_chrome_args(config));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(|reason| ConfigError::InvalidValue {
        field: "chrome",
        reason,
    })
}
