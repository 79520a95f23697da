use std::time::Duration;
use thiserror::Error;

/// Failures reported by the browser-automation layer.
#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Page error: {0}")]
    PageError(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Screenshot capture failed: {0}")]
    CaptureFailed(String),

    #[error("Chrome error: {0}")]
    ChromeError(String),
}

impl BrowserError {
    /// Transient failures are worth another navigation attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BrowserError::NavigationFailed(_)
                | BrowserError::NetworkError(_)
                | BrowserError::Timeout(_)
                | BrowserError::PageError(_)
        )
    }
}

impl From<chromiumoxide::error::CdpError> for BrowserError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        use chromiumoxide::error::CdpError;
        match err {
            CdpError::Timeout => BrowserError::Timeout(Duration::ZERO),
            CdpError::ChromeMessage(msg) => BrowserError::NavigationFailed(msg),
            CdpError::NotFound => BrowserError::ElementNotFound("node not found".to_string()),
            other => BrowserError::ChromeError(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Storage request failed: {0}")]
    Request(String),

    #[error("Storage returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Storage authentication failed: {0}")]
    Auth(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        StorageError::Request(err.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum EnvironmentError {
    #[error("Metadata server error: {0}")]
    Metadata(String),

    #[error("Unable to resolve {0}")]
    Unresolved(&'static str),
}

impl From<reqwest::Error> for EnvironmentError {
    fn from(err: reqwest::Error) -> Self {
        EnvironmentError::Metadata(err.to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("origin_url is required")]
    MissingOrigin,

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Failures that abort a run and collapse it into a generic result.
#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("Link extraction failed: {0}")]
    Scrape(String),

    #[error("Run panicked: {0}")]
    Panicked(String),
}
