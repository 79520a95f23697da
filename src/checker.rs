//! Run orchestration: origin check, link extraction, follow-link checks and
//! aggregation into one run result.

use crate::browser::{BrowserLauncher, BrowserPage, BrowserSession, TabGuard};
use crate::config::CheckerOptions;
use crate::coordinator::check_links;
use crate::environment::Environment;
use crate::error::CheckerError;
use crate::links::{scrape_links, shuffle_and_truncate, CandidateLink};
use crate::metrics;
use crate::result::{GenericRunFailure, LinkError, LinkResult, RunOutput, RunResult};
use crate::storage::{StorageClient, StorageContext};
use crate::utils::format_duration;
use crate::verifier::{check_link, unchecked_result, VerifyContext};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Checks the links of one origin page per [`run`](LinkChecker::run).
///
/// # Examples
///
/// ```rust,no_run
/// use linkprobe::{ChromeConfig, ChromiumLauncher, CheckerOptions, GcpEnvironment, LinkChecker};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() {
///     let checker = LinkChecker::new(
///         Arc::new(ChromiumLauncher::new(ChromeConfig::default())),
///         Arc::new(GcpEnvironment::from_env()),
///     );
///
///     let output = checker.run(CheckerOptions::for_origin("https://example.com")).await;
///     println!("passed: {}", output.passed());
/// }
/// ```
pub struct LinkChecker {
    launcher: Arc<dyn BrowserLauncher>,
    storage: Option<Arc<dyn StorageClient>>,
    environment: Arc<dyn Environment>,
}

impl LinkChecker {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, environment: Arc<dyn Environment>) -> Self {
        Self {
            launcher,
            storage: None,
            environment,
        }
    }

    /// Enables screenshot uploads through `client`.
    pub fn with_storage(mut self, client: Arc<dyn StorageClient>) -> Self {
        self.storage = Some(client);
        self
    }

    /// Runs one check. Always returns a result, even when the run itself
    /// could not complete.
    pub async fn run(&self, options: CheckerOptions) -> RunOutput {
        let started = Instant::now();
        let start_time = Utc::now();
        let runtime_metadata = self.environment.runtime_metadata();

        let output = match self.execute(options, start_time, runtime_metadata.clone()).await {
            Ok(result) => {
                info!(
                    "Run finished in {}: {}/{} links passed",
                    format_duration(started.elapsed()),
                    result.passing_link_count,
                    result.link_count
                );
                RunOutput::Completed(result)
            }
            Err(e) => {
                error!("Link check run failed: {}", e);
                RunOutput::Failed(GenericRunFailure {
                    start_time,
                    end_time: Utc::now(),
                    runtime_metadata,
                    error: LinkError::generic(),
                    passed: false,
                })
            }
        };

        metrics::record_run(output.passed(), started.elapsed());
        output
    }

    async fn execute(
        &self,
        options: CheckerOptions,
        start_time: DateTime<Utc>,
        runtime_metadata: serde_json::Value,
    ) -> Result<RunResult, CheckerError> {
        let options = options.validate()?;
        info!("Starting link check of {}", options.origin_url);

        let (storage, errors) =
            StorageContext::resolve(self.storage.clone(), self.environment.as_ref(), &options).await;

        let browser = self.launcher.launch().await?;
        let context = Arc::new(VerifyContext { options, storage });

        let outcome = AssertUnwindSafe(check_all(browser.clone(), context.clone()))
            .catch_unwind()
            .await;
        browser.close().await;

        let (origin, followed) = match outcome {
            Ok(checked) => checked?,
            Err(payload) => return Err(CheckerError::Panicked(panic_message(payload))),
        };

        Ok(RunResult::aggregate(
            start_time,
            runtime_metadata,
            context.options.clone(),
            origin,
            followed,
            errors,
        ))
    }
}

/// Checks the origin, then every selected link on it. Followed links are only
/// scraped and checked when the origin passed.
async fn check_all(
    browser: Arc<dyn BrowserSession>,
    context: Arc<VerifyContext>,
) -> Result<(LinkResult, Vec<LinkResult>), CheckerError> {
    let options = &context.options;
    let origin_link = CandidateLink::origin(options);

    let tab = match browser.new_page().await {
        Ok(page) => TabGuard::new(page),
        Err(e) => {
            let error = LinkError::navigation(format!(
                "Failed to open tab for {}: {e}",
                origin_link.target_url
            ));
            return Ok((unchecked_result(&origin_link, options, true, error), Vec::new()));
        }
    };

    let origin = check_link(tab.page(), &origin_link, &context, true).await;
    if !origin.passed {
        warn!("Origin {} failed, skipping followed links", origin.target_url);
        tab.close().await;
        return Ok((origin, Vec::new()));
    }

    if options.link_limit == 0 {
        tab.close().await;
        return Ok((origin, Vec::new()));
    }

    let scraped = scrape_origin(tab.page(), options).await;
    tab.close().await;
    let scraped = scraped?;
    let found = scraped.len();

    let links = shuffle_and_truncate(scraped, options.link_order, options.link_limit, &mut rand::rng());
    info!("Found {} links on {}, checking {}", found, origin.target_url, links.len());

    let followed = check_links(browser, links, context.clone()).await;
    Ok((origin, followed))
}

async fn scrape_origin(
    page: &dyn BrowserPage,
    options: &CheckerOptions,
) -> Result<Vec<CandidateLink>, CheckerError> {
    let html = page.content().await?;
    let page_url = page
        .current_url()
        .await
        .filter(|url| url.starts_with("http"))
        .unwrap_or_else(|| options.origin_url.clone());

    scrape_links(&html, &page_url, options).map_err(CheckerError::Scrape)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("owned".to_string())), "owned");
        assert_eq!(panic_message(Box::new(42)), "unknown panic");
    }
}
