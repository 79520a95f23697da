//! Single-link verification: navigation with retries, redirect and status
//! checks, and the screenshot trigger.

use crate::browser::{BrowserPage, Navigation};
use crate::config::{CaptureCondition, CheckerOptions};
use crate::error::BrowserError;
use crate::links::CandidateLink;
use crate::metrics;
use crate::policy::LinkPolicy;
use crate::result::{LinkError, LinkResult, ScreenshotOutput};
use crate::storage::{upload_screenshot, StorageContext};
use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(100);
const RETRY_MULTIPLIER: u32 = 2;
const RETRY_MAX_DELAY: Duration = Duration::from_secs(2);

/// Everything a verifier needs besides the tab and the link.
pub struct VerifyContext {
    pub options: CheckerOptions,
    pub storage: StorageContext,
}

/// Result of one navigation attempt.
#[derive(Debug)]
enum Attempt {
    Responded(Navigation),
    Failed(BrowserError),
    TimedOut(Duration),
}

impl Attempt {
    /// Network failures and timeouts are transient. A response, whatever
    /// its status or redirect count, is final.
    fn is_retryable(&self) -> bool {
        match self {
            Attempt::Responded(_) => false,
            Attempt::Failed(e) => e.is_retryable(),
            Attempt::TimedOut(_) => true,
        }
    }
}

#[derive(Debug, Default)]
struct Verdict {
    passed: bool,
    status_code: Option<u16>,
    redirect_count: usize,
    error: Option<LinkError>,
}

impl Verdict {
    fn fail(&mut self, error: LinkError) {
        self.passed = false;
        self.error = Some(error);
    }
}

/// Checks one link in `page` and reports the outcome. Never fails.
pub async fn check_link(
    page: &dyn BrowserPage,
    link: &CandidateLink,
    context: &VerifyContext,
    is_origin: bool,
) -> LinkResult {
    let started = Instant::now();
    let link_start_time = Utc::now();
    let policy = LinkPolicy::resolve(&context.options, link, is_origin);

    let (attempt, retries) = navigate_with_retries(page, &link.target_url, &policy).await;
    let mut verdict = classify(attempt, &link.target_url, &policy);

    if is_origin && verdict.passed {
        if let Some(selector) = context.options.wait_for_selector.as_deref() {
            match timeout(policy.timeout, page.wait_for_selector(selector)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => verdict.fail(LinkError::navigation(format!(
                    "Failed waiting for selector {selector} on {}: {e}",
                    link.target_url
                ))),
                Err(_) => verdict.fail(LinkError::timeout(format!(
                    "Timed out after {}ms waiting for selector {selector} on {}",
                    policy.timeout.as_millis(),
                    link.target_url
                ))),
            }
        }
    }

    let screenshot_output = if should_capture(
        context.options.screenshot_options.capture_condition,
        verdict.passed,
    ) {
        capture(page, context, &link.target_url, policy.timeout).await
    } else {
        ScreenshotOutput::default()
    };

    if let Some(error) = &verdict.error {
        warn!("Link {} failed: {}", link.target_url, error);
    } else {
        debug!("Link {} passed with status {:?}", link.target_url, verdict.status_code);
    }

    let result = LinkResult {
        target_url: link.target_url.clone(),
        anchor_text: link.anchor_text.clone(),
        html_element: link.html_element.clone(),
        is_origin,
        passed: verdict.passed,
        expected_status: policy.expected_status,
        status_code: verdict.status_code,
        redirect_count: verdict.redirect_count,
        retries,
        error: verdict.error,
        screenshot_output,
        link_start_time,
        link_end_time: Utc::now(),
    };
    metrics::record_link(&result, started.elapsed());
    result
}

/// Failed result for a link that never reached navigation.
pub fn unchecked_result(
    link: &CandidateLink,
    options: &CheckerOptions,
    is_origin: bool,
    error: LinkError,
) -> LinkResult {
    let now = Utc::now();
    LinkResult {
        target_url: link.target_url.clone(),
        anchor_text: link.anchor_text.clone(),
        html_element: link.html_element.clone(),
        is_origin,
        passed: false,
        expected_status: LinkPolicy::resolve(options, link, is_origin).expected_status,
        status_code: None,
        redirect_count: 0,
        retries: 0,
        error: Some(error),
        screenshot_output: ScreenshotOutput::default(),
        link_start_time: now,
        link_end_time: now,
    }
}

/// Navigates until an attempt is final or retries are used up. Each attempt
/// gets a fresh timeout window.
async fn navigate_with_retries(
    page: &dyn BrowserPage,
    url: &str,
    policy: &LinkPolicy,
) -> (Attempt, usize) {
    let mut retries = 0;
    loop {
        let attempt = match timeout(policy.timeout, page.navigate(url)).await {
            Ok(Ok(navigation)) => Attempt::Responded(navigation),
            Ok(Err(e)) => Attempt::Failed(e),
            Err(_) => Attempt::TimedOut(policy.timeout),
        };

        if attempt.is_retryable() && retries < policy.max_retries {
            let delay = retry_delay(retries);
            retries += 1;
            metrics::record_retry();
            debug!(
                "Retrying {} in {:?} after {:?} (retry {}/{})",
                url, delay, attempt, retries, policy.max_retries
            );
            sleep(delay).await;
            continue;
        }

        return (attempt, retries);
    }
}

/// Exponential backoff before retry number `retries + 1`, capped.
fn retry_delay(retries: usize) -> Duration {
    let factor = RETRY_MULTIPLIER.saturating_pow(u32::try_from(retries).unwrap_or(u32::MAX));
    RETRY_INITIAL_DELAY
        .checked_mul(factor)
        .map_or(RETRY_MAX_DELAY, |delay| delay.min(RETRY_MAX_DELAY))
}

fn classify(attempt: Attempt, url: &str, policy: &LinkPolicy) -> Verdict {
    match attempt {
        Attempt::Responded(navigation) => {
            let mut verdict = Verdict {
                status_code: navigation.status,
                redirect_count: navigation.redirect_count,
                ..Default::default()
            };

            if navigation.redirect_count > policy.max_redirects {
                verdict.fail(LinkError::navigation(format!(
                    "{url} followed {} redirects, more than the maximum of {}",
                    navigation.redirect_count, policy.max_redirects
                )));
                return verdict;
            }

            match navigation.status {
                Some(status) if policy.expected_status.matches(status) => verdict.passed = true,
                Some(status) => {
                    verdict.fail(LinkError::status_mismatch(&policy.expected_status, status))
                }
                None => verdict.fail(LinkError::navigation(format!(
                    "No HTTP response received from {url}"
                ))),
            }
            verdict
        }
        Attempt::Failed(BrowserError::Timeout(_)) | Attempt::TimedOut(_) => Verdict {
            error: Some(LinkError::timeout(format!(
                "Timed out after {}ms navigating to {url}",
                policy.timeout.as_millis()
            ))),
            ..Default::default()
        },
        Attempt::Failed(e) => Verdict {
            error: Some(LinkError::navigation(format!("Failed to navigate to {url}: {e}"))),
            ..Default::default()
        },
    }
}

fn should_capture(condition: CaptureCondition, passed: bool) -> bool {
    match condition {
        CaptureCondition::Always => true,
        CaptureCondition::Failing => !passed,
        CaptureCondition::None => false,
    }
}

async fn capture(
    page: &dyn BrowserPage,
    context: &VerifyContext,
    url: &str,
    limit: Duration,
) -> ScreenshotOutput {
    match timeout(limit, upload_screenshot(page, &context.storage, url)).await {
        Ok(output) => output,
        Err(_) => ScreenshotOutput::failed(LinkError::timeout(format!(
            "Timed out after {}ms capturing screenshot of {url}",
            limit.as_millis()
        ))),
    }
}
