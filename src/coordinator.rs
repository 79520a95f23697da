//! Concurrent verification of the followed links, one tab per link.

use crate::browser::{BrowserSession, TabGuard};
use crate::links::CandidateLink;
use crate::result::{LinkError, LinkResult};
use crate::verifier::{check_link, unchecked_result, VerifyContext};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{debug, error, info};

/// Checks `links` with at most `concurrency` tabs open at once.
///
/// Results come back in the order of `links`, whatever order the checks
/// finish in. A link whose task fails still gets a (failed) result.
pub async fn check_links(
    browser: Arc<dyn BrowserSession>,
    links: Vec<CandidateLink>,
    context: Arc<VerifyContext>,
) -> Vec<LinkResult> {
    if links.is_empty() {
        return Vec::new();
    }

    let concurrency = context.options.concurrency.max(1);
    info!("Checking {} links with concurrency {}", links.len(), concurrency);

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let tasks: Vec<_> = links
        .iter()
        .cloned()
        .map(|link| {
            let browser = browser.clone();
            let context = context.clone();
            let semaphore = semaphore.clone();

            tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return unchecked_result(&link, &context.options, false, LinkError::generic());
                };
                check_in_tab(browser.as_ref(), &link, &context).await
            })
        })
        .collect();
    let _abort = AbortOnDrop(tasks.iter().map(|task| task.abort_handle()).collect());

    join_all(tasks)
        .await
        .into_iter()
        .zip(links)
        .map(|(joined, link)| match joined {
            Ok(result) => result,
            Err(e) => {
                error!("Check of {} aborted: {}", link.target_url, e);
                unchecked_result(&link, &context.options, false, LinkError::generic())
            }
        })
        .collect()
}

/// Aborts the link tasks if `check_links` is dropped before they finish.
/// Each aborted task drops its [`TabGuard`], which closes the tab.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

async fn check_in_tab(
    browser: &dyn BrowserSession,
    link: &CandidateLink,
    context: &VerifyContext,
) -> LinkResult {
    let tab = match browser.new_page().await {
        Ok(page) => TabGuard::new(page),
        Err(e) => {
            return unchecked_result(
                link,
                &context.options,
                false,
                LinkError::navigation(format!("Failed to open tab for {}: {e}", link.target_url)),
            );
        }
    };

    debug!("Checking {}", link.target_url);
    let result = check_link(tab.page(), link, context, false).await;
    tab.close().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckerOptions;
    use crate::result::ErrorKind;
    use crate::storage::StorageContext;
    use crate::test_support::{FakeBrowser, Scripted};
    use std::time::Duration;

    fn links(count: usize) -> Vec<CandidateLink> {
        (0..count)
            .map(|i| CandidateLink {
                target_url: format!("https://example.com/{i}"),
                anchor_text: format!("Link {i}"),
                html_element: "a".to_string(),
                link_override: None,
            })
            .collect()
    }

    fn context(concurrency: usize) -> Arc<VerifyContext> {
        Arc::new(VerifyContext {
            options: CheckerOptions {
                concurrency,
                link_timeout_millis: 1_000,
                ..CheckerOptions::for_origin("https://example.com")
            },
            storage: StorageContext::disabled(),
        })
    }

    /// Lets background tab closes run.
    async fn settle(browser: &FakeBrowser) {
        for _ in 0..50 {
            if browser.tabs_closed() == browser.tabs_opened() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_no_links_opens_no_tabs() {
        let browser = Arc::new(FakeBrowser::new());
        let results = check_links(browser.clone(), Vec::new(), context(3)).await;

        assert!(results.is_empty());
        assert_eq!(browser.tabs_opened(), 0);
    }

    #[tokio::test]
    async fn test_results_keep_input_order() {
        // Earlier links finish last.
        let browser = Arc::new(
            FakeBrowser::new()
                .script("https://example.com/0", vec![Scripted::delayed(200, 60)])
                .script("https://example.com/1", vec![Scripted::delayed(404, 30)])
                .script("https://example.com/2", vec![Scripted::status(200)]),
        );

        let results = check_links(browser, links(3), context(3)).await;

        let urls: Vec<_> = results.iter().map(|r| r.target_url.as_str()).collect();
        assert_eq!(
            urls,
            ["https://example.com/0", "https://example.com/1", "https://example.com/2"]
        );
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert!(results[2].passed);
        assert!(results.iter().all(|r| !r.is_origin));
    }

    #[tokio::test]
    async fn test_concurrency_bounds_open_tabs() {
        let mut browser = FakeBrowser::new();
        for i in 0..6 {
            browser = browser.script(&format!("https://example.com/{i}"), vec![Scripted::delayed(200, 25)]);
        }
        let browser = Arc::new(browser);

        let results = check_links(browser.clone(), links(6), context(2)).await;

        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|r| r.passed));
        assert_eq!(browser.tabs_opened(), 6);
        assert!(browser.max_open_tabs() <= 2);
        assert_eq!(browser.tabs_closed(), 6);
    }

    #[tokio::test]
    async fn test_tab_open_failure_becomes_navigation_error() {
        let browser = Arc::new(FakeBrowser::new().fail_tabs_after(0));

        let results = check_links(browser, links(2), context(1)).await;

        assert_eq!(results.len(), 2);
        for result in results {
            assert!(!result.passed);
            assert_eq!(result.status_code, None);
            assert_eq!(result.error.unwrap().error_type, ErrorKind::NavigationError);
        }
    }

    #[tokio::test]
    async fn test_panicking_check_becomes_generic_error() {
        let browser = Arc::new(
            FakeBrowser::new().script("https://example.com/1", vec![Scripted::Panic]),
        );

        let results = check_links(browser.clone(), links(3), context(3)).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].passed);
        assert_eq!(results[1].target_url, "https://example.com/1");
        assert_eq!(
            results[1].error.as_ref().unwrap().error_type,
            ErrorKind::GenericError
        );
        assert!(results[2].passed);

        settle(&browser).await;
        assert_eq!(browser.tabs_opened(), 3);
        assert_eq!(browser.tabs_closed(), 3);
    }

    #[tokio::test]
    async fn test_cancelled_checks_close_their_tabs() {
        let mut browser = FakeBrowser::new();
        for i in 0..3 {
            browser = browser.script(&format!("https://example.com/{i}"), vec![Scripted::delayed(200, 500)]);
        }
        let browser = Arc::new(browser);

        let cancelled = tokio::time::timeout(
            Duration::from_millis(50),
            check_links(browser.clone(), links(3), context(3)),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(browser.tabs_opened(), 3);

        settle(&browser).await;
        assert_eq!(browser.tabs_closed(), 3);
        assert_eq!(browser.navigations(), 3);
    }
}
