//! Result types shared by the verifier, the coordinator and the orchestrator.
//!
//! Every failure a caller can observe is a [`LinkError`] value. When no error
//! is present the JSON representation is an empty object (`{}`) rather than
//! `null`, which downstream consumers rely on.

use crate::config::CheckerOptions;
use crate::policy::ExpectedStatus;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Kinds of structured errors reported in link and run results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum ErrorKind {
    NavigationError,
    StatusMismatchError,
    TimeoutError,
    StorageValidationError,
    BucketCreationError,
    ScreenshotFileUploadError,
    GenericError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NavigationError => "NavigationError",
            ErrorKind::StatusMismatchError => "StatusMismatchError",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::StorageValidationError => "StorageValidationError",
            ErrorKind::BucketCreationError => "BucketCreationError",
            ErrorKind::ScreenshotFileUploadError => "ScreenshotFileUploadError",
            ErrorKind::GenericError => "GenericError",
        };
        f.write_str(name)
    }
}

/// A structured error value: a kind plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LinkError {
    pub error_type: ErrorKind,
    pub error_message: String,
}

impl LinkError {
    pub fn new(error_type: ErrorKind, error_message: impl Into<String>) -> Self {
        Self {
            error_type,
            error_message: error_message.into(),
        }
    }

    pub fn navigation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NavigationError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TimeoutError, message)
    }

    pub fn status_mismatch(expected: &ExpectedStatus, observed: u16) -> Self {
        Self::new(
            ErrorKind::StatusMismatchError,
            format!("Expected status {expected}, received {observed}"),
        )
    }

    /// The catch-all error surfaced when a run could not complete.
    pub fn generic() -> Self {
        Self::new(
            ErrorKind::GenericError,
            "An error occurred while checking links. Please reference server logs for further information.",
        )
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.error_message)
    }
}

/// Serializes `None` as `{}` instead of `null`.
pub(crate) fn error_or_empty<S>(error: &Option<LinkError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use serde::ser::SerializeMap;
    match error {
        Some(error) => error.serialize(serializer),
        None => serializer.serialize_map(Some(0))?.end(),
    }
}

fn iso_8601<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Where a screenshot went, or why it did not.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScreenshotOutput {
    /// Destination path inside the bucket; empty when nothing was uploaded.
    pub screenshot_file: String,
    #[serde(serialize_with = "error_or_empty")]
    pub screenshot_error: Option<LinkError>,
}

impl ScreenshotOutput {
    pub fn uploaded(path: String) -> Self {
        Self {
            screenshot_file: path,
            screenshot_error: None,
        }
    }

    pub fn failed(error: LinkError) -> Self {
        Self {
            screenshot_file: String::new(),
            screenshot_error: Some(error),
        }
    }
}

/// Outcome of checking one link. Never mutated after the verifier returns it.
#[derive(Debug, Clone, Serialize)]
pub struct LinkResult {
    pub target_url: String,
    pub anchor_text: String,
    pub html_element: String,
    pub is_origin: bool,
    pub passed: bool,
    pub expected_status: ExpectedStatus,
    pub status_code: Option<u16>,
    pub redirect_count: usize,
    pub retries: usize,
    #[serde(serialize_with = "error_or_empty")]
    pub error: Option<LinkError>,
    pub screenshot_output: ScreenshotOutput,
    #[serde(serialize_with = "iso_8601")]
    pub link_start_time: DateTime<Utc>,
    #[serde(serialize_with = "iso_8601")]
    pub link_end_time: DateTime<Utc>,
}

/// Result of a run that reached the origin check.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    #[serde(serialize_with = "iso_8601")]
    pub start_time: DateTime<Utc>,
    #[serde(serialize_with = "iso_8601")]
    pub end_time: DateTime<Utc>,
    pub runtime_metadata: serde_json::Value,
    pub options: CheckerOptions,
    pub link_results: Vec<LinkResult>,
    pub link_count: usize,
    pub passing_link_count: usize,
    pub failing_link_count: usize,
    /// Run-level storage errors collected while resolving the bucket.
    pub errors: Vec<LinkError>,
    pub passed: bool,
}

impl RunResult {
    /// Builds the run result with the origin first and followed links in the
    /// order they were handed in.
    pub fn aggregate(
        start_time: DateTime<Utc>,
        runtime_metadata: serde_json::Value,
        options: CheckerOptions,
        origin: LinkResult,
        followed: Vec<LinkResult>,
        errors: Vec<LinkError>,
    ) -> Self {
        let origin_passed = origin.passed;
        let mut link_results = Vec::with_capacity(followed.len() + 1);
        link_results.push(origin);
        link_results.extend(followed);

        let passing_link_count = link_results.iter().filter(|r| r.passed).count();
        let link_count = link_results.len();

        Self {
            start_time,
            end_time: Utc::now(),
            runtime_metadata,
            options,
            link_count,
            passing_link_count,
            failing_link_count: link_count - passing_link_count,
            passed: origin_passed && passing_link_count == link_count,
            link_results,
            errors,
        }
    }
}

/// Minimal result returned when the run could not complete.
#[derive(Debug, Clone, Serialize)]
pub struct GenericRunFailure {
    #[serde(serialize_with = "iso_8601")]
    pub start_time: DateTime<Utc>,
    #[serde(serialize_with = "iso_8601")]
    pub end_time: DateTime<Utc>,
    pub runtime_metadata: serde_json::Value,
    pub error: LinkError,
    pub passed: bool,
}

/// What a run hands back to its caller: always something parsable.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RunOutput {
    Completed(RunResult),
    Failed(GenericRunFailure),
}

impl RunOutput {
    pub fn passed(&self) -> bool {
        match self {
            RunOutput::Completed(result) => result.passed,
            RunOutput::Failed(_) => false,
        }
    }

    pub fn link_results(&self) -> &[LinkResult] {
        match self {
            RunOutput::Completed(result) => &result.link_results,
            RunOutput::Failed(_) => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::StatusClass;
    use serde_json::json;

    fn link_result(url: &str, passed: bool) -> LinkResult {
        let now = Utc::now();
        LinkResult {
            target_url: url.to_string(),
            anchor_text: "text".to_string(),
            html_element: "a".to_string(),
            is_origin: false,
            passed,
            expected_status: ExpectedStatus::Class(StatusClass::Status2xx),
            status_code: Some(if passed { 200 } else { 404 }),
            redirect_count: 0,
            retries: 0,
            error: (!passed).then(|| LinkError::navigation("boom")),
            screenshot_output: ScreenshotOutput::default(),
            link_start_time: now,
            link_end_time: now,
        }
    }

    #[test]
    fn test_absent_error_serializes_as_empty_object() {
        let value = serde_json::to_value(link_result("https://example.com", true)).unwrap();
        assert_eq!(value["error"], json!({}));
        assert_eq!(
            value["screenshot_output"],
            json!({ "screenshot_file": "", "screenshot_error": {} })
        );
    }

    #[test]
    fn test_present_error_serializes_kind_and_message() {
        let value = serde_json::to_value(link_result("https://example.com/x", false)).unwrap();
        assert_eq!(
            value["error"],
            json!({ "error_type": "NavigationError", "error_message": "boom" })
        );
    }

    #[test]
    fn test_aggregate_keeps_origin_first_and_counts() {
        let mut origin = link_result("https://example.com", true);
        origin.is_origin = true;
        let followed = vec![
            link_result("https://example.com/a", true),
            link_result("https://example.com/b", false),
        ];

        let result = RunResult::aggregate(
            Utc::now(),
            json!({}),
            CheckerOptions::default(),
            origin,
            followed,
            Vec::new(),
        );

        assert!(result.link_results[0].is_origin);
        assert_eq!(result.link_results[1].target_url, "https://example.com/a");
        assert_eq!(result.link_results[2].target_url, "https://example.com/b");
        assert_eq!(result.link_count, 3);
        assert_eq!(result.passing_link_count, 2);
        assert_eq!(result.failing_link_count, 1);
        assert!(!result.passed);
    }

    #[test]
    fn test_status_mismatch_message_names_both_values() {
        let err = LinkError::status_mismatch(&ExpectedStatus::Code(301), 200);
        assert_eq!(err.error_type, ErrorKind::StatusMismatchError);
        assert!(err.error_message.contains("301"));
        assert!(err.error_message.contains("200"));
    }
}
