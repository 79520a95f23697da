//! Status classification and per-link policy resolution.

use crate::config::CheckerOptions;
use crate::links::CandidateLink;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Expected status applied to the origin link when no override exists.
pub const DEFAULT_ORIGIN_STATUS: ExpectedStatus = ExpectedStatus::Class(StatusClass::Status2xx);

/// Expected status applied to followed links when neither a per-link override
/// nor `followed_link_expected_status` is configured.
pub const DEFAULT_FOLLOWED_LINK_STATUS: ExpectedStatus =
    ExpectedStatus::Class(StatusClass::Status2xx);

/// Coarse grouping of HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum StatusClass {
    #[serde(rename = "STATUS_CLASS_UNSPECIFIED", alias = "UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "STATUS_CLASS_1XX", alias = "1XX")]
    Status1xx,
    #[serde(rename = "STATUS_CLASS_2XX", alias = "2XX")]
    Status2xx,
    #[serde(rename = "STATUS_CLASS_3XX", alias = "3XX")]
    Status3xx,
    #[serde(rename = "STATUS_CLASS_4XX", alias = "4XX")]
    Status4xx,
    #[serde(rename = "STATUS_CLASS_5XX", alias = "5XX")]
    Status5xx,
    #[serde(rename = "STATUS_CLASS_ANY", alias = "ANY")]
    Any,
}

impl StatusClass {
    pub fn contains(self, code: u16) -> bool {
        match self {
            StatusClass::Any => true,
            StatusClass::Unspecified | StatusClass::Status2xx => (200..300).contains(&code),
            StatusClass::Status1xx => (100..200).contains(&code),
            StatusClass::Status3xx => (300..400).contains(&code),
            StatusClass::Status4xx => (400..500).contains(&code),
            StatusClass::Status5xx => (500..600).contains(&code),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            StatusClass::Unspecified => "STATUS_CLASS_UNSPECIFIED",
            StatusClass::Status1xx => "STATUS_CLASS_1XX",
            StatusClass::Status2xx => "STATUS_CLASS_2XX",
            StatusClass::Status3xx => "STATUS_CLASS_3XX",
            StatusClass::Status4xx => "STATUS_CLASS_4XX",
            StatusClass::Status5xx => "STATUS_CLASS_5XX",
            StatusClass::Any => "STATUS_CLASS_ANY",
        }
    }
}

/// Either an exact status code or a status class.
///
/// In JSON an exact code is a number (`301`) and a class is a string
/// (`"STATUS_CLASS_3XX"`, or the short form `"3XX"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ExpectedStatus {
    Code(u16),
    Class(StatusClass),
}

impl ExpectedStatus {
    pub fn matches(&self, code: u16) -> bool {
        match self {
            ExpectedStatus::Code(expected) => *expected == code,
            ExpectedStatus::Class(class) => class.contains(code),
        }
    }
}

impl fmt::Display for ExpectedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpectedStatus::Code(code) => write!(f, "{code}"),
            ExpectedStatus::Class(class) => f.write_str(class.as_str()),
        }
    }
}

/// Effective policy for checking one link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkPolicy {
    pub timeout: Duration,
    pub expected_status: ExpectedStatus,
    pub max_retries: usize,
    pub max_redirects: usize,
}

impl LinkPolicy {
    /// Layers a link's override on top of the global options.
    pub fn resolve(options: &CheckerOptions, link: &CandidateLink, is_origin: bool) -> Self {
        let link_override = link.link_override.as_ref();

        let timeout = link_override
            .and_then(|o| o.link_timeout_millis)
            .map(Duration::from_millis)
            .unwrap_or_else(|| options.link_timeout());

        let default_status = if is_origin {
            DEFAULT_ORIGIN_STATUS
        } else {
            options
                .followed_link_expected_status
                .unwrap_or(DEFAULT_FOLLOWED_LINK_STATUS)
        };

        let expected_status = link_override
            .and_then(|o| o.expected_status_code)
            .unwrap_or(default_status);

        Self {
            timeout,
            expected_status,
            max_retries: options.max_retries,
            max_redirects: options.max_redirects,
        }
    }
}
