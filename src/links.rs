//! Link extraction from a rendered page and selection of the links to check.

use crate::config::{CheckerOptions, LinkOrder, PerLinkOption};
use crate::utils::normalize_url;
use rand::seq::SliceRandom;
use rand::Rng;
use scraper::{Html, Selector};
use url::Url;

/// A link scraped from the origin page, ready to be verified.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateLink {
    /// Absolute target URL.
    pub target_url: String,
    pub anchor_text: String,
    /// Tag name of the element the link came from.
    pub html_element: String,
    pub link_override: Option<PerLinkOption>,
}

impl CandidateLink {
    /// The link for the origin page itself.
    pub fn origin(options: &CheckerOptions) -> Self {
        Self {
            target_url: options.origin_url.clone(),
            anchor_text: String::new(),
            html_element: String::new(),
            link_override: normalize_url(&options.origin_url)
                .ok()
                .and_then(|key| options.per_link_options.get(&key))
                .cloned(),
        }
    }
}

/// Extracts every element matching `options.query_selector_all` that carries a
/// resolvable http(s) target in one of `options.get_attributes`.
///
/// Relative targets resolve against `<base href>` when the document has one,
/// otherwise against `page_url`. Elements without a usable target are skipped.
/// Duplicates are kept.
pub fn scrape_links(
    html: &str,
    page_url: &str,
    options: &CheckerOptions,
) -> Result<Vec<CandidateLink>, String> {
    let selector = Selector::parse(&options.query_selector_all).map_err(|e| e.to_string())?;
    let page_url = Url::parse(page_url).map_err(|e| format!("{page_url}: {e}"))?;
    let document = Html::parse_document(html);
    let base_url = document_base_url(&document, &page_url);

    let links = document
        .select(&selector)
        .filter_map(|element| {
            let target_url = options
                .get_attributes
                .iter()
                .filter_map(|attr| element.value().attr(attr))
                .find_map(|value| resolve_target(&base_url, value))?;

            let anchor_text = collapse_whitespace(&element.text().collect::<String>());
            let link_override = options.per_link_options.get(&target_url).cloned();

            Some(CandidateLink {
                target_url,
                anchor_text,
                html_element: element.value().name().to_string(),
                link_override,
            })
        })
        .collect();

    Ok(links)
}

/// Orders and truncates scraped links per the configured policy.
///
/// `Random` shuffles the whole list (Fisher-Yates) before truncating so every
/// link has the same chance of being picked; `FirstN` keeps document order.
pub fn shuffle_and_truncate<R: Rng + ?Sized>(
    mut links: Vec<CandidateLink>,
    order: LinkOrder,
    link_limit: usize,
    rng: &mut R,
) -> Vec<CandidateLink> {
    if link_limit == 0 || links.is_empty() {
        return Vec::new();
    }

    if order == LinkOrder::Random {
        links.shuffle(rng);
    }
    links.truncate(link_limit);
    links
}

fn document_base_url(document: &Html, page_url: &Url) -> Url {
    let Ok(base_selector) = Selector::parse("base[href]") else {
        return page_url.clone();
    };

    document
        .select(&base_selector)
        .next()
        .and_then(|base| base.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

fn resolve_target(base_url: &Url, value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('#') {
        return None;
    }

    let mut resolved = base_url.join(value).ok()?;
    match resolved.scheme() {
        "http" | "https" => {
            resolved.set_fragment(None);
            Some(resolved.to_string())
        }
        _ => None,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
