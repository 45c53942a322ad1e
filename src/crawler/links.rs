//! HTML link extraction
//!
//! This module handles parsing fetched pages to extract:
//! - Links to follow (from <a> tags and canonical links)
//! - Page title

use crate::url::{normalize_parsed, same_domain};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// All links found on the page, resolved to absolute URLs
    pub links: Vec<Url>,
}

/// Parses HTML content and extracts links and the title
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
/// - Fragment-only anchors
/// - Anything that is not http(s) after resolution
///
/// `rel="nofollow"` links are followed.
///
/// # Example
///
/// ```
/// use outbound::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].as_str(), "https://example.com/page");
/// ```
pub fn parse_html(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        links: extract_links(&document, base_url),
    }
}

/// Links of `page` that stay on `site`, normalized, deduplicated and in
/// discovery order
pub fn same_domain_links(page: &ParsedPage, site: &Url) -> Vec<Url> {
    let mut seen = HashSet::new();

    page.links
        .iter()
        .filter_map(|link| normalize_parsed(link.clone()).ok())
        .filter(|link| same_domain(link, site))
        .filter(|link| seen.insert(link.as_str().to_string()))
        .collect()
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<Url> {
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(url) = element.value().attr("href").and_then(|h| resolve_link(h, base_url)) {
                links.push(url);
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(url) = element.value().attr("href").and_then(|h| resolve_link(h, base_url)) {
                links.push(url);
            }
        }
    }

    links
}

/// Resolves an href against the page URL, or `None` if it is not followable
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    base_url
        .join(href)
        .ok()
        .filter(|url| url.scheme() == "http" || url.scheme() == "https")
}
