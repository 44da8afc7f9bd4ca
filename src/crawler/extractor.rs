//! HTML extraction of text, links and image references
//!
//! This module turns a fetched HTML body into:
//! - The page title
//! - The visible text, whitespace-collapsed
//! - In-scope links to follow (from `<a>` tags and canonical links)
//! - Image references (from `<img src>`)
//!
//! Extraction never fails: malformed markup yields whatever the parser could
//! recover, possibly nothing.

use crate::url::{resolve_reference, Scope};
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Elements whose text is never visible
const HIDDEN_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Visible text
    pub text: String,

    /// Normalized, in-scope links in document order
    pub links: Vec<Url>,

    /// Links dropped because they were outside the scope
    pub out_of_scope: usize,

    /// Normalized image URLs in document order
    pub images: Vec<Url>,
}

impl ExtractedPage {
    /// Returns true if the page had no visible text
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Parses HTML content and extracts text, links and images
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags anywhere in the document
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:`, `data:` and fragment-only links
/// - Links outside `scope`
///
/// Relative references are resolved against `base_url`, which should be the
/// final URL after redirects.
///
/// # Example
///
/// ```
/// use sumi_harvest::crawler::extract;
/// use sumi_harvest::url::Scope;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let page = extract(html, &base_url, &Scope::unrestricted());
/// assert_eq!(page.title, Some("Test".to_string()));
/// assert_eq!(page.links[0].as_str(), "https://example.com/page");
/// ```
pub fn extract(html: &str, base_url: &Url, scope: &Scope) -> ExtractedPage {
    let document = Html::parse_document(html);

    let (links, out_of_scope) = extract_links(&document, base_url, scope);

    ExtractedPage {
        title: extract_title(&document),
        text: extract_text(&document),
        links,
        out_of_scope,
        images: extract_images(&document, base_url),
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

/// Collects every text node that is not inside a hidden element
fn extract_text(document: &Html) -> String {
    let mut raw = String::new();

    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| HIDDEN_ELEMENTS.contains(&element.name()))
        });

        if !hidden {
            raw.push_str(text);
            raw.push(' ');
        }
    }

    collapse_whitespace(&raw)
}

fn extract_links(document: &Html, base_url: &Url, scope: &Scope) -> (Vec<Url>, usize) {
    let mut candidates = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                candidates.extend(resolve_reference(href, base_url));
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                candidates.extend(resolve_reference(href, base_url));
            }
        }
    }

    let mut out_of_scope = 0;
    let links = dedup(candidates)
        .into_iter()
        .filter(|link| {
            let keep = scope.contains(link);
            if !keep {
                out_of_scope += 1;
            }
            keep
        })
        .collect();

    (links, out_of_scope)
}

fn extract_images(document: &Html, base_url: &Url) -> Vec<Url> {
    let Ok(img_selector) = Selector::parse("img[src]") else {
        return Vec::new();
    };

    let images = document
        .select(&img_selector)
        .filter_map(|element| element.value().attr("src"))
        .filter_map(|src| resolve_reference(src, base_url))
        .collect();

    dedup(images)
}

/// Removes repeated URLs, keeping the first occurrence
fn dedup(urls: Vec<Url>) -> Vec<Url> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.as_str().to_string()))
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
