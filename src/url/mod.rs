//! URL handling module for Sumi-Harvest
//!
//! This module provides URL normalization (the dedup key for the frontier),
//! host extraction, wildcard domain matching and the crawl scope policy.

mod normalize;
mod scope;

pub use normalize::normalize_url;
pub use scope::{extract_domain, matches_wildcard, Scope, ScopePolicy};

use ::url::Url;

/// Resolves a possibly-relative reference against a base URL and normalizes it
///
/// Returns `None` for references that cannot be crawled: empty strings,
/// fragment-only anchors, `javascript:`, `mailto:`, `tel:` and `data:` links,
/// and anything that does not resolve to HTTP(S).
pub fn resolve_reference(reference: &str, base_url: &Url) -> Option<Url> {
    let reference = reference.trim();

    if reference.is_empty() || reference.starts_with('#') {
        return None;
    }

    let lowered = reference.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(reference).ok()?;
    normalize_url(absolute.as_str()).ok()
}
