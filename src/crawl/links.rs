// src/crawl/links.rs
// =============================================================================
// Finds outlinks in a fetched page.
//
// We use the `scraper` crate to parse HTML and select every <a href>, then the
// `url` crate to resolve relative hrefs against the page URL.
//
// Kept:
// - absolute http/https URLs, fragment stripped, each once
// Skipped:
// - in-page anchors (#section)
// - mailto:, tel:, javascript:, data: and anything else that isn't HTTP
// =============================================================================

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

pub fn extract_outlinks(html: &str, base: &Url) -> Vec<Url> {
    let mut links = Vec::new();

    let selector = match Selector::parse("a[href]") {
        Ok(selector) => selector,
        Err(_) => return links,
    };

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();

    for element in document.select(&selector) {
        if let Some(href) = element.value().attr("href") {
            if let Some(url) = resolve_link(base, href) {
                if seen.insert(url.to_string()) {
                    links.push(url);
                }
            }
        }
    }

    links
}

// Resolves a link (possibly relative) to an absolute crawlable URL
fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let mut url = base.join(href).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}
