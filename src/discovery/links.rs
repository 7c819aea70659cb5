//! Recipe link discovery on listing pages.

use std::collections::HashSet;

use serde_json::Value;
use url::Url;

use crate::models::SettingsMap;
use crate::parser::{is_probable_recipe_url, normalize_url, Page};

use super::sitemap::{looks_like_sitemap, recipe_links_from_sitemap};

fn item_list_urls(page: &Page) -> Vec<String> {
    let mut urls = Vec::new();
    for item in page.jsonld() {
        let is_item_list = item
            .get("@type")
            .and_then(Value::as_str)
            .is_some_and(|t| t.eq_ignore_ascii_case("itemlist"));
        if !is_item_list {
            continue;
        }
        let Some(Value::Array(elements)) = item.get("itemListElement") else {
            continue;
        };
        for element in elements {
            let url = element
                .get("url")
                .and_then(Value::as_str)
                .or_else(|| element.get("item").and_then(|i| i.get("url")).and_then(Value::as_str));
            if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
                urls.push(url.trim().to_string());
            }
        }
    }
    urls
}

/// Candidate recipe URLs on a page, normalized, de-duplicated, capped.
///
/// Sitemap XML is read for `<loc>` entries. HTML contributes JSON-LD
/// `ItemList` entries, anchors and absolute `meta` content URLs.
pub fn discover_recipe_links(
    html: &str,
    base_url: &str,
    max_links: usize,
    settings: &SettingsMap,
) -> Vec<String> {
    if looks_like_sitemap(html) {
        let links = recipe_links_from_sitemap(html.trim_start(), max_links, settings);
        if !links.is_empty() {
            return links;
        }
    }

    let base = Url::parse(base_url).ok();
    let resolve = |href: &str| -> Option<String> {
        match &base {
            Some(base) => base.join(href).ok().map(|u| u.to_string()),
            None => Url::parse(href).ok().map(|u| u.to_string()),
        }
    };

    let page = Page::parse(html, base_url);
    let mut links: Vec<String> = item_list_urls(&page)
        .iter()
        .filter_map(|url| resolve(url))
        .collect();

    for anchor in page.select("a[href]") {
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
        {
            continue;
        }
        if let Some(absolute) = resolve(href) {
            if is_probable_recipe_url(&absolute, settings) {
                links.push(absolute);
            }
        }
    }

    for meta in page.select("meta[content]") {
        let Some(content) = meta.value().attr("content").map(str::trim) else {
            continue;
        };
        if content.starts_with("http") && is_probable_recipe_url(content, settings) {
            links.push(content.to_string());
        }
    }

    let mut seen = HashSet::new();
    links
        .into_iter()
        .map(|link| normalize_url(&link))
        .filter(|link| !link.is_empty() && seen.insert(link.clone()))
        .take(max_links)
        .collect()
}
