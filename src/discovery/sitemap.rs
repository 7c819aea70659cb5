//! Sitemap discovery.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

use crate::compliance::RobotsTxt;
use crate::fetch::PageFetcher;
use crate::models::SettingsMap;
use crate::parser::is_probable_recipe_url;

static LOC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:[a-z0-9_]+:)?loc\b[^>]*>\s*(.*?)\s*</(?:[a-z0-9_]+:)?loc>").unwrap()
});

fn unescape_xml(value: &str) -> String {
    value
        .replace("<![CDATA[", "")
        .replace("]]>", "")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

/// Whether a document is a sitemap or sitemap index rather than HTML.
pub fn looks_like_sitemap(body: &str) -> bool {
    let head: String = body.trim_start().chars().take(2000).collect();
    head.starts_with("<?xml") || head.contains("<urlset") || head.contains("<sitemapindex")
}

/// Every `<loc>` value, up to `max`.
pub fn sitemap_locs(xml: &str, max: usize) -> Vec<String> {
    LOC.captures_iter(xml)
        .filter_map(|cap| cap.get(1))
        .map(|m| unescape_xml(m.as_str()).trim().to_string())
        .filter(|loc| !loc.is_empty())
        .take(max)
        .collect()
}

/// `<loc>` values that look like single recipes, up to `max`.
pub fn recipe_links_from_sitemap(xml: &str, max: usize, settings: &SettingsMap) -> Vec<String> {
    LOC.captures_iter(xml)
        .filter_map(|cap| cap.get(1))
        .map(|m| unescape_xml(m.as_str()).trim().to_string())
        .filter(|loc| !loc.is_empty() && is_probable_recipe_url(loc, settings))
        .take(max)
        .collect()
}

async fn fetch_body(fetcher: &dyn PageFetcher, url: &str) -> Option<String> {
    match fetcher.get(url).await {
        Ok(page) if page.status == 200 => Some(page.body),
        Ok(page) => {
            debug!("Sitemap {} answered HTTP {}", url, page.status);
            None
        }
        Err(e) => {
            debug!("Sitemap {} failed: {}", url, e);
            None
        }
    }
}

/// Recipe URLs from the site's sitemaps.
///
/// Candidates are `/sitemap.xml`, `/sitemap_index.xml` and any `Sitemap:`
/// lines from robots.txt. A sitemap index is followed one level deep.
/// Nothing is returned when robots.txt disallows everything.
pub async fn discover_sitemap_links(
    fetcher: &dyn PageFetcher,
    base_url: &str,
    robots: Option<&RobotsTxt>,
    max_links: usize,
    settings: &SettingsMap,
) -> Vec<String> {
    if robots.is_some_and(RobotsTxt::disallows_all) {
        return Vec::new();
    }
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };
    let mut candidates: Vec<String> = ["/sitemap.xml", "/sitemap_index.xml"]
        .iter()
        .filter_map(|path| base.join(path).ok())
        .map(|u| u.to_string())
        .collect();
    for sitemap in robots.map(|r| r.sitemaps.as_slice()).unwrap_or_default() {
        if !candidates.contains(sitemap) {
            candidates.push(sitemap.clone());
        }
    }

    let mut discovered: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut take = |links: Vec<String>, discovered: &mut Vec<String>| {
        for link in links {
            if discovered.len() >= max_links {
                break;
            }
            if seen.insert(link.clone()) {
                discovered.push(link);
            }
        }
    };

    for sitemap_url in candidates {
        if discovered.len() >= max_links {
            break;
        }
        let Some(content) = fetch_body(fetcher, &sitemap_url).await else {
            continue;
        };
        let locs = sitemap_locs(&content, max_links);
        if locs.iter().any(|loc| loc.ends_with(".xml")) {
            for child in locs {
                if discovered.len() >= max_links {
                    break;
                }
                let Some(child_content) = fetch_body(fetcher, &child).await else {
                    continue;
                };
                take(
                    recipe_links_from_sitemap(&child_content, max_links, settings),
                    &mut discovered,
                );
            }
        } else {
            take(
                recipe_links_from_sitemap(&content, max_links, settings),
                &mut discovered,
            );
        }
    }
    discovered.truncate(max_links);
    discovered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryFetcher;

    async fn sitemap_links(
        fetcher: &MemoryFetcher,
        robots: Option<&RobotsTxt>,
        max_links: usize,
    ) -> Vec<String> {
        let settings = SettingsMap::new();
        discover_sitemap_links(fetcher, "https://example.com/", robots, max_links, &settings).await
    }

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.com/recipes/negroni</loc></url>
  <url><loc> https://example.com/about </loc></url>
  <url><loc>https://example.com/cocktails/gimlet?a=1&amp;b=2</loc></url>
</urlset>"#;

    #[test]
    fn test_locs() {
        assert!(looks_like_sitemap(URLSET));
        assert!(!looks_like_sitemap("<html><body>hi</body></html>"));
        assert_eq!(sitemap_locs(URLSET, 10).len(), 3);
        assert_eq!(sitemap_locs(URLSET, 1), vec!["https://example.com/recipes/negroni"]);
        assert_eq!(
            recipe_links_from_sitemap(URLSET, 10, &SettingsMap::new()),
            vec![
                "https://example.com/recipes/negroni",
                "https://example.com/cocktails/gimlet?a=1&b=2"
            ]
        );
    }

    #[tokio::test]
    async fn test_follows_index_and_robots_sitemaps() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert(
            "https://example.com/sitemap_index.xml",
            r#"<sitemapindex><sitemap><loc>https://example.com/sitemap-recipes.xml</loc></sitemap></sitemapindex>"#,
        );
        fetcher.insert("https://example.com/sitemap-recipes.xml", URLSET);
        fetcher.insert(
            "https://example.com/extra.xml",
            "<urlset><url><loc>https://example.com/drink/paloma</loc></url></urlset>",
        );
        let robots = RobotsTxt::parse("Sitemap: https://example.com/extra.xml\n");
        let links = sitemap_links(&fetcher, Some(&robots), 10).await;
        assert_eq!(
            links,
            vec![
                "https://example.com/recipes/negroni",
                "https://example.com/cocktails/gimlet?a=1&b=2",
                "https://example.com/drink/paloma"
            ]
        );
    }

    #[tokio::test]
    async fn test_disallow_all_and_cap() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("https://example.com/sitemap.xml", URLSET);
        let robots = RobotsTxt::parse("User-agent: *\nDisallow: /\n");
        assert!(sitemap_links(&fetcher, Some(&robots), 10).await.is_empty());
        let links = sitemap_links(&fetcher, None, 1).await;
        assert_eq!(links, vec!["https://example.com/recipes/negroni"]);
    }
}
