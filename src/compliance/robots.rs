//! robots.txt parsing and a per-host cache.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::fetch::PageFetcher;

/// How long a fetched robots.txt is trusted.
const ROBOTS_TTL: Duration = Duration::from_secs(3600);

/// Rules for the `*` user agent plus advertised sitemaps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsTxt {
    pub disallow: Vec<String>,
    pub allow: Vec<String>,
    pub sitemaps: Vec<String>,
}

impl RobotsTxt {
    pub fn parse(text: &str) -> Self {
        let mut robots = RobotsTxt::default();
        let mut applies = false;
        let mut in_agent_block = false;
        for raw in text.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();
            match key.as_str() {
                "user-agent" => {
                    // Consecutive user-agent lines share one group.
                    if !in_agent_block {
                        applies = false;
                    }
                    in_agent_block = true;
                    applies |= value == "*";
                }
                "disallow" => {
                    in_agent_block = false;
                    if applies && !value.is_empty() {
                        robots.disallow.push(value.to_string());
                    }
                }
                "allow" => {
                    in_agent_block = false;
                    if applies && !value.is_empty() {
                        robots.allow.push(value.to_string());
                    }
                }
                "sitemap" => {
                    if !value.is_empty() {
                        robots.sitemaps.push(value.to_string());
                    }
                }
                _ => in_agent_block = false,
            }
        }
        robots
    }

    pub fn disallows_all(&self) -> bool {
        self.disallow.iter().any(|rule| rule == "/") && !self.allow.iter().any(|rule| rule == "/")
    }

    /// Longest matching rule wins; ties go to allow.
    pub fn is_allowed(&self, path: &str) -> bool {
        let longest = |rules: &[String]| {
            rules
                .iter()
                .filter(|rule| path.starts_with(rule.as_str()))
                .map(String::len)
                .max()
        };
        match (longest(&self.disallow), longest(&self.allow)) {
            (Some(deny), Some(allow)) => allow >= deny,
            (Some(_), None) => false,
            _ => true,
        }
    }
}

/// `scheme://host/robots.txt` for any URL on the host.
pub fn robots_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let port = parsed.port().map(|p| format!(":{}", p)).unwrap_or_default();
    Some(format!("{}://{}{}/robots.txt", parsed.scheme(), host, port))
}

/// Fetch and parse robots.txt. Anything but a 200 counts as no rules.
pub async fn fetch_robots(fetcher: &dyn PageFetcher, url: &str) -> Option<RobotsTxt> {
    let robots_url = robots_url(url)?;
    match fetcher.get(&robots_url).await {
        Ok(page) if page.status == 200 => Some(RobotsTxt::parse(&page.body)),
        Ok(page) => {
            debug!("No robots.txt at {} (HTTP {})", robots_url, page.status);
            None
        }
        Err(e) => {
            debug!("robots.txt fetch failed for {}: {}", robots_url, e);
            None
        }
    }
}

/// Per-host robots.txt cache.
#[derive(Debug, Default)]
pub struct RobotsCache {
    entries: Mutex<HashMap<String, (Instant, Option<RobotsTxt>)>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, fetcher: &dyn PageFetcher, url: &str) -> Option<RobotsTxt> {
        let key = robots_url(url)?;
        {
            let entries = self.entries.lock().await;
            if let Some((fetched, robots)) = entries.get(&key) {
                if fetched.elapsed() < ROBOTS_TTL {
                    return robots.clone();
                }
            }
        }
        let robots = fetch_robots(fetcher, url).await;
        self.entries
            .lock()
            .await
            .insert(key, (Instant::now(), robots.clone()));
        robots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryFetcher;

    #[test]
    fn test_parse_groups_and_sitemaps() {
        let robots = RobotsTxt::parse(
            "# comment\nUser-agent: Googlebot\nDisallow: /\n\nUser-agent: *\nDisallow: /search\nAllow: /search/recipes\n\
             Sitemap: https://food.com/sitemap.xml\n",
        );
        assert!(!robots.disallows_all());
        assert_eq!(robots.disallow, vec!["/search"]);
        assert_eq!(robots.sitemaps, vec!["https://food.com/sitemap.xml"]);
        assert!(!robots.is_allowed("/search?q=gin"));
        assert!(robots.is_allowed("/search/recipes/gin"));
        assert!(robots.is_allowed("/recipe/1"));
    }

    #[test]
    fn test_disallow_all() {
        let robots = RobotsTxt::parse("User-agent: bingbot\nUser-agent: *\nDisallow: /\n");
        assert!(robots.disallows_all());
        assert!(!robots.is_allowed("/recipes/x"));
        assert!(!RobotsTxt::parse("User-agent: *\nDisallow:\n").disallows_all());
    }

    #[test]
    fn test_robots_url() {
        assert_eq!(
            robots_url("https://www.food.com/recipe/1?x=2").as_deref(),
            Some("https://www.food.com/robots.txt")
        );
        assert_eq!(
            robots_url("http://localhost:8080/a").as_deref(),
            Some("http://localhost:8080/robots.txt")
        );
        assert_eq!(robots_url("nope"), None);
    }

    #[tokio::test]
    async fn test_cache_fetches_once() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("https://food.com/robots.txt", "User-agent: *\nDisallow: /\n");
        let cache = RobotsCache::new();
        assert!(cache.get(&fetcher, "https://food.com/a").await.unwrap().disallows_all());
        assert!(cache.get(&fetcher, "https://food.com/b").await.unwrap().disallows_all());
        assert_eq!(fetcher.request_count("https://food.com/robots.txt"), 1);
        assert!(cache.get(&fetcher, "https://other.com/a").await.is_none());
    }
}
