//! Engagement signal extraction: ratings, rating counts, likes and shares.

use std::sync::LazyLock;

use regex::Regex;
use scraper::ElementRef;
use serde_json::Value;

use crate::models::Signals;

use super::page::{element_text, Page};
use super::profile::EffectiveProfile;

const COUNT: &str = r"([0-9][0-9,]*(?:\.[0-9]+)?)\s*([kKmMbB])?\+?";

static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(COUNT).unwrap());
static RATING_COUNT_CONTEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"{}\s*(?:ratings?|reviews?|votes?)", COUNT)).unwrap()
});
static SOCIAL_COUNT_CONTEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"{}\s*(?:likes?|shares?)", COUNT)).unwrap());
static LIKE_CONTEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"{}\s*(?:likes?)", COUNT)).unwrap());
static SHARE_CONTEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"{}\s*(?:shares?)", COUNT)).unwrap());
static STAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-5](?:\.[0-9]+)?)\s*(?:/|out of)\s*5").unwrap());
static BBC_USER_RATINGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)"userRatings"\s*:\s*\{\s*"avg"\s*:\s*(?P<avg>[0-5](?:\.[0-9]+)?)\s*,\s*"total"\s*:\s*(?P<total>[0-9]+)"#,
    )
    .unwrap()
});

const GENERIC_RATING_SELECTORS: &[&str] = &[
    r#"[itemprop="ratingValue"]"#,
    r#"meta[property="og:rating"]"#,
    r#"meta[name="rating"]"#,
    "[data-rating]",
    "[data-rating-value]",
];
const GENERIC_RATING_COUNT_SELECTORS: &[&str] = &[
    r#"[itemprop="ratingCount"]"#,
    r#"[itemprop="reviewCount"]"#,
    "[data-rating-count]",
    "[data-review-count]",
];
const GENERIC_LIKE_SELECTORS: &[&str] = &[
    "[data-like-count]",
    r#"[class*="like-count"]"#,
    r#"[aria-label*="Like"]"#,
];
const GENERIC_SHARE_SELECTORS: &[&str] = &[
    "[data-share-count]",
    r#"[class*="share-count"]"#,
    r#"[aria-label*="Share"]"#,
];

/// Attributes probed, in order, before falling back to element text.
const NUMERIC_ATTRS: &[&str] = &[
    "content",
    "data-value",
    "data-rating",
    "data-rating-value",
    "data-rating-count",
    "data-review-count",
    "data-like-count",
    "data-share-count",
    "aria-label",
    "title",
];

/// `"1.2k"` → 1200, `"3,400"` → 3400.
pub fn compact_int(number: &str, suffix: Option<&str>) -> Option<i64> {
    let base: f64 = number.replace(',', "").parse().ok()?;
    let factor = match suffix.map(str::to_ascii_lowercase).as_deref() {
        Some("k") => 1_000.0,
        Some("m") => 1_000_000.0,
        Some("b") => 1_000_000_000.0,
        _ => 1.0,
    };
    Some((base * factor) as i64)
}

fn compact_from_captures(caps: &regex::Captures<'_>) -> Option<i64> {
    compact_int(caps.get(1)?.as_str(), caps.get(2).map(|m| m.as_str()))
}

/// First count in `text`, preferring numbers labelled as ratings or
/// social counts. Star ratings (`4.5 out of 5`) are not mistaken for
/// counts.
pub fn first_count(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    for regex in [&*RATING_COUNT_CONTEXT, &*SOCIAL_COUNT_CONTEXT] {
        if let Some(caps) = regex.captures(text) {
            return compact_from_captures(&caps);
        }
    }
    let lower = text.to_lowercase();
    if STAR.is_match(text) && (lower.contains("rating") || lower.contains("out of")) {
        return None;
    }
    let star_context = text.contains("/5") || lower.contains("out of");
    COUNT_RE
        .captures_iter(text)
        .filter_map(|caps| compact_from_captures(&caps))
        .find(|n| !(*n < 10 && star_context))
}

/// Star rating in `text`: `x/5` or `x out of 5`, else the whole text as a
/// number.
pub fn first_star(text: &str) -> Option<f64> {
    if text.is_empty() {
        return None;
    }
    if let Some(caps) = STAR.captures(text) {
        return caps.get(1)?.as_str().parse().ok();
    }
    text.trim().parse().ok()
}

#[derive(Clone, Copy)]
enum NumberKind {
    Star,
    Count,
}

fn numeric_from_node(node: ElementRef<'_>, kind: NumberKind) -> Option<f64> {
    let attrs = node.value();
    let mut raw_values: Vec<String> = NUMERIC_ATTRS
        .iter()
        .filter_map(|attr| attrs.attr(attr))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    let text = element_text(node);
    if !text.is_empty() {
        raw_values.push(text);
    }
    raw_values.iter().find_map(|raw| match kind {
        NumberKind::Star => first_star(raw),
        NumberKind::Count => first_count(raw).map(|n| n as f64),
    })
}

fn numeric_from_selectors<'s, I>(page: &Page, selectors: I, kind: NumberKind) -> Option<f64>
where
    I: IntoIterator<Item = &'s str>,
{
    selectors.into_iter().find_map(|selector| {
        page.select(selector)
            .into_iter()
            .find_map(|node| numeric_from_node(node, kind))
    })
}

/// Signals stated in running text (`4.5 out of 5`, `120 ratings`, `3k likes`).
pub fn signals_from_text(text: &str) -> Signals {
    let lower = text.to_lowercase();
    if lower.is_empty() {
        return Signals::default();
    }
    Signals {
        rating_value: STAR
            .captures(&lower)
            .and_then(|caps| caps.get(1)?.as_str().parse().ok()),
        rating_count: RATING_COUNT_CONTEXT
            .captures(&lower)
            .and_then(|caps| compact_from_captures(&caps)),
        like_count: LIKE_CONTEXT
            .captures(&lower)
            .and_then(|caps| compact_from_captures(&caps)),
        share_count: SHARE_CONTEXT
            .captures(&lower)
            .and_then(|caps| compact_from_captures(&caps)),
    }
}

fn selector_list<'a>(
    generic: &'static [&'static str],
    extra: Option<&'a [String]>,
) -> Vec<&'a str> {
    let mut selectors: Vec<&str> = generic.to_vec();
    if let Some(extra) = extra {
        selectors.extend(extra.iter().map(String::as_str));
    }
    selectors
}

/// Signals from markup, falling back to visible text.
///
/// Generic selectors are probed before profile selectors and the first
/// parsed value wins. BBC Good Food keeps its averages in a script blob,
/// which fills whatever the markup left missing.
pub fn signals_from_dom(page: &Page, profile: Option<&EffectiveProfile>) -> Signals {
    let rating_selectors = selector_list(
        GENERIC_RATING_SELECTORS,
        profile.map(|p| p.rating_value_selectors.as_slice()),
    );
    let count_selectors = selector_list(
        GENERIC_RATING_COUNT_SELECTORS,
        profile.map(|p| p.rating_count_selectors.as_slice()),
    );
    let like_selectors = selector_list(
        GENERIC_LIKE_SELECTORS,
        profile.map(|p| p.like_count_selectors.as_slice()),
    );
    let share_selectors = selector_list(
        GENERIC_SHARE_SELECTORS,
        profile.map(|p| p.share_count_selectors.as_slice()),
    );

    let from_text = signals_from_text(page.text());
    let mut signals = Signals {
        rating_value: numeric_from_selectors(page, rating_selectors, NumberKind::Star)
            .or(from_text.rating_value),
        rating_count: numeric_from_selectors(page, count_selectors, NumberKind::Count)
            .map(|n| n as i64)
            .or(from_text.rating_count),
        like_count: numeric_from_selectors(page, like_selectors, NumberKind::Count)
            .map(|n| n as i64)
            .or(from_text.like_count),
        share_count: numeric_from_selectors(page, share_selectors, NumberKind::Count)
            .map(|n| n as i64)
            .or(from_text.share_count),
    };

    let missing_count = signals.rating_count.unwrap_or(0) <= 0;
    let incomplete = missing_count || signals.rating_value.is_none();
    if page.host().ends_with("bbcgoodfood.com") && incomplete {
        let payload: String = page
            .select_first("script#__POST_CONTENT__")
            .map(|script| script.text().collect())
            .unwrap_or_default();
        if let Some(caps) = BBC_USER_RATINGS.captures(&payload) {
            if signals.rating_value.is_none() {
                signals.rating_value = caps.name("avg").and_then(|m| m.as_str().parse().ok());
            }
            if missing_count {
                if let Some(total) = caps.name("total").and_then(|m| m.as_str().parse().ok()) {
                    signals.rating_count = Some(total);
                }
            }
        }
    }
    signals
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Numeric JSON value truncated to an integer.
pub fn value_to_i64(value: &Value) -> Option<i64> {
    value_to_f64(value).map(|f| f as i64)
}

/// Rating value and count from a JSON-LD `aggregateRating` object.
pub fn aggregate_rating(value: Option<&Value>) -> (Option<f64>, Option<i64>) {
    let Some(Value::Object(obj)) = value else {
        return (None, None);
    };
    let rating_value = obj.get("ratingValue").and_then(value_to_f64);
    let count = obj
        .get("ratingCount")
        .filter(|v| truthy(v))
        .or_else(|| obj.get("reviewCount"))
        .and_then(value_to_i64);
    (rating_value, count)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Like and share counts from JSON-LD `interactionStatistic`, which may be
/// a single object or a list.
pub fn interaction_counts(value: Option<&Value>) -> (Option<i64>, Option<i64>) {
    let entries: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(obj @ Value::Object(_)) => vec![obj],
        _ => return (None, None),
    };
    let mut likes = None;
    let mut shares = None;
    for entry in entries {
        let Value::Object(entry) = entry else {
            continue;
        };
        let interaction_type = match entry.get("interactionType") {
            Some(Value::Object(t)) => t
                .get("@type")
                .filter(|v| truthy(v))
                .or_else(|| t.get("name"))
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .unwrap_or_default(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        }
        .to_lowercase();
        let Some(count) = entry.get("userInteractionCount").and_then(value_to_i64) else {
            continue;
        };
        if interaction_type.contains("like") {
            likes = Some(count);
        }
        if interaction_type.contains("share") {
            shares = Some(count);
        }
    }
    (likes, shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_count() {
        assert_eq!(first_count("1.2k ratings"), Some(1200));
        assert_eq!(first_count("(3,400 reviews)"), Some(3400));
        assert_eq!(first_count("12 likes"), Some(12));
        assert_eq!(first_count("Rated 4.5 out of 5"), None);
        assert_eq!(first_count("4/5 from 87"), Some(87));
        assert_eq!(first_count("no digits"), None);
        assert_eq!(first_count("  "), None);
    }

    #[test]
    fn test_first_star() {
        assert_eq!(first_star("4.5 out of 5 stars"), Some(4.5));
        assert_eq!(first_star("3/5"), Some(3.0));
        assert_eq!(first_star(" 4.7 "), Some(4.7));
        assert_eq!(first_star("great"), None);
    }

    #[test]
    fn test_text_signals() {
        let signals = signals_from_text(
            "Rated 4.6 out of 5 from 1,204 Ratings. 2.3K likes and 15 shares",
        );
        assert_eq!(signals.rating_value, Some(4.6));
        assert_eq!(signals.rating_count, Some(1204));
        assert_eq!(signals.like_count, Some(2300));
        assert_eq!(signals.share_count, Some(15));
    }

    #[test]
    fn test_dom_signals_prefer_markup() {
        let html = r#"<html><body>
            <span itemprop="ratingValue" content="4.8">4.8</span>
            <span data-rating-count="250"></span>
            <p>Rated 3 out of 5 by 12 ratings</p>
        </body></html>"#;
        let page = Page::parse(html, "https://example.com/recipe/x");
        let signals = signals_from_dom(&page, None);
        assert_eq!(signals.rating_value, Some(4.8));
        assert_eq!(signals.rating_count, Some(250));
        assert_eq!(signals.like_count, None);
    }

    #[test]
    fn test_bbc_post_content_fallback() {
        let html = r#"<html><body>
            <script id="__POST_CONTENT__">{"userRatings": {"avg": 4.4, "total": 318}}</script>
        </body></html>"#;
        let page = Page::parse(html, "https://www.bbcgoodfood.com/recipes/mojito");
        let signals = signals_from_dom(&page, None);
        assert_eq!(signals.rating_value, Some(4.4));
        assert_eq!(signals.rating_count, Some(318));
    }

    #[test]
    fn test_interaction_counts() {
        let stats = json!([
            {"interactionType": "https://schema.org/LikeAction", "userInteractionCount": "41"},
            {"interactionType": {"@type": "ShareAction"}, "userInteractionCount": 7.9},
        ]);
        assert_eq!(interaction_counts(Some(&stats)), (Some(41), Some(7)));
        let single = json!({"interactionType": "LikeAction", "userInteractionCount": 3});
        assert_eq!(interaction_counts(Some(&single)), (Some(3), None));
        assert_eq!(interaction_counts(None), (None, None));
    }

    #[test]
    fn test_aggregate_rating() {
        let agg = json!({"ratingValue": "4.5", "reviewCount": 30});
        assert_eq!(aggregate_rating(Some(&agg)), (Some(4.5), Some(30)));
        assert_eq!(aggregate_rating(Some(&json!("x"))), (None, None));
    }
}
