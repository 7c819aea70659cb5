//! Compliance gate.
//!
//! Every check runs and every violation is reported, so operators see all
//! of a page's problems at once.

mod robots;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{host_matches_domain, normalized_host, SettingsMap};
use crate::parser::{
    find_recipe, find_recipe_like, is_probable_recipe_url, normalized_path, EffectiveProfile, Page,
};

pub use robots::{fetch_robots, robots_url, RobotsCache, RobotsTxt};

const DEFAULT_BLOCKED_TITLE_KEYWORDS: &[&str] = &["privacy", "terms", "cookie", "login", "sign in"];
const DEFAULT_REQUIRED_MARKERS: &[&str] = &["ingredients", "instructions"];
const PAYWALL_MARKERS: &[&str] = &["subscribe to continue", "members only", "subscriber-only"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplianceReason {
    RobotsDisallowAll,
    RobotsMetaBlocked,
    CanonicalHostMismatch,
    NonRecipePage,
    MissingRecipeMarkers,
    PaywallDetected,
}

impl ComplianceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RobotsDisallowAll => "robots-disallow-all",
            Self::RobotsMetaBlocked => "robots-meta-blocked",
            Self::CanonicalHostMismatch => "canonical-host-mismatch",
            Self::NonRecipePage => "non-recipe-page",
            Self::MissingRecipeMarkers => "missing-recipe-markers",
            Self::PaywallDetected => "paywall-detected",
        }
    }
}

impl fmt::Display for ComplianceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplianceResult {
    pub reasons: Vec<ComplianceReason>,
}

impl ComplianceResult {
    pub fn is_allowed(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn push(&mut self, reason: ComplianceReason) {
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
    }

    pub fn reason_strings(&self) -> Vec<String> {
        self.reasons.iter().map(|r| r.as_str().to_string()).collect()
    }

    /// `Compliance check failed: <r1>, <r2>`
    pub fn job_error(&self) -> String {
        format!("Compliance check failed: {}", self.reason_strings().join(", "))
    }
}

/// Hosts differ and `candidate` is not a subdomain of `source`.
fn foreign_host(candidate: &str, source: &str) -> bool {
    !candidate.is_empty()
        && !source.is_empty()
        && candidate != source
        && !host_matches_domain(candidate, source)
}

fn robots_meta_blocked(page: &Page) -> bool {
    page.select("meta")
        .into_iter()
        .filter(|meta| {
            meta.value()
                .attr("name")
                .is_some_and(|name| name.trim().eq_ignore_ascii_case("robots"))
        })
        .filter_map(|meta| meta.value().attr("content"))
        .map(str::to_lowercase)
        .any(|content| content.contains("noindex") || content.contains("nofollow"))
}

fn canonical_href(page: &Page) -> Option<String> {
    page.select("link")
        .into_iter()
        .find(|link| {
            link.value()
                .attr("rel")
                .is_some_and(|rel| rel.to_lowercase().contains("canonical"))
        })
        .and_then(|link| link.value().attr("href"))
        .map(|href| href.trim().to_string())
        .filter(|href| !href.is_empty())
}

/// Keywords as they appear in a URL slug (`sign in` -> `sign-in`).
fn slug(keyword: &str) -> String {
    keyword.trim().to_lowercase().replace(' ', "-")
}

/// Page-level checks for a fetched document.
///
/// `requested_url` is the job's URL; `page.url()` is where the document
/// was finally served from. A redirect onto a foreign host counts as a
/// canonical host mismatch.
pub fn evaluate_page_compliance(
    page: &Page,
    requested_url: &str,
    settings: &SettingsMap,
) -> ComplianceResult {
    let mut result = ComplianceResult::default();
    let profile = EffectiveProfile::resolve(requested_url, settings);

    if robots_meta_blocked(page) {
        result.push(ComplianceReason::RobotsMetaBlocked);
    }

    let source_host = normalized_host(requested_url);
    let canonical_host = canonical_href(page).map(|href| normalized_host(&href));
    let served_host = normalized_host(page.url());
    if canonical_host.is_some_and(|host| foreign_host(&host, &source_host))
        || foreign_host(&served_host, &source_host)
    {
        result.push(ComplianceReason::CanonicalHostMismatch);
    }

    let blocked_keywords: Vec<String> = match &profile {
        Some(profile) => profile.blocked_title_keywords.clone(),
        None => DEFAULT_BLOCKED_TITLE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
    };
    let title = page.title().unwrap_or_default().to_lowercase();
    let path = normalized_path(requested_url);
    let title_blocked = !title.is_empty()
        && blocked_keywords
            .iter()
            .any(|k| !k.trim().is_empty() && title.contains(&k.trim().to_lowercase()));
    let path_blocked = blocked_keywords
        .iter()
        .map(|k| slug(k))
        .any(|k| !k.is_empty() && path.contains(&k));
    if title_blocked || path_blocked {
        result.push(ComplianceReason::NonRecipePage);
    }

    let text = page.lower_text();
    // Index and category pages are crawled for links, so only pages that
    // look like single recipes need recipe markers.
    if is_probable_recipe_url(requested_url, settings) {
        let markers: Vec<String> = match &profile {
            Some(profile) => profile.required_text_markers.clone(),
            None => DEFAULT_REQUIRED_MARKERS.iter().map(|m| m.to_string()).collect(),
        };
        let all_missing = !markers.is_empty()
            && markers
                .iter()
                .all(|marker| !text.contains(&marker.to_lowercase()));
        if all_missing {
            let items = page.jsonld();
            let has_schema = find_recipe(items).is_some() || find_recipe_like(items).is_some();
            let has_selector_markers = profile.as_ref().is_some_and(|profile| {
                page.any_match(&profile.ingredient_selectors)
                    || page.any_match(&profile.instruction_selectors)
            });
            if !has_schema && !has_selector_markers {
                result.push(ComplianceReason::MissingRecipeMarkers);
            }
        }
    }

    if PAYWALL_MARKERS.iter().any(|marker| text.contains(marker)) {
        result.push(ComplianceReason::PaywallDetected);
    }

    result
}

/// Reject a URL whose robots.txt disallows everything for `*` or this
/// path.
pub fn evaluate_robots(robots: Option<&RobotsTxt>, url: &str) -> Option<ComplianceReason> {
    let robots = robots?;
    let path = url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| "/".to_string());
    if robots.disallows_all() || !robots.is_allowed(&path) {
        return Some(ComplianceReason::RobotsDisallowAll);
    }
    None
}
