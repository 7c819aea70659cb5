//! Per-domain source policy.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// JSON object used for parser and alert settings.
pub type SettingsMap = Map<String, Value>;

/// How popularity is judged for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Ratings,
    Pervasiveness,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ratings => "ratings",
            Self::Pervasiveness => "pervasiveness",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ratings" => Some(Self::Ratings),
            "pervasiveness" => Some(Self::Pervasiveness),
            _ => None,
        }
    }
}

/// Whether harvested candidates need a human review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewPolicy {
    Manual,
    Auto,
}

impl ReviewPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

/// Validation failures for policy input.
#[derive(Debug, Error, PartialEq)]
pub enum PolicyValidationError {
    #[error("domain must be a bare hostname without protocol or path: {0}")]
    InvalidDomain(String),
    #[error("domain is immutable once created")]
    DomainImmutable,
    #[error("seed url must use http or https: {0}")]
    InvalidSeedUrl(String),
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
    #[error("name is required")]
    MissingName,
}

/// A stored source policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePolicy {
    pub id: String,
    pub name: String,
    /// Lowercase bare hostname. Immutable after creation.
    pub domain: String,
    pub metric_type: MetricType,
    pub min_rating_count: i64,
    pub min_rating_value: f64,
    pub review_policy: ReviewPolicy,
    pub is_active: bool,
    pub seed_urls: Vec<String>,
    pub crawl_depth: i32,
    pub max_pages: i32,
    pub max_recipes: i32,
    pub crawl_interval_minutes: i32,
    pub respect_robots: bool,
    /// Compliance rejections are terminal unless this is set.
    pub retry_compliance_failures: bool,
    pub parser_settings: SettingsMap,
    pub alert_settings: SettingsMap,
    pub last_swept_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SourcePolicy {
    /// Whether a URL's host belongs to this policy's domain.
    pub fn matches_url(&self, url: &str) -> bool {
        host_matches_domain(&normalized_host(url), &self.domain)
    }

    /// True when the crawl interval has elapsed since the last sweep.
    pub fn is_sweep_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_swept_at {
            None => true,
            Some(last) => {
                now - last >= chrono::Duration::minutes(i64::from(self.crawl_interval_minutes))
            }
        }
    }
}

/// Input for creating a policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSourcePolicy {
    pub name: String,
    pub domain: String,
    #[serde(default = "default_metric_type")]
    pub metric_type: MetricType,
    #[serde(default)]
    pub min_rating_count: i64,
    #[serde(default)]
    pub min_rating_value: f64,
    #[serde(default = "default_review_policy")]
    pub review_policy: ReviewPolicy,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub seed_urls: Vec<String>,
    #[serde(default = "default_crawl_depth")]
    pub crawl_depth: i32,
    #[serde(default = "default_max_pages")]
    pub max_pages: i32,
    #[serde(default = "default_max_recipes")]
    pub max_recipes: i32,
    #[serde(default = "default_crawl_interval")]
    pub crawl_interval_minutes: i32,
    #[serde(default = "default_true")]
    pub respect_robots: bool,
    #[serde(default)]
    pub retry_compliance_failures: bool,
    #[serde(default)]
    pub parser_settings: SettingsMap,
    #[serde(default)]
    pub alert_settings: SettingsMap,
}

fn default_metric_type() -> MetricType {
    MetricType::Ratings
}
fn default_review_policy() -> ReviewPolicy {
    ReviewPolicy::Manual
}
fn default_true() -> bool {
    true
}
fn default_crawl_depth() -> i32 {
    2
}
fn default_max_pages() -> i32 {
    40
}
fn default_max_recipes() -> i32 {
    20
}
fn default_crawl_interval() -> i32 {
    240
}

impl NewSourcePolicy {
    pub fn new(name: &str, domain: &str, metric_type: MetricType) -> Self {
        Self {
            name: name.to_string(),
            domain: domain.to_string(),
            metric_type,
            min_rating_count: 0,
            min_rating_value: 0.0,
            review_policy: ReviewPolicy::Manual,
            is_active: true,
            seed_urls: Vec::new(),
            crawl_depth: default_crawl_depth(),
            max_pages: default_max_pages(),
            max_recipes: default_max_recipes(),
            crawl_interval_minutes: default_crawl_interval(),
            respect_robots: true,
            retry_compliance_failures: false,
            parser_settings: SettingsMap::new(),
            alert_settings: SettingsMap::new(),
        }
    }

    /// Normalize and validate in place.
    pub fn validate(&mut self) -> Result<(), PolicyValidationError> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(PolicyValidationError::MissingName);
        }
        self.domain = normalize_domain(&self.domain)?;
        self.seed_urls = validate_seed_urls(&self.seed_urls)?;
        validate_limits(
            self.crawl_depth,
            self.max_pages,
            self.max_recipes,
            self.crawl_interval_minutes,
        )
    }
}

/// Partial update. `domain` may only be repeated unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcePolicyPatch {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub metric_type: Option<MetricType>,
    pub min_rating_count: Option<i64>,
    pub min_rating_value: Option<f64>,
    pub review_policy: Option<ReviewPolicy>,
    pub is_active: Option<bool>,
    pub seed_urls: Option<Vec<String>>,
    pub crawl_depth: Option<i32>,
    pub max_pages: Option<i32>,
    pub max_recipes: Option<i32>,
    pub crawl_interval_minutes: Option<i32>,
    pub respect_robots: Option<bool>,
    pub retry_compliance_failures: Option<bool>,
    pub parser_settings: Option<SettingsMap>,
    pub alert_settings: Option<SettingsMap>,
}

impl SourcePolicyPatch {
    /// Apply to a policy, validating the result.
    pub fn apply_to(&self, policy: &mut SourcePolicy) -> Result<(), PolicyValidationError> {
        if let Some(ref domain) = self.domain {
            if normalize_domain(domain)? != policy.domain {
                return Err(PolicyValidationError::DomainImmutable);
            }
        }
        if let Some(ref name) = self.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(PolicyValidationError::MissingName);
            }
            policy.name = name.to_string();
        }
        if let Some(v) = self.metric_type {
            policy.metric_type = v;
        }
        if let Some(v) = self.min_rating_count {
            policy.min_rating_count = v;
        }
        if let Some(v) = self.min_rating_value {
            policy.min_rating_value = v;
        }
        if let Some(v) = self.review_policy {
            policy.review_policy = v;
        }
        if let Some(v) = self.is_active {
            policy.is_active = v;
        }
        if let Some(ref seeds) = self.seed_urls {
            policy.seed_urls = validate_seed_urls(seeds)?;
        }
        if let Some(v) = self.crawl_depth {
            policy.crawl_depth = v;
        }
        if let Some(v) = self.max_pages {
            policy.max_pages = v;
        }
        if let Some(v) = self.max_recipes {
            policy.max_recipes = v;
        }
        if let Some(v) = self.crawl_interval_minutes {
            policy.crawl_interval_minutes = v;
        }
        if let Some(v) = self.respect_robots {
            policy.respect_robots = v;
        }
        if let Some(v) = self.retry_compliance_failures {
            policy.retry_compliance_failures = v;
        }
        if let Some(ref v) = self.parser_settings {
            policy.parser_settings = v.clone();
        }
        if let Some(ref v) = self.alert_settings {
            policy.alert_settings = v.clone();
        }
        validate_limits(
            policy.crawl_depth,
            policy.max_pages,
            policy.max_recipes,
            policy.crawl_interval_minutes,
        )?;
        policy.updated_at = Utc::now();
        Ok(())
    }
}

fn validate_limits(
    crawl_depth: i32,
    max_pages: i32,
    max_recipes: i32,
    crawl_interval_minutes: i32,
) -> Result<(), PolicyValidationError> {
    let checks: [(&'static str, i32, i32, i32); 4] = [
        ("crawl_depth", crawl_depth, 0, 10),
        ("max_pages", max_pages, 1, 2000),
        ("max_recipes", max_recipes, 1, 500),
        ("crawl_interval_minutes", crawl_interval_minutes, 5, i32::MAX),
    ];
    for (field, value, min, max) in checks {
        if value < min || value > max {
            return Err(PolicyValidationError::OutOfRange {
                field,
                value: i64::from(value),
            });
        }
    }
    Ok(())
}

/// Lowercase and check a bare domain.
pub fn normalize_domain(raw: &str) -> Result<String, PolicyValidationError> {
    let domain = raw.trim().to_lowercase();
    let valid = Regex::new(r"^[a-z0-9.-]+$")
        .map(|re| re.is_match(&domain))
        .unwrap_or(false);
    if domain.is_empty() || domain.contains("://") || domain.contains('/') || !valid {
        return Err(PolicyValidationError::InvalidDomain(raw.to_string()));
    }
    Ok(domain)
}

fn validate_seed_urls(seeds: &[String]) -> Result<Vec<String>, PolicyValidationError> {
    let mut cleaned = Vec::new();
    for seed in seeds {
        let seed = seed.trim();
        if seed.is_empty() {
            continue;
        }
        let scheme_ok = url::Url::parse(seed)
            .map(|u| u.scheme() == "http" || u.scheme() == "https")
            .unwrap_or(false);
        if !scheme_ok {
            return Err(PolicyValidationError::InvalidSeedUrl(seed.to_string()));
        }
        cleaned.push(seed.to_string());
    }
    Ok(cleaned)
}

/// URL host, lowercased, without a leading `www.`.
pub fn normalized_host(url: &str) -> String {
    let host = url::Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_default();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// `host` equals `domain` or is a subdomain of it.
pub fn host_matches_domain(host: &str, domain: &str) -> bool {
    let host = host.trim().to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    let domain = domain.trim().to_lowercase();
    if host.is_empty() || domain.is_empty() {
        return false;
    }
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// First active policy owning the URL's host.
pub fn match_policy<'a>(url: &str, policies: &'a [SourcePolicy]) -> Option<&'a SourcePolicy> {
    let host = normalized_host(url);
    if host.is_empty() {
        return None;
    }
    policies
        .iter()
        .filter(|p| p.is_active)
        .find(|p| host_matches_domain(&host, &p.domain))
}

fn settings(value: Value) -> SettingsMap {
    match value {
        Value::Object(map) => map,
        _ => SettingsMap::new(),
    }
}

/// Built-in policies installed by `harvest init --seed-defaults`.
pub fn default_policies() -> Vec<NewSourcePolicy> {
    let mut allrecipes = NewSourcePolicy::new("Allrecipes", "allrecipes.com", MetricType::Ratings);
    allrecipes.min_rating_count = 10;
    allrecipes.seed_urls = vec!["https://www.allrecipes.com/recipes/77/drinks/".to_string()];
    allrecipes.parser_settings = settings(json!({
        "recipe_path_hints": ["/recipe/"],
        "blocked_path_hints": [
            "/recipes-a-z", "/privacy", "/terms", "/account/", "/signin", "/login"
        ],
        "required_text_markers": ["ingredients", "directions"],
    }));

    let mut bbc = NewSourcePolicy::new("BBC Good Food", "bbcgoodfood.com", MetricType::Ratings);
    bbc.min_rating_count = 5;
    bbc.seed_urls =
        vec!["https://www.bbcgoodfood.com/recipes/collection/cocktail-recipes".to_string()];
    bbc.parser_settings = settings(json!({
        "recipe_path_hints": ["/recipes/"],
        "blocked_path_hints": [
            "/recipes/collection/", "/recipes/category/", "/news-", "/review/", "/feature/"
        ],
        "required_text_markers": ["ingredients", "method"],
    }));

    let mut food = NewSourcePolicy::new("Food.com", "food.com", MetricType::Ratings);
    food.min_rating_count = 5;
    food.seed_urls = vec!["https://www.food.com/search/cocktail".to_string()];
    food.parser_settings = settings(json!({
        "recipe_path_hints": ["/recipe/"],
        "blocked_path_hints": ["/ideas/", "/article/", "/privacy", "/terms"],
        "required_text_markers": ["ingredients", "directions"],
    }));

    let mut difford = NewSourcePolicy::new(
        "Difford's Guide",
        "diffordsguide.com",
        MetricType::Pervasiveness,
    );
    difford.seed_urls = vec!["https://www.diffordsguide.com/cocktails/search".to_string()];
    difford.parser_settings = settings(json!({
        "recipe_path_hints": ["/cocktails/recipe/"],
        "blocked_path_hints": [
            "/encyclopedia/",
            "/cocktails/search",
            "/cocktails/how-to-make",
            "/cocktails/directory"
        ],
        "required_text_markers": ["ingredients", "method"],
    }));

    let mut imbibe =
        NewSourcePolicy::new("Imbibe", "imbibemagazine.com", MetricType::Pervasiveness);
    imbibe.seed_urls = vec!["https://imbibemagazine.com/category/recipes/".to_string()];
    imbibe.parser_settings = settings(json!({
        "recipe_path_hints": ["/recipe/"],
        "blocked_path_hints": [
            "/category/recipes/", "/category/", "/events/", "/shop/", "/recipes/page/"
        ],
        "required_text_markers": ["ingredients", "instructions", "directions", "method"],
        "instruction_heading_keywords": ["instructions", "directions", "method", "how to make"],
    }));

    let mut punch = NewSourcePolicy::new("Punch", "punchdrink.com", MetricType::Pervasiveness);
    // Root seed lets discovery reach the sitemap; the recipe index is infinite scroll.
    punch.seed_urls = vec![
        "https://punchdrink.com/".to_string(),
        "https://punchdrink.com/recipes/feed/".to_string(),
    ];
    punch.parser_settings = settings(json!({
        "recipe_path_hints": ["/recipes/"],
        "blocked_path_hints": [
            "/recipe-archives", "/article/", "/city-guides/", "/menus/", "/how-to/", "/news/"
        ],
        "required_text_markers": ["ingredients", "instructions", "directions", "method"],
        "instruction_heading_keywords": ["instructions", "directions", "method", "preparation"],
        "min_extraction_confidence": 0.3,
    }));

    vec![allrecipes, bbc, food, difford, imbibe, punch]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(new: NewSourcePolicy) -> SourcePolicy {
        SourcePolicy {
            id: uuid::Uuid::new_v4().to_string(),
            name: new.name,
            domain: new.domain,
            metric_type: new.metric_type,
            min_rating_count: new.min_rating_count,
            min_rating_value: new.min_rating_value,
            review_policy: new.review_policy,
            is_active: new.is_active,
            seed_urls: new.seed_urls,
            crawl_depth: new.crawl_depth,
            max_pages: new.max_pages,
            max_recipes: new.max_recipes,
            crawl_interval_minutes: new.crawl_interval_minutes,
            respect_robots: new.respect_robots,
            retry_compliance_failures: new.retry_compliance_failures,
            parser_settings: new.parser_settings,
            alert_settings: new.alert_settings,
            last_swept_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_domain_validation() {
        assert_eq!(normalize_domain(" AllRecipes.com ").unwrap(), "allrecipes.com");
        assert!(normalize_domain("https://allrecipes.com").is_err());
        assert!(normalize_domain("allrecipes.com/recipes").is_err());
        assert!(normalize_domain("all recipes.com").is_err());
        assert!(normalize_domain("").is_err());
    }

    #[test]
    fn test_new_policy_validation() {
        let mut policy = NewSourcePolicy::new("Test", "Example.COM", MetricType::Ratings);
        policy.seed_urls = vec!["https://example.com/".to_string()];
        assert!(policy.validate().is_ok());
        assert_eq!(policy.domain, "example.com");

        policy.seed_urls = vec!["ftp://example.com/".to_string()];
        assert!(matches!(
            policy.validate(),
            Err(PolicyValidationError::InvalidSeedUrl(_))
        ));

        let mut policy = NewSourcePolicy::new("Test", "example.com", MetricType::Ratings);
        policy.max_pages = 0;
        assert!(matches!(
            policy.validate(),
            Err(PolicyValidationError::OutOfRange { field: "max_pages", .. })
        ));
    }

    #[test]
    fn test_patch_rejects_domain_change() {
        let mut policy = stored(NewSourcePolicy::new("Test", "example.com", MetricType::Ratings));
        let patch = SourcePolicyPatch {
            domain: Some("other.com".to_string()),
            ..Default::default()
        };
        assert_eq!(
            patch.apply_to(&mut policy),
            Err(PolicyValidationError::DomainImmutable)
        );

        let patch = SourcePolicyPatch {
            domain: Some("EXAMPLE.com".to_string()),
            max_recipes: Some(5),
            ..Default::default()
        };
        assert!(patch.apply_to(&mut policy).is_ok());
        assert_eq!(policy.max_recipes, 5);
    }

    #[test]
    fn test_match_policy() {
        let mut inactive = stored(NewSourcePolicy::new("Food", "food.com", MetricType::Ratings));
        inactive.is_active = false;
        let policies = vec![
            inactive,
            stored(NewSourcePolicy::new("Punch", "punchdrink.com", MetricType::Pervasiveness)),
        ];

        assert_eq!(
            match_policy("https://www.punchdrink.com/recipes/negroni/", &policies)
                .map(|p| p.domain.as_str()),
            Some("punchdrink.com")
        );
        assert!(match_policy("https://www.food.com/recipe/x", &policies).is_none());
        assert!(match_policy("https://notpunchdrink.com/", &policies).is_none());
        assert!(match_policy("not a url", &policies).is_none());
    }

    #[test]
    fn test_host_matching() {
        assert_eq!(normalized_host("https://WWW.Allrecipes.com/recipe/1"), "allrecipes.com");
        assert!(host_matches_domain("www.allrecipes.com", "allrecipes.com"));
        assert!(host_matches_domain("m.allrecipes.com", "allrecipes.com"));
        assert!(!host_matches_domain("fakeallrecipes.com", "allrecipes.com"));
    }

    #[test]
    fn test_default_policies_are_valid() {
        let mut defaults = default_policies();
        assert_eq!(defaults.len(), 6);
        for policy in defaults.iter_mut() {
            assert!(policy.validate().is_ok(), "{} invalid", policy.domain);
        }
    }

    #[test]
    fn test_sweep_due() {
        let mut policy = stored(NewSourcePolicy::new("Test", "example.com", MetricType::Ratings));
        let now = Utc::now();
        assert!(policy.is_sweep_due(now));
        policy.last_swept_at = Some(now - chrono::Duration::minutes(10));
        assert!(!policy.is_sweep_due(now));
        policy.last_swept_at = Some(now - chrono::Duration::minutes(241));
        assert!(policy.is_sweep_due(now));
    }
}
