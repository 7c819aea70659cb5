//! Built-in per-domain extraction profiles.
//!
//! A profile names the selectors and text markers that work for one
//! publisher. Policy `parser_settings` may replace any list with a
//! non-empty override; the merged result is an [`EffectiveProfile`].

use crate::models::{host_matches_domain, normalized_host, SettingsMap};

use super::settings::list_override;

/// Static selector set for one publisher.
#[derive(Debug)]
pub struct DomainProfile {
    pub domain: &'static str,
    pub ingredient_selectors: &'static [&'static str],
    pub instruction_selectors: &'static [&'static str],
    pub rating_value_selectors: &'static [&'static str],
    pub rating_count_selectors: &'static [&'static str],
    pub like_count_selectors: &'static [&'static str],
    pub share_count_selectors: &'static [&'static str],
    pub required_text_markers: &'static [&'static str],
    pub blocked_title_keywords: &'static [&'static str],
    pub recipe_path_hints: &'static [&'static str],
    pub blocked_path_hints: &'static [&'static str],
}

pub static DOMAIN_PROFILES: &[DomainProfile] = &[
    DomainProfile {
        domain: "allrecipes.com",
        ingredient_selectors: &[
            r#"[data-testid="recipe-ingredients-item"]"#,
            "li.mm-recipes-structured-ingredients__list-item",
            r#"[id*="mntl-structured-ingredients"] li"#,
            r#"[id*="mntl-structured-ingredients"] .mntl-structured-ingredients__list-item"#,
            r#"[class*="recipe-ingredients"] li"#,
            r#"[class*="ingredients-list"] li"#,
        ],
        instruction_selectors: &[
            r#"[data-testid="recipe-instructions"] li"#,
            r#"[id*="recipe__steps-content"] li"#,
            r#"[class*="instructions"] li"#,
            r#"[class*="recipe-directions"] li"#,
            r#"[class*="recipe-instructions"] li"#,
        ],
        rating_value_selectors: &[
            r#"[itemprop="ratingValue"]"#,
            ".mntl-recipe-review-bar__rating",
            "[data-rating-stars]",
            "[data-rating]",
            r#"[aria-label*="rating"]"#,
        ],
        rating_count_selectors: &[
            r#"[itemprop="ratingCount"]"#,
            r#"[itemprop="reviewCount"]"#,
            ".mntl-recipe-review-bar__rating-count",
            "[data-ratings-count]",
            "[data-rating-count]",
            r#"[class*="review-count"]"#,
        ],
        like_count_selectors: &[
            "[data-like-count]",
            r#"[class*="like-count"]"#,
            r#"[aria-label*="Like"]"#,
            r#"[class*="favorite-count"]"#,
        ],
        share_count_selectors: &[
            "[data-share-count]",
            r#"[class*="share-count"]"#,
            r#"[aria-label*="Share"]"#,
            r#"[class*="social-count"]"#,
        ],
        required_text_markers: &["ingredients", "directions"],
        blocked_title_keywords: &["privacy", "terms", "cookie", "login", "sign in"],
        recipe_path_hints: &["/recipe/"],
        blocked_path_hints: &[
            "/privacy",
            "/terms",
            "/account/",
            "/signin",
            "/login",
            "/news/",
            "/about-",
            "/recipes-a-z",
        ],
    },
    DomainProfile {
        domain: "bbcgoodfood.com",
        ingredient_selectors: &[
            ".recipe__ingredients li",
            r#"[class*="ingredients-list"] li"#,
            r#"[class*="recipe-ingredients"] li"#,
            r#"[class*="ingredients"] li"#,
        ],
        instruction_selectors: &[
            ".recipe__method-steps li",
            r#"[class*="method-steps"] li"#,
            r#"[class*="recipe-method"] li"#,
            r#"[class*="instructions"] li"#,
        ],
        rating_value_selectors: &[
            r#"[itemprop="ratingValue"]"#,
            r#"[class*="rating"] [class*="value"]"#,
            "[data-rating]",
        ],
        rating_count_selectors: &[
            r#"[itemprop="ratingCount"]"#,
            r#"[itemprop="reviewCount"]"#,
            r#"[class*="rating"] [class*="count"]"#,
            r#"[class*="review-count"]"#,
        ],
        like_count_selectors: &["[data-like-count]", r#"[class*="like-count"]"#],
        share_count_selectors: &["[data-share-count]", r#"[class*="share-count"]"#],
        required_text_markers: &["ingredients", "method"],
        blocked_title_keywords: &["privacy", "terms", "cookie", "subscribe"],
        recipe_path_hints: &["/recipes/"],
        blocked_path_hints: &[
            "/recipes/collection/",
            "/recipes/category/",
            "/news-",
            "/review/",
            "/health/",
            "/howto/",
            "/feature/",
            "/recipes/search",
        ],
    },
    DomainProfile {
        domain: "food.com",
        ingredient_selectors: &[
            ".recipe-ingredients li",
            ".recipe-ingredients__ingredient",
            r#"[class*="ingredients"] li"#,
            r#"[class*="ingredient-list"] li"#,
        ],
        instruction_selectors: &[
            ".recipe-directions li",
            r#"[class*="directions"] li"#,
            r#"[class*="instructions"] li"#,
            r#"[class*="method"] li"#,
        ],
        rating_value_selectors: &[
            r#"[itemprop="ratingValue"]"#,
            r#"[class*="rating"] [class*="value"]"#,
            "[data-rating]",
        ],
        rating_count_selectors: &[
            r#"[itemprop="ratingCount"]"#,
            r#"[itemprop="reviewCount"]"#,
            r#"[class*="review-count"]"#,
            "[data-rating-count]",
        ],
        like_count_selectors: &["[data-like-count]", r#"[class*="save-count"]"#],
        share_count_selectors: &["[data-share-count]", r#"[class*="share-count"]"#],
        required_text_markers: &["ingredients", "directions"],
        blocked_title_keywords: &["privacy", "terms", "cookie", "login"],
        recipe_path_hints: &["/recipe/"],
        blocked_path_hints: &["/ideas/", "/article/", "/about", "/privacy", "/terms"],
    },
    DomainProfile {
        domain: "diffordsguide.com",
        ingredient_selectors: &[".recipe-ingredients li", r#"[class*="ingredients"] li"#],
        instruction_selectors: &[
            ".recipe-method li",
            r#"[class*="method"] li"#,
            r#"[class*="preparation"] li"#,
        ],
        rating_value_selectors: &[
            r#"[itemprop="ratingValue"]"#,
            r#"[class*="rating"] [class*="value"]"#,
        ],
        rating_count_selectors: &[
            r#"[itemprop="ratingCount"]"#,
            r#"[class*="rating"] [class*="count"]"#,
        ],
        like_count_selectors: &["[data-like-count]", r#"[class*="like-count"]"#],
        share_count_selectors: &["[data-share-count]", r#"[class*="share-count"]"#],
        required_text_markers: &["ingredients", "method"],
        blocked_title_keywords: &["privacy", "terms", "cookie", "subscribe"],
        recipe_path_hints: &["/cocktails/recipe/"],
        blocked_path_hints: &[
            "/encyclopedia/",
            "/cocktails/search",
            "/cocktails/how-to-make",
            "/cocktails/most-viewed",
            "/cocktails/20-best",
            "/cocktails/directory",
            "/forum/",
        ],
    },
    DomainProfile {
        domain: "imbibemagazine.com",
        ingredient_selectors: &[
            ".wprm-recipe-ingredient",
            ".mv-create-ingredients li",
            r#"[class*="ingredients"] li"#,
        ],
        instruction_selectors: &[
            ".wprm-recipe-instruction-text",
            ".mv-create-instructions li",
            r#"[class*="instructions"] li"#,
        ],
        rating_value_selectors: &[
            r#"[itemprop="ratingValue"]"#,
            r#"[class*="rating"] [class*="value"]"#,
        ],
        rating_count_selectors: &[r#"[itemprop="ratingCount"]"#, r#"[itemprop="reviewCount"]"#],
        like_count_selectors: &["[data-like-count]", r#"[class*="like-count"]"#],
        share_count_selectors: &["[data-share-count]", r#"[class*="shared-count"]"#],
        required_text_markers: &["ingredients", "instructions", "directions", "method"],
        blocked_title_keywords: &["privacy", "terms", "cookie", "subscribe"],
        recipe_path_hints: &["/recipe/"],
        blocked_path_hints: &[
            "/category/recipes/",
            "/category/",
            "/events/",
            "/shop/",
            "/about/",
            "/newsletter/",
            "/recipes/page/",
        ],
    },
    DomainProfile {
        domain: "punchdrink.com",
        ingredient_selectors: &[
            ".wprm-recipe-ingredient",
            r#".entry-content [class*="ingredients"] li"#,
            r#"[class*="ingredients"] li"#,
        ],
        instruction_selectors: &[
            ".wprm-recipe-instruction-text",
            r#"[class*="instructions"] li"#,
            r#".entry-content [class*="method"] li"#,
        ],
        rating_value_selectors: &[
            r#"[itemprop="ratingValue"]"#,
            r#"[class*="rating"] [class*="value"]"#,
        ],
        rating_count_selectors: &[r#"[itemprop="ratingCount"]"#, r#"[itemprop="reviewCount"]"#],
        like_count_selectors: &["[data-like-count]", r#"[class*="like-count"]"#],
        share_count_selectors: &["[data-share-count]", r#"[class*="shared-count"]"#],
        required_text_markers: &["ingredients", "instructions", "directions", "method"],
        blocked_title_keywords: &["privacy", "terms", "cookie", "subscribe"],
        recipe_path_hints: &["/recipes/"],
        blocked_path_hints: &[
            "/recipe-archives",
            "/article/",
            "/city-guides/",
            "/menus/",
            "/how-to/",
            "/news/",
            "/pro/",
        ],
    },
];

/// Built-in profile owning `url`'s host, if any.
pub fn profile_for_url(url: &str) -> Option<&'static DomainProfile> {
    let host = normalized_host(url);
    if host.is_empty() {
        return None;
    }
    DOMAIN_PROFILES
        .iter()
        .find(|profile| host_matches_domain(&host, profile.domain))
}

/// A built-in profile with policy overrides applied.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveProfile {
    pub domain: String,
    pub ingredient_selectors: Vec<String>,
    pub instruction_selectors: Vec<String>,
    pub rating_value_selectors: Vec<String>,
    pub rating_count_selectors: Vec<String>,
    pub like_count_selectors: Vec<String>,
    pub share_count_selectors: Vec<String>,
    pub required_text_markers: Vec<String>,
    pub blocked_title_keywords: Vec<String>,
    pub recipe_path_hints: Vec<String>,
    pub blocked_path_hints: Vec<String>,
}

impl EffectiveProfile {
    /// `None` when no built-in profile covers the URL; overrides alone do
    /// not create a profile.
    pub fn resolve(url: &str, settings: &SettingsMap) -> Option<Self> {
        let base = profile_for_url(url)?;
        let merge = |defaults: &[&str], key: &str| list_override(defaults, settings.get(key));
        Some(Self {
            domain: base.domain.to_string(),
            ingredient_selectors: merge(base.ingredient_selectors, "ingredient_selectors"),
            instruction_selectors: merge(base.instruction_selectors, "instruction_selectors"),
            rating_value_selectors: merge(base.rating_value_selectors, "rating_value_selectors"),
            rating_count_selectors: merge(base.rating_count_selectors, "rating_count_selectors"),
            like_count_selectors: merge(base.like_count_selectors, "like_count_selectors"),
            share_count_selectors: merge(base.share_count_selectors, "share_count_selectors"),
            required_text_markers: merge(base.required_text_markers, "required_text_markers"),
            blocked_title_keywords: merge(base.blocked_title_keywords, "blocked_title_keywords"),
            recipe_path_hints: merge(base.recipe_path_hints, "recipe_path_hints"),
            blocked_path_hints: merge(base.blocked_path_hints, "blocked_path_hints"),
        })
    }
}
