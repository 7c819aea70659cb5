//! Recipe extraction.
//!
//! A page runs through an ordered list of [`ParseStage`]s until one yields a
//! candidate. Which stages run, and their order, comes from the policy's
//! `parser_settings`. Candidates carry a confidence score; pages that fail
//! (or score too low) are classified and retried once with recovery
//! settings derived from the failure class.

mod classify;
mod confidence;
mod dom_fallback;
mod domain_dom;
mod ingredient;
mod jsonld;
mod microdata;
mod page;
mod profile;
mod recovery;
mod settings;
mod signals;
mod urls;

use std::fmt;

use tracing::debug;

use crate::models::{ConfidenceBucket, FailureClass, ParseStrategy, ParsedRecipe, SettingsMap};

pub use classify::{
    classify_dom_fallback, classify_parse_failure, has_recipe_jsonld, has_recipe_microdata,
};
pub use confidence::compute_confidence;
pub use dom_fallback::DomFallbackStage;
pub use domain_dom::DomainDomStage;
pub use ingredient::{parse_ingredient_line, parse_raw_text, RawRecipe};
pub use jsonld::{find_recipe, find_recipe_like, normalize_instructions, JsonLdStage};
pub use microdata::MicrodataStage;
pub use page::{element_text, Page};
pub use profile::{profile_for_url, DomainProfile, EffectiveProfile, DOMAIN_PROFILES};
pub use recovery::{
    build_recovery_settings, RecoveryAction, RecoveryPlan, COMPLIANCE_KEYS, DEFAULT_MIN_CONFIDENCE,
};
pub use settings::{bool_setting, float_setting, string_list, StageToggles};
pub use signals::signals_from_dom;
pub use urls::{is_probable_recipe_url, normalize_url, normalized_path};

/// A page together with the settings and profile it is parsed under.
pub struct ParseContext<'a> {
    pub page: &'a Page,
    pub settings: &'a SettingsMap,
    pub profile: Option<EffectiveProfile>,
}

impl<'a> ParseContext<'a> {
    pub fn new(page: &'a Page, settings: &'a SettingsMap) -> Self {
        Self {
            page,
            settings,
            profile: EffectiveProfile::resolve(page.url(), settings),
        }
    }
}

/// One extraction strategy.
pub trait ParseStage: Sync {
    fn name(&self) -> &'static str;

    /// A candidate (confidence not yet scored), or `None` when this stage
    /// cannot read the page.
    fn attempt(&self, ctx: &ParseContext<'_>) -> Option<ParsedRecipe>;
}

/// Stages to try, in order, for the given toggles.
pub fn cascade(toggles: StageToggles) -> Vec<&'static dyn ParseStage> {
    let mut stages: Vec<&'static dyn ParseStage> = Vec::with_capacity(4);
    if toggles.domain_dom && toggles.prefer_domain_dom {
        stages.push(&DomainDomStage);
    }
    if toggles.jsonld {
        stages.push(&JsonLdStage);
    }
    if toggles.domain_dom && !toggles.prefer_domain_dom {
        stages.push(&DomainDomStage);
    }
    if toggles.microdata {
        stages.push(&MicrodataStage);
    }
    if toggles.dom_fallback {
        stages.push(&DomFallbackStage);
    }
    stages
}

fn run_cascade(ctx: &ParseContext<'_>) -> Option<ParsedRecipe> {
    cascade(StageToggles::from_settings(ctx.settings))
        .into_iter()
        .find_map(|stage| {
            let parsed = stage.attempt(ctx);
            if parsed.is_none() {
                debug!("{} stage found nothing on {}", stage.name(), ctx.page.url());
            }
            parsed
        })
}

fn score(mut recipe: ParsedRecipe, ctx: &ParseContext<'_>) -> ParsedRecipe {
    recipe.extraction_confidence = compute_confidence(&recipe, ctx.profile.is_some(), ctx.settings);
    recipe
}

/// First candidate the cascade produces, scored.
pub fn parse_page(page: &Page, settings: &SettingsMap) -> Option<ParsedRecipe> {
    let ctx = ParseContext::new(page, settings);
    run_cascade(&ctx).map(|recipe| score(recipe, &ctx))
}

/// Parse raw HTML fetched from `url`.
pub fn parse_recipe(html: &str, url: &str, settings: &SettingsMap) -> Option<ParsedRecipe> {
    parse_page(&Page::parse(html, url), settings)
}

/// Re-run the cascade under recovery settings for `class`.
///
/// `None` when the class has no recovery or the patched cascade still
/// finds nothing. Results are marked recovered and scored under the
/// recovery settings.
pub fn parse_with_recovery(
    page: &Page,
    class: FailureClass,
    settings: &SettingsMap,
) -> Option<ParsedRecipe> {
    let plan = build_recovery_settings(class, page.url(), settings);
    if plan.actions.is_empty() {
        return None;
    }
    let ctx = ParseContext::new(page, &plan.settings);
    let mut recipe = run_cascade(&ctx)?;
    recipe.recovered = true;
    recipe.fallback_class.get_or_insert(class);
    debug!(
        "Recovered {} on {} via {:?}",
        class,
        page.url(),
        plan.actions
    );
    Some(score(recipe, &ctx))
}

/// Why a page produced no acceptable candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParseFailure {
    pub class: FailureClass,
    /// Score of the rejected candidate, for low-confidence failures.
    pub confidence: Option<f64>,
}

impl ParseFailure {
    pub fn strategy(&self) -> ParseStrategy {
        ParseStrategy::ParseFailed {
            class: self.class,
            bucket: self.confidence.map(ConfidenceBucket::from_score),
        }
    }

    /// `class`, or `class:score` for low-confidence failures.
    pub fn detail(&self) -> String {
        match self.confidence {
            Some(score) => format!("{}:{}", self.class, score),
            None => self.class.to_string(),
        }
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unable to parse recipe ({})", self.detail())
    }
}

/// Full extraction: cascade, failure recovery, then the confidence gate.
///
/// A candidate below `min_extraction_confidence` (unless
/// `allow_low_confidence`) gets one `low-confidence-parse` recovery, which
/// must reach the original threshold to be accepted.
pub fn extract_recipe(page: &Page, settings: &SettingsMap) -> Result<ParsedRecipe, ParseFailure> {
    let parsed = match parse_page(page, settings) {
        Some(recipe) => recipe,
        None => {
            let class = classify_parse_failure(&ParseContext::new(page, settings));
            parse_with_recovery(page, class, settings).ok_or(ParseFailure {
                class,
                confidence: None,
            })?
        }
    };

    let min_confidence =
        float_setting(settings, "min_extraction_confidence", DEFAULT_MIN_CONFIDENCE);
    let allow_low = bool_setting(settings, "allow_low_confidence", false);
    if parsed.extraction_confidence >= min_confidence || allow_low {
        return Ok(parsed);
    }
    match parse_with_recovery(page, FailureClass::LowConfidenceParse, settings) {
        Some(recovered) if recovered.extraction_confidence >= min_confidence => Ok(recovered),
        _ => Err(ParseFailure {
            class: FailureClass::LowConfidenceParse,
            confidence: Some(parsed.extraction_confidence),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParserKind;
    use serde_json::json;

    const JSONLD_PAGE: &str = r#"<html><head>
        <meta name="author" content="House Bar">
        <meta property="article:tag" content="stirred">
        <script type="application/ld+json">{
            "@context": "https://schema.org",
            "@type": "Recipe",
            "name": "Manhattan",
            "description": "A classic.",
            "recipeIngredient": ["2 oz rye", "1 oz sweet vermouth", "2 dashes bitters"],
            "recipeInstructions": [
                {"@type": "HowToStep", "text": "Stir with ice."},
                {"@type": "HowToStep", "text": "Strain."}
            ],
            "aggregateRating": {"ratingValue": "4.6", "ratingCount": "212"},
            "recipeCategory": "Cocktail"
        }</script></head><body><h1>Manhattan</h1></body></html>"#;

    const SOUR: &str = r#"<html><body>
        <h1>Recovery Sour</h1>
        <div class="ingredients"><ul>
            <li>2 oz gin</li><li>1 oz lemon juice</li><li>0.75 oz simple syrup</li>
        </ul></div>
        <div class="directions"><ol>
            <li>Shake with ice.</li><li>Strain into chilled glass.</li>
        </ol></div>
    </body></html>"#;

    fn settings(value: serde_json::Value) -> SettingsMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_jsonld_candidate() {
        let url = "https://example.org/recipes/manhattan";
        let recipe = parse_recipe(JSONLD_PAGE, url, &SettingsMap::new()).unwrap();
        assert_eq!(recipe.parser, ParserKind::JsonLd);
        assert_eq!(recipe.author.as_deref(), Some("House Bar"));
        assert_eq!(recipe.signals.rating_count, Some(212));
        assert_eq!(recipe.tags, vec!["Cocktail", "stirred"]);
        // 0.504 + 0.1 + 0.064 + 0.04
        assert_eq!(recipe.extraction_confidence, 0.708);
        assert_eq!(recipe.strategy().to_string(), "jsonld@medium");
    }

    #[test]
    fn test_cascade_order() {
        let names = |s: SettingsMap| -> Vec<&str> {
            cascade(StageToggles::from_settings(&s))
                .iter()
                .map(|stage| stage.name())
                .collect()
        };
        assert_eq!(
            names(SettingsMap::new()),
            vec!["jsonld", "domain_dom", "microdata", "dom_fallback"]
        );
        assert_eq!(
            names(settings(json!({"prefer_domain_dom": true, "enable_microdata": false}))),
            vec!["domain_dom", "jsonld", "dom_fallback"]
        );
    }

    #[test]
    fn test_parse_is_idempotent() {
        let url = "https://punchdrink.com/recipes/recovery-sour/";
        let a = parse_recipe(SOUR, url, &SettingsMap::new());
        let b = parse_recipe(SOUR, url, &SettingsMap::new());
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn test_recovery_from_selector_mismatch() {
        let url = "https://www.allrecipes.com/recipe/123/recovery-sour";
        let disabled = settings(json!({
            "enable_jsonld": false,
            "enable_domain_dom": false,
            "enable_microdata": false,
            "enable_dom_fallback": false,
        }));
        let page = Page::parse(SOUR, url);
        assert!(parse_page(&page, &disabled).is_none());

        let class = classify_parse_failure(&ParseContext::new(&page, &disabled));
        assert_eq!(class, FailureClass::DomainSelectorMismatch);
        let recovered = parse_with_recovery(&page, class, &disabled).unwrap();
        assert!(recovered.recovered);
        assert!(recovered.ingredients.len() >= 2);
        assert!(recovered
            .strategy()
            .to_string()
            .starts_with("recovery:domain-selector-mismatch:domain_dom@"));
    }

    #[test]
    fn test_low_confidence_is_a_failure() {
        let page = Page::parse(SOUR, "https://example.com/recipes/fallback-cocktail");
        let strict = settings(json!({
            "enable_jsonld": false,
            "enable_domain_dom": false,
            "enable_microdata": false,
            "min_extraction_confidence": 0.95,
        }));
        let failure = extract_recipe(&page, &strict).unwrap_err();
        assert_eq!(failure.class, FailureClass::LowConfidenceParse);
        assert!(failure.strategy().to_string().starts_with("parse_failed:low-confidence-parse@"));
        assert!(failure.to_string().starts_with("Unable to parse recipe (low-confidence-parse:0."));

        let mut lenient = strict.clone();
        lenient.insert("allow_low_confidence".into(), true.into());
        assert!(extract_recipe(&page, &lenient).is_ok());
    }

    #[test]
    fn test_unparseable_page_reports_class() {
        let html = "<html><body><p>Our privacy policy</p></body></html>";
        let page = Page::parse(html, "https://example.com/privacy");
        let failure = extract_recipe(&page, &SettingsMap::new()).unwrap_err();
        assert_eq!(failure.class, FailureClass::MissingRecipeMarkers);
        assert_eq!(failure.to_string(), "Unable to parse recipe (missing-recipe-markers)");
        assert_eq!(failure.strategy().to_string(), "parse_failed:missing-recipe-markers");
    }
}
