//! Extraction confidence scoring.

use crate::models::{FailureClass, ParsedRecipe, ParserKind, SettingsMap};

use super::settings::{bool_setting, float_setting};

/// Subtracted from every recovery-patched result.
pub const RECOVERY_PENALTY: f64 = 0.06;

/// Penalty for an unrecovered DOM fallback, by the reason the structured
/// stages missed.
fn fallback_penalty(class: Option<FailureClass>) -> f64 {
    match class.unwrap_or(FailureClass::GenericDomPattern) {
        FailureClass::DomainSelectorMismatch => 0.18,
        FailureClass::DomainIngredientsSparse => 0.14,
        FailureClass::DomainInstructionsSparse => 0.14,
        FailureClass::InstructionStructureMismatch => 0.16,
        FailureClass::JsonldIncomplete => 0.08,
        FailureClass::MicrodataIncomplete => 0.08,
        FailureClass::GenericDomPattern => 0.05,
        _ => 0.1,
    }
}

/// Confidence in [0, 1], rounded to three decimals.
///
/// Weighted sum of the stage's base, ingredient coverage (six rows = full),
/// step coverage (five steps = full) and engagement signals, plus a bonus
/// when a domain profile applied. Unrecovered DOM fallbacks, missing
/// engagement and recovery each subtract a penalty. `confidence_bias` in
/// settings shifts the result.
pub fn compute_confidence(recipe: &ParsedRecipe, has_profile: bool, settings: &SettingsMap) -> f64 {
    let parser_base = recipe.parser.base_confidence();
    let ingredient_score = (recipe.ingredients.len() as f64 / 6.0).clamp(0.0, 1.0);
    let instruction_score = (recipe.instructions.len() as f64 / 5.0).clamp(0.0, 1.0);
    let rating_signal = if recipe.signals.has_rating_signal() { 1.0 } else { 0.0 };
    let social_signal = if recipe.signals.has_social_signal() { 1.0 } else { 0.0 };
    let profile_bonus = if has_profile { 0.05 } else { 0.0 };

    let engagement_penalty = if bool_setting(settings, "penalize_missing_engagement_signals", true)
        && rating_signal == 0.0
        && social_signal == 0.0
    {
        0.04
    } else {
        0.0
    };
    let fallback = if recipe.parser == ParserKind::DomFallback && !recipe.recovered {
        fallback_penalty(recipe.fallback_class)
    } else {
        0.0
    };
    let recovery = if recipe.recovered { RECOVERY_PENALTY } else { 0.0 };

    let raw = parser_base * 0.56
        + ingredient_score * 0.2
        + instruction_score * 0.16
        + rating_signal * 0.04
        + social_signal * 0.04
        + profile_bonus
        - fallback
        - engagement_penalty
        - recovery
        + float_setting(settings, "confidence_bias", 0.0);
    (raw.clamp(0.0, 1.0) * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ingredient, Signals};

    fn recipe(parser: ParserKind, ingredients: usize, steps: usize) -> ParsedRecipe {
        ParsedRecipe {
            canonical_name: "Martini".to_string(),
            description: None,
            ingredients: (0..ingredients)
                .map(|i| Ingredient {
                    name: format!("item {}", i),
                    quantity: 1.0,
                    unit: "oz".to_string(),
                })
                .collect(),
            instructions: (0..steps).map(|i| format!("step {}", i)).collect(),
            author: None,
            signals: Signals::default(),
            source_url: String::new(),
            tags: vec![],
            parser,
            recovered: false,
            fallback_class: None,
            extraction_confidence: 0.0,
        }
    }

    #[test]
    fn test_full_jsonld_with_profile() {
        let mut r = recipe(ParserKind::JsonLd, 6, 5);
        r.signals.rating_value = Some(4.5);
        r.signals.rating_count = Some(100);
        // 0.504 + 0.2 + 0.16 + 0.04 + 0.05
        assert_eq!(compute_confidence(&r, true, &SettingsMap::new()), 0.954);
    }

    #[test]
    fn test_sparse_fallback_is_low() {
        let mut r = recipe(ParserKind::DomFallback, 2, 1);
        r.fallback_class = Some(FailureClass::DomainSelectorMismatch);
        // 0.3472 + 0.0667 + 0.032 + 0.05 - 0.18 - 0.04
        let score = compute_confidence(&r, true, &SettingsMap::new());
        assert_eq!(score, 0.276);
    }

    #[test]
    fn test_recovered_fallback_skips_fallback_penalty() {
        let mut r = recipe(ParserKind::DomFallback, 6, 5);
        r.fallback_class = Some(FailureClass::DomainSelectorMismatch);
        r.recovered = true;
        // 0.3472 + 0.2 + 0.16 - 0.04 - 0.06
        assert_eq!(compute_confidence(&r, false, &SettingsMap::new()), 0.607);
    }

    #[test]
    fn test_bias_and_engagement_toggle() {
        let r = recipe(ParserKind::Microdata, 3, 2);
        let mut settings = SettingsMap::new();
        let base = compute_confidence(&r, false, &settings);
        settings.insert("penalize_missing_engagement_signals".into(), false.into());
        settings.insert("confidence_bias".into(), 0.1.into());
        let adjusted = compute_confidence(&r, false, &settings);
        assert!((adjusted - base - 0.14).abs() < 0.0015);
    }

    #[test]
    fn test_clamped() {
        let r = recipe(ParserKind::JsonLd, 10, 10);
        let mut settings = SettingsMap::new();
        settings.insert("confidence_bias".into(), 5.0.into());
        assert_eq!(compute_confidence(&r, true, &settings), 1.0);
    }
}
