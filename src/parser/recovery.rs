//! Parser-setting patches that retry a failed page with broader rules.

use serde::Serialize;
use serde_json::{json, Value};

use crate::models::{FailureClass, SettingsMap};

use super::profile::EffectiveProfile;
use super::settings::{bool_setting, dedupe_preserve_order, float_setting, merged_list, string_list};

/// Floor for a relaxed `min_extraction_confidence`.
const MIN_RELAXED_CONFIDENCE: f64 = 0.2;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.35;

const INGREDIENT_SELECTOR_EXTRAS: &[&str] = &[
    ".ingredients li",
    ".recipe-ingredients li",
    "[class*='ingredient'] li",
    "[id*='ingredient'] li",
    "[itemprop='recipeIngredient']",
];

const INSTRUCTION_SELECTOR_EXTRAS: &[&str] = &[
    ".instructions li",
    ".recipe-instructions li",
    ".directions li",
    ".method li",
    "[class*='instruction'] li",
    "[id*='instruction'] li",
    "[itemprop='recipeInstructions'] li",
];

const INSTRUCTION_KEYWORD_EXTRAS: &[&str] = &[
    "directions",
    "method",
    "instructions",
    "preparation",
    "steps",
    "how to make",
];

const MARKER_EXTRAS: &[&str] = &["ingredients", "directions", "instructions", "method"];

/// Settings keys recovery may never write, because they gate compliance.
pub const COMPLIANCE_KEYS: &[&str] = &[
    "blocked_title_keywords",
    "blocked_path_hints",
    "respect_robots",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryAction {
    BroadenIngredientSelectors,
    BroadenInstructionSelectors,
    DisableJsonld,
    DisableMicrodata,
    RelaxConfidenceThreshold,
    WidenRequiredMarkers,
}

impl RecoveryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BroadenIngredientSelectors => "broaden-ingredient-selectors",
            Self::BroadenInstructionSelectors => "broaden-instruction-selectors",
            Self::DisableJsonld => "disable-jsonld",
            Self::DisableMicrodata => "disable-microdata",
            Self::RelaxConfidenceThreshold => "relax-confidence-threshold",
            Self::WidenRequiredMarkers => "widen-required-markers",
        }
    }
}

/// Patched settings plus what was changed. Empty `actions` means the class
/// has no recovery (or recovery is disabled) and `settings` is unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryPlan {
    pub settings: SettingsMap,
    pub actions: Vec<RecoveryAction>,
}

/// Current selector list (override, else profile default) with `extras`
/// appended.
fn broadened(
    settings: &SettingsMap,
    key: &str,
    profile_default: Option<&[String]>,
    extras: &[&str],
) -> Vec<String> {
    let current = string_list(settings.get(key))
        .filter(|list| !list.is_empty())
        .or_else(|| profile_default.map(<[String]>::to_vec))
        .unwrap_or_default();
    dedupe_preserve_order(current.iter().map(String::as_str).chain(extras.iter().copied()))
}

/// Derive recovery settings for a failure class on `url`.
///
/// `enable_recovery: false` in the policy settings turns recovery off.
/// Compliance keys are never touched and required text markers only ever
/// grow.
pub fn build_recovery_settings(
    class: FailureClass,
    url: &str,
    settings: &SettingsMap,
) -> RecoveryPlan {
    let mut patched = settings.clone();
    let mut actions = Vec::new();
    if !bool_setting(settings, "enable_recovery", true) {
        return RecoveryPlan {
            settings: patched,
            actions,
        };
    }
    let profile = EffectiveProfile::resolve(url, settings);

    use FailureClass::*;
    if matches!(class, DomainSelectorMismatch | DomainIngredientsSparse) {
        let selectors = broadened(
            settings,
            "ingredient_selectors",
            profile.as_ref().map(|p| p.ingredient_selectors.as_slice()),
            INGREDIENT_SELECTOR_EXTRAS,
        );
        patched.insert("ingredient_selectors".into(), Value::from(selectors));
        actions.push(RecoveryAction::BroadenIngredientSelectors);
    }

    if matches!(
        class,
        DomainSelectorMismatch | DomainInstructionsSparse | InstructionStructureMismatch
    ) {
        let selectors = broadened(
            settings,
            "instruction_selectors",
            profile.as_ref().map(|p| p.instruction_selectors.as_slice()),
            INSTRUCTION_SELECTOR_EXTRAS,
        );
        patched.insert("instruction_selectors".into(), Value::from(selectors));
        patched.insert(
            "instruction_heading_keywords".into(),
            Value::from(merged_list(
                settings,
                "instruction_heading_keywords",
                INSTRUCTION_KEYWORD_EXTRAS,
            )),
        );
        actions.push(RecoveryAction::BroadenInstructionSelectors);
    }

    if matches!(class, JsonldParseFailed | JsonldIncomplete) {
        patched.insert("enable_jsonld".into(), Value::Bool(false));
        actions.push(RecoveryAction::DisableJsonld);
    }

    if matches!(class, MicrodataParseFailed | MicrodataIncomplete) {
        patched.insert("enable_microdata".into(), Value::Bool(false));
        actions.push(RecoveryAction::DisableMicrodata);
    }

    if class == LowConfidenceParse {
        let current = float_setting(settings, "min_extraction_confidence", DEFAULT_MIN_CONFIDENCE);
        patched.insert(
            "min_extraction_confidence".into(),
            json!((current - 0.1).max(MIN_RELAXED_CONFIDENCE)),
        );
        patched.insert("penalize_missing_engagement_signals".into(), Value::Bool(false));
        actions.push(RecoveryAction::RelaxConfidenceThreshold);
    }

    if matches!(class, MissingRecipeMarkers | InsufficientPageContent) {
        let existing = profile
            .as_ref()
            .map(|p| p.required_text_markers.clone())
            .or_else(|| string_list(settings.get("required_text_markers")))
            .unwrap_or_default();
        let markers = dedupe_preserve_order(
            existing
                .iter()
                .map(String::as_str)
                .chain(MARKER_EXTRAS.iter().copied()),
        );
        patched.insert("required_text_markers".into(), Value::from(markers));
        actions.push(RecoveryAction::WidenRequiredMarkers);
    }

    if !actions.is_empty() {
        patched.insert("enable_domain_dom".into(), Value::Bool(true));
        patched.insert("enable_dom_fallback".into(), Value::Bool(true));
    }
    let mut seen = std::collections::HashSet::new();
    actions.retain(|action| seen.insert(*action));

    for key in COMPLIANCE_KEYS {
        match settings.get(*key) {
            Some(original) => patched.insert((*key).to_string(), original.clone()),
            None => patched.remove(*key),
        };
    }

    RecoveryPlan {
        settings: patched,
        actions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.allrecipes.com/recipe/123/recovery-sour";

    fn strings(value: &Value) -> Vec<String> {
        string_list(Some(value)).unwrap()
    }

    #[test]
    fn test_selector_mismatch_broadens_both_lists() {
        let plan =
            build_recovery_settings(FailureClass::DomainSelectorMismatch, URL, &SettingsMap::new());
        assert_eq!(
            plan.actions,
            vec![
                RecoveryAction::BroadenIngredientSelectors,
                RecoveryAction::BroadenInstructionSelectors
            ]
        );
        let ingredients = strings(&plan.settings["ingredient_selectors"]);
        assert_eq!(ingredients[0], r#"[data-testid="recipe-ingredients-item"]"#);
        assert!(ingredients.contains(&".ingredients li".to_string()));
        let keywords = strings(&plan.settings["instruction_heading_keywords"]);
        assert!(keywords.contains(&"how to make".to_string()));
        assert_eq!(plan.settings["enable_dom_fallback"], Value::Bool(true));
    }

    #[test]
    fn test_relaxes_low_confidence_threshold() {
        let settings = json!({"min_extraction_confidence": 0.42}).as_object().cloned().unwrap();
        let plan = build_recovery_settings(FailureClass::LowConfidenceParse, URL, &settings);
        assert_eq!(plan.actions, vec![RecoveryAction::RelaxConfidenceThreshold]);
        let relaxed = plan.settings["min_extraction_confidence"].as_f64().unwrap();
        assert!((relaxed - 0.32).abs() < 1e-9);
        assert_eq!(plan.settings["penalize_missing_engagement_signals"], Value::Bool(false));

        let floor = json!({"min_extraction_confidence": 0.25}).as_object().cloned().unwrap();
        let plan = build_recovery_settings(FailureClass::LowConfidenceParse, URL, &floor);
        assert_eq!(plan.settings["min_extraction_confidence"].as_f64(), Some(0.2));
    }

    #[test]
    fn test_jsonld_failure_disables_stage() {
        let plan =
            build_recovery_settings(FailureClass::JsonldIncomplete, URL, &SettingsMap::new());
        assert_eq!(plan.actions, vec![RecoveryAction::DisableJsonld]);
        assert_eq!(plan.settings["enable_jsonld"], Value::Bool(false));
        assert_eq!(plan.settings["enable_domain_dom"], Value::Bool(true));
    }

    #[test]
    fn test_markers_only_widen() {
        let plan = build_recovery_settings(
            FailureClass::MissingRecipeMarkers,
            "https://www.bbcgoodfood.com/recipes/x",
            &SettingsMap::new(),
        );
        assert_eq!(
            strings(&plan.settings["required_text_markers"]),
            vec!["ingredients", "method", "directions", "instructions"]
        );
    }

    #[test]
    fn test_unsupported_and_disabled() {
        let plan =
            build_recovery_settings(FailureClass::GenericDomPattern, URL, &SettingsMap::new());
        assert!(plan.actions.is_empty());
        assert!(plan.settings.is_empty());

        let off = json!({"enable_recovery": false}).as_object().cloned().unwrap();
        let plan = build_recovery_settings(FailureClass::DomainSelectorMismatch, URL, &off);
        assert!(plan.actions.is_empty());
        assert_eq!(plan.settings, off);
    }

    #[test]
    fn test_compliance_keys_untouched() {
        let settings = json!({"blocked_title_keywords": ["privacy"], "respect_robots": true})
            .as_object()
            .cloned()
            .unwrap();
        for class in FailureClass::RECOVERY_SUPPORTED {
            let plan = build_recovery_settings(class, URL, &settings);
            for key in COMPLIANCE_KEYS {
                assert_eq!(plan.settings.get(*key), settings.get(*key), "{} {}", class, key);
            }
        }
    }
}
