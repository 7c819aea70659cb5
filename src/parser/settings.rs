//! Typed reads over a policy's free-form `parser_settings` map.

use serde_json::Value;

use crate::models::SettingsMap;

/// Default heading labels that introduce an ingredient list.
pub const INGREDIENT_HEADING_KEYWORDS: &[&str] =
    &["ingredients", "for the cocktail", "what you'll need"];

/// Default heading labels that introduce a method.
pub const INSTRUCTION_HEADING_KEYWORDS: &[&str] =
    &["directions", "method", "instructions", "preparation", "steps"];

/// Only real JSON booleans count; anything else yields `default`.
pub fn bool_setting(settings: &SettingsMap, key: &str, default: bool) -> bool {
    match settings.get(key) {
        Some(Value::Bool(b)) => *b,
        _ => default,
    }
}

/// Numbers, numeric strings and booleans are accepted.
pub fn float_setting(settings: &SettingsMap, key: &str, default: f64) -> f64 {
    match settings.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => default,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Trimmed, non-empty entries of a list-valued setting. `None` when the key
/// is missing or not a list.
pub fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    let Value::Array(items) = value? else {
        return None;
    };
    Some(
        items
            .iter()
            .map(|item| value_to_string(item).trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
    )
}

/// A non-empty list override replaces the defaults wholesale.
pub fn list_override(defaults: &[&str], value: Option<&Value>) -> Vec<String> {
    match string_list(value) {
        Some(list) if !list.is_empty() => list,
        _ => defaults.iter().map(|s| s.to_string()).collect(),
    }
}

/// Like [`list_override`] but lowercased, for keyword matching.
pub fn keyword_setting(settings: &SettingsMap, key: &str, defaults: &[&str]) -> Vec<String> {
    list_override(defaults, settings.get(key))
        .into_iter()
        .map(|s| s.to_lowercase())
        .collect()
}

/// Drop blanks and repeats, keeping first occurrences.
pub fn dedupe_preserve_order<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for value in values {
        let cleaned = value.as_ref().trim();
        if cleaned.is_empty() || !seen.insert(cleaned.to_string()) {
            continue;
        }
        out.push(cleaned.to_string());
    }
    out
}

/// Current list value for `key` followed by `extras`, deduplicated.
pub fn merged_list(settings: &SettingsMap, key: &str, extras: &[&str]) -> Vec<String> {
    let current = string_list(settings.get(key)).unwrap_or_default();
    dedupe_preserve_order(current.iter().map(String::as_str).chain(extras.iter().copied()))
}

/// Which cascade stages may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageToggles {
    pub jsonld: bool,
    pub domain_dom: bool,
    pub microdata: bool,
    pub dom_fallback: bool,
    pub prefer_domain_dom: bool,
}

impl StageToggles {
    pub fn from_settings(settings: &SettingsMap) -> Self {
        Self {
            jsonld: bool_setting(settings, "enable_jsonld", true),
            domain_dom: bool_setting(settings, "enable_domain_dom", true),
            microdata: bool_setting(settings, "enable_microdata", true),
            dom_fallback: bool_setting(settings, "enable_dom_fallback", true),
            prefer_domain_dom: bool_setting(settings, "prefer_domain_dom", false),
        }
    }
}
