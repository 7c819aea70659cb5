//! Recovery suggestions: parser settings patches for a failing domain.

use serde::{Deserialize, Serialize};

use crate::error::{HarvestError, Result};
use crate::models::{host_matches_domain, normalized_host, FailureClass, SettingsMap, SourcePolicy};
use crate::parser::{build_recovery_settings, string_list, RecoveryAction, COMPLIANCE_KEYS};

#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryRequest {
    /// Failure class, bare or as a stored strategy tag.
    pub parse_failure: String,
    #[serde(default)]
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoverySuggestion {
    pub policy_id: String,
    pub domain: String,
    pub parse_failure: String,
    pub supported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub source_url: String,
    pub actions: Vec<RecoveryAction>,
    pub changed_keys: Vec<String>,
    pub patch: SettingsMap,
    pub applied: bool,
}

impl RecoverySuggestion {
    /// Whether applying would change anything.
    pub fn is_applicable(&self) -> bool {
        self.supported && !self.actions.is_empty() && !self.patch.is_empty()
    }

    /// Policy parser settings with the patch merged in.
    pub fn merged_settings(&self, current: &SettingsMap) -> SettingsMap {
        let mut merged = current.clone();
        for (key, value) in &self.patch {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

/// Keys whose change could loosen compliance are dropped, and so is a
/// `required_text_markers` list that loses any current marker.
fn weakens_compliance(key: &str, value: &serde_json::Value, current: &SettingsMap) -> bool {
    if COMPLIANCE_KEYS.contains(&key) {
        return true;
    }
    if key == "required_text_markers" {
        let existing = string_list(current.get(key)).unwrap_or_default();
        let proposed = string_list(Some(value)).unwrap_or_default();
        return !existing.iter().all(|marker| proposed.contains(marker));
    }
    false
}

/// Build the preview for `policy`. Never mutates anything.
pub fn suggest_recovery(
    policy: &SourcePolicy,
    request: &RecoveryRequest,
) -> Result<RecoverySuggestion> {
    let source_url = request
        .source_url
        .as_deref()
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("https://{}/", policy.domain));
    if !host_matches_domain(&normalized_host(&source_url), &policy.domain) {
        return Err(HarvestError::Validation(
            "source_url hostname must match policy domain".to_string(),
        ));
    }

    let mut suggestion = RecoverySuggestion {
        policy_id: policy.id.clone(),
        domain: policy.domain.clone(),
        parse_failure: request.parse_failure.trim().to_string(),
        supported: false,
        message: None,
        source_url,
        actions: Vec::new(),
        changed_keys: Vec::new(),
        patch: SettingsMap::new(),
        applied: false,
    };

    let class = match FailureClass::normalize(&request.parse_failure) {
        Some(class) if class.is_recovery_supported() => class,
        _ => {
            suggestion.message = Some(format!(
                "Unsupported parse failure class: {}",
                request.parse_failure.trim()
            ));
            return Ok(suggestion);
        }
    };
    suggestion.parse_failure = class.as_str().to_string();
    suggestion.supported = true;

    let current = &policy.parser_settings;
    let plan = build_recovery_settings(class, &suggestion.source_url, current);
    for (key, value) in plan.settings {
        if current.get(&key) == Some(&value) || weakens_compliance(&key, &value, current) {
            continue;
        }
        suggestion.patch.insert(key, value);
    }
    suggestion.changed_keys = suggestion.patch.keys().cloned().collect();
    suggestion.changed_keys.sort();
    suggestion.actions = plan.actions;
    Ok(suggestion)
}
