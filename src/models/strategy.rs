//! Failure classes and parse strategy tags.
//!
//! Inside the engine these are enums. They are rendered to the stable
//! `parse_failed:` / `fetch_failed:` / `dom_fallback:` / `recovery:` string
//! convention only when written to storage or returned over the API.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why a parser stage (or a whole job) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureClass {
    DomainSelectorMismatch,
    DomainIngredientsSparse,
    DomainInstructionsSparse,
    InstructionStructureMismatch,
    JsonldParseFailed,
    JsonldIncomplete,
    MicrodataParseFailed,
    MicrodataIncomplete,
    GenericDomPattern,
    EmptyDocument,
    MissingRecipeMarkers,
    InsufficientPageContent,
    UnknownParseFailure,
    LowConfidenceParse,
    ComplianceRejected,
    Unclassified,
}

impl FailureClass {
    /// Classes the recovery engine knows how to patch.
    pub const RECOVERY_SUPPORTED: [FailureClass; 11] = [
        Self::DomainSelectorMismatch,
        Self::DomainIngredientsSparse,
        Self::DomainInstructionsSparse,
        Self::InstructionStructureMismatch,
        Self::JsonldParseFailed,
        Self::JsonldIncomplete,
        Self::MicrodataParseFailed,
        Self::MicrodataIncomplete,
        Self::LowConfidenceParse,
        Self::MissingRecipeMarkers,
        Self::InsufficientPageContent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DomainSelectorMismatch => "domain-selector-mismatch",
            Self::DomainIngredientsSparse => "domain-ingredients-sparse",
            Self::DomainInstructionsSparse => "domain-instructions-sparse",
            Self::InstructionStructureMismatch => "instruction-structure-mismatch",
            Self::JsonldParseFailed => "jsonld-parse-failed",
            Self::JsonldIncomplete => "jsonld-incomplete",
            Self::MicrodataParseFailed => "microdata-parse-failed",
            Self::MicrodataIncomplete => "microdata-incomplete",
            Self::GenericDomPattern => "generic-dom-pattern",
            Self::EmptyDocument => "empty-document",
            Self::MissingRecipeMarkers => "missing-recipe-markers",
            Self::InsufficientPageContent => "insufficient-page-content",
            Self::UnknownParseFailure => "unknown-parse-failure",
            Self::LowConfidenceParse => "low-confidence-parse",
            Self::ComplianceRejected => "compliance-rejected",
            Self::Unclassified => "unclassified",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "domain-selector-mismatch" => Some(Self::DomainSelectorMismatch),
            "domain-ingredients-sparse" => Some(Self::DomainIngredientsSparse),
            "domain-instructions-sparse" => Some(Self::DomainInstructionsSparse),
            "instruction-structure-mismatch" => Some(Self::InstructionStructureMismatch),
            "jsonld-parse-failed" => Some(Self::JsonldParseFailed),
            "jsonld-incomplete" => Some(Self::JsonldIncomplete),
            "microdata-parse-failed" => Some(Self::MicrodataParseFailed),
            "microdata-incomplete" => Some(Self::MicrodataIncomplete),
            "generic-dom-pattern" => Some(Self::GenericDomPattern),
            "empty-document" => Some(Self::EmptyDocument),
            "missing-recipe-markers" => Some(Self::MissingRecipeMarkers),
            "insufficient-page-content" => Some(Self::InsufficientPageContent),
            "unknown-parse-failure" => Some(Self::UnknownParseFailure),
            "low-confidence-parse" => Some(Self::LowConfidenceParse),
            "compliance-rejected" => Some(Self::ComplianceRejected),
            "unclassified" => Some(Self::Unclassified),
            _ => None,
        }
    }

    /// Normalize an operator-supplied class, accepting the storage tags
    /// (`parse_failed:x@low`, `dom_fallback:x@medium`, `recovery:x:jsonld@high`).
    pub fn normalize(raw: &str) -> Option<Self> {
        let mut value = raw.trim();
        for prefix in ["parse_failed:", "dom_fallback:", "recovery:"] {
            if let Some(rest) = value.strip_prefix(prefix) {
                value = rest;
                break;
            }
        }
        let value = value.split('@').next().unwrap_or(value);
        let value = value.split(':').next().unwrap_or(value);
        Self::from_str(value)
    }

    pub fn is_recovery_supported(&self) -> bool {
        Self::RECOVERY_SUPPORTED.contains(self)
    }

    /// Compliance rejections are not parse failures.
    pub fn is_parse_related(&self) -> bool {
        !matches!(self, Self::ComplianceRejected)
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport-level fetch failure classes. Low cardinality on purpose: they
/// key histograms and alert thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchFailure {
    Timeout,
    ConnectError,
    NetworkError,
    /// Any non-5xx HTTP error status.
    Status(u16),
    ServerError,
    HttpError,
    Unknown,
}

impl FetchFailure {
    pub fn from_status(status: u16) -> Self {
        match status {
            500..=599 => Self::ServerError,
            0 => Self::HttpError,
            other => Self::Status(other),
        }
    }

    pub fn as_string(&self) -> String {
        match self {
            Self::Timeout => "timeout".to_string(),
            Self::ConnectError => "connect-error".to_string(),
            Self::NetworkError => "network-error".to_string(),
            Self::Status(code) => format!("http-{}", code),
            Self::ServerError => "http-5xx".to_string(),
            Self::HttpError => "http-error".to_string(),
            Self::Unknown => "unknown-fetch-error".to_string(),
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "timeout" => Some(Self::Timeout),
            "connect-error" => Some(Self::ConnectError),
            "network-error" => Some(Self::NetworkError),
            "http-5xx" => Some(Self::ServerError),
            "http-error" => Some(Self::HttpError),
            "unknown-fetch-error" => Some(Self::Unknown),
            other => other
                .strip_prefix("http-")
                .and_then(|code| code.parse::<u16>().ok())
                .map(Self::from_status),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

/// Extraction stage that produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    #[serde(rename = "jsonld")]
    JsonLd,
    #[serde(rename = "jsonld_recipe_fields")]
    JsonLdRecipeFields,
    DomainDom,
    Microdata,
    DomFallback,
}

impl ParserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonLd => "jsonld",
            Self::JsonLdRecipeFields => "jsonld_recipe_fields",
            Self::DomainDom => "domain_dom",
            Self::Microdata => "microdata",
            Self::DomFallback => "dom_fallback",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "jsonld" => Some(Self::JsonLd),
            "jsonld_recipe_fields" => Some(Self::JsonLdRecipeFields),
            "domain_dom" => Some(Self::DomainDom),
            "microdata" => Some(Self::Microdata),
            "dom_fallback" => Some(Self::DomFallback),
            _ => None,
        }
    }

    /// Prior confidence for candidates produced by this stage.
    pub fn base_confidence(&self) -> f64 {
        match self {
            Self::JsonLd => 0.9,
            Self::JsonLdRecipeFields => 0.82,
            Self::DomainDom => 0.86,
            Self::Microdata => 0.79,
            Self::DomFallback => 0.62,
        }
    }
}

/// Coarse confidence classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBucket {
    High,
    Medium,
    Low,
}

impl ConfidenceBucket {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::High
        } else if score >= 0.6 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// Which stage produced (or failed to produce) a job's result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParseStrategy {
    /// `<parser>@<bucket>`: a primary stage succeeded.
    Parsed {
        parser: ParserKind,
        bucket: ConfidenceBucket,
    },
    /// `dom_fallback:<class>@<bucket>[:recovered]`
    DomFallback {
        class: FailureClass,
        bucket: ConfidenceBucket,
        recovered: bool,
    },
    /// `recovery:<class>:<base>@<bucket>`: a recovery-patched stage succeeded.
    Recovery {
        class: FailureClass,
        base: ParserKind,
        bucket: ConfidenceBucket,
    },
    /// `parse_failed:<class>[@<bucket>]`
    ParseFailed {
        class: FailureClass,
        bucket: Option<ConfidenceBucket>,
    },
    /// `fetch_failed:<class>`
    FetchFailed(FetchFailure),
    /// `manual_raw`: ingested from operator-supplied text.
    ManualRaw,
    /// Anything read back from storage that does not follow the convention.
    Other(String),
}

impl ParseStrategy {
    pub fn parse_failed(class: FailureClass) -> Self {
        Self::ParseFailed {
            class,
            bucket: None,
        }
    }

    pub fn compliance_rejected() -> Self {
        Self::parse_failed(FailureClass::ComplianceRejected)
    }

    /// True when a non-primary stage or recovery produced the result.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::DomFallback { .. } | Self::Recovery { .. })
    }

    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            Self::ParseFailed { class, .. } => Some(*class),
            _ => None,
        }
    }

    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "manual_raw" {
            return Self::ManualRaw;
        }
        if let Some(rest) = raw.strip_prefix("fetch_failed:") {
            let class = rest.split('@').next().unwrap_or(rest);
            let failure = FetchFailure::from_str(class).unwrap_or(FetchFailure::Unknown);
            return Self::FetchFailed(failure);
        }
        if let Some(rest) = raw.strip_prefix("parse_failed:") {
            let (class, bucket) = split_bucket(rest);
            return Self::ParseFailed {
                class: FailureClass::from_str(class).unwrap_or(FailureClass::UnknownParseFailure),
                bucket: bucket.and_then(ConfidenceBucket::from_str),
            };
        }
        if let Some(rest) = raw.strip_prefix("dom_fallback:") {
            let (class, tail) = split_bucket(rest);
            let tail = tail.unwrap_or("");
            let recovered = tail.ends_with(":recovered");
            let bucket = tail.trim_end_matches(":recovered");
            return Self::DomFallback {
                class: FailureClass::from_str(class).unwrap_or(FailureClass::Unclassified),
                bucket: ConfidenceBucket::from_str(bucket).unwrap_or(ConfidenceBucket::Low),
                recovered,
            };
        }
        if let Some(rest) = raw.strip_prefix("recovery:") {
            let (descriptor, bucket) = split_bucket(rest);
            let mut parts = descriptor.splitn(2, ':');
            let class = parts.next().unwrap_or("");
            let base = parts.next().unwrap_or("");
            let class = FailureClass::from_str(class);
            if let (Some(class), Some(base)) = (class, ParserKind::from_str(base)) {
                return Self::Recovery {
                    class,
                    base,
                    bucket: bucket
                        .and_then(ConfidenceBucket::from_str)
                        .unwrap_or(ConfidenceBucket::Low),
                };
            }
            return Self::Other(raw.to_string());
        }
        let (parser, bucket) = split_bucket(raw);
        match (ParserKind::from_str(parser), bucket.and_then(ConfidenceBucket::from_str)) {
            (Some(parser), Some(bucket)) => Self::Parsed { parser, bucket },
            _ => Self::Other(raw.to_string()),
        }
    }
}

fn split_bucket(value: &str) -> (&str, Option<&str>) {
    match value.split_once('@') {
        Some((head, tail)) => (head, Some(tail)),
        None => (value, None),
    }
}

impl fmt::Display for ParseStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsed { parser, bucket } => write!(f, "{}@{}", parser.as_str(), bucket.as_str()),
            Self::DomFallback {
                class,
                bucket,
                recovered,
            } => {
                write!(f, "dom_fallback:{}@{}", class, bucket.as_str())?;
                if *recovered {
                    f.write_str(":recovered")?;
                }
                Ok(())
            }
            Self::Recovery {
                class,
                base,
                bucket,
            } => write!(
                f,
                "recovery:{}:{}@{}",
                class,
                base.as_str(),
                bucket.as_str()
            ),
            Self::ParseFailed { class, bucket } => match bucket {
                Some(bucket) => write!(f, "parse_failed:{}@{}", class, bucket.as_str()),
                None => write!(f, "parse_failed:{}", class),
            },
            Self::FetchFailed(failure) => write!(f, "fetch_failed:{}", failure),
            Self::ManualRaw => f.write_str("manual_raw"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

impl From<String> for ParseStrategy {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<ParseStrategy> for String {
    fn from(value: ParseStrategy) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tags() {
        let cases = [
            "jsonld@high",
            "dom_fallback:domain-selector-mismatch@low",
            "dom_fallback:generic-dom-pattern@medium:recovered",
            "recovery:jsonld-incomplete:domain_dom@medium",
            "parse_failed:compliance-rejected",
            "parse_failed:low-confidence-parse@low",
            "fetch_failed:timeout",
            "fetch_failed:http-429",
            "fetch_failed:http-5xx",
            "manual_raw",
        ];
        for tag in cases {
            assert_eq!(ParseStrategy::parse(tag).to_string(), tag, "tag {}", tag);
        }
    }

    #[test]
    fn test_unknown_tags_are_preserved() {
        let strategy = ParseStrategy::parse("legacy-parser");
        assert_eq!(strategy, ParseStrategy::Other("legacy-parser".to_string()));
        assert_eq!(strategy.to_string(), "legacy-parser");
    }

    #[test]
    fn test_fallback_detection() {
        assert!(ParseStrategy::parse("dom_fallback:jsonld-incomplete@low").is_fallback());
        let recovered = "recovery:domain-selector-mismatch:dom_fallback@low";
        assert!(ParseStrategy::parse(recovered).is_fallback());
        assert!(!ParseStrategy::parse("domain_dom@high").is_fallback());
    }

    #[test]
    fn test_normalize_failure_class() {
        assert_eq!(
            FailureClass::normalize("parse_failed:domain-selector-mismatch@low"),
            Some(FailureClass::DomainSelectorMismatch)
        );
        assert_eq!(
            FailureClass::normalize("recovery:jsonld-incomplete:domain_dom@high"),
            Some(FailureClass::JsonldIncomplete)
        );
        assert_eq!(
            FailureClass::normalize(" low-confidence-parse "),
            Some(FailureClass::LowConfidenceParse)
        );
        assert_eq!(FailureClass::normalize("compliance:paywall"), None);
    }

    #[test]
    fn test_recovery_allow_list() {
        assert!(FailureClass::DomainSelectorMismatch.is_recovery_supported());
        assert!(FailureClass::InsufficientPageContent.is_recovery_supported());
        assert!(!FailureClass::GenericDomPattern.is_recovery_supported());
        assert!(!FailureClass::ComplianceRejected.is_recovery_supported());
        assert!(!FailureClass::UnknownParseFailure.is_recovery_supported());
    }

    #[test]
    fn test_fetch_failure_from_status() {
        assert_eq!(FetchFailure::from_status(503).to_string(), "http-5xx");
        assert_eq!(FetchFailure::from_status(404).to_string(), "http-404");
        assert_eq!(FetchFailure::from_str("http-502"), Some(FetchFailure::ServerError));
    }

    #[test]
    fn test_confidence_bucket_boundaries() {
        assert_eq!(ConfidenceBucket::from_score(0.8), ConfidenceBucket::High);
        assert_eq!(ConfidenceBucket::from_score(0.79), ConfidenceBucket::Medium);
        assert_eq!(ConfidenceBucket::from_score(0.6), ConfidenceBucket::Medium);
        assert_eq!(ConfidenceBucket::from_score(0.599), ConfidenceBucket::Low);
    }
}
