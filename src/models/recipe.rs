//! Extracted recipe candidate.

use serde::{Deserialize, Serialize};

use super::strategy::{ConfidenceBucket, FailureClass, ParseStrategy, ParserKind};

/// One ingredient row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

/// Engagement signals found on the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    pub rating_value: Option<f64>,
    pub rating_count: Option<i64>,
    pub like_count: Option<i64>,
    pub share_count: Option<i64>,
}

impl Signals {
    /// Rating of at least 4 stars backed by at least 10 ratings.
    pub fn has_rating_signal(&self) -> bool {
        self.rating_value.unwrap_or(0.0) >= 4.0 && self.rating_count.unwrap_or(0) >= 10
    }

    pub fn has_social_signal(&self) -> bool {
        self.like_count.unwrap_or(0) > 0 || self.share_count.unwrap_or(0) > 0
    }

    /// Keep values already present, fill the rest from `other`.
    pub fn or(self, other: Signals) -> Signals {
        Signals {
            rating_value: self.rating_value.filter(|v| *v != 0.0).or(other.rating_value),
            rating_count: self.rating_count.filter(|v| *v != 0).or(other.rating_count),
            like_count: self.like_count.filter(|v| *v != 0).or(other.like_count),
            share_count: self.share_count.filter(|v| *v != 0).or(other.share_count),
        }
    }
}

/// Structured candidate produced by the parser cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedRecipe {
    pub canonical_name: String,
    pub description: Option<String>,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<String>,
    pub author: Option<String>,
    #[serde(flatten)]
    pub signals: Signals,
    pub source_url: String,
    pub tags: Vec<String>,
    pub parser: ParserKind,
    /// Set when the candidate came from a recovery-patched cascade run.
    #[serde(default)]
    pub recovered: bool,
    pub fallback_class: Option<FailureClass>,
    pub extraction_confidence: f64,
}

impl ParsedRecipe {
    pub fn confidence_bucket(&self) -> ConfidenceBucket {
        ConfidenceBucket::from_score(self.extraction_confidence)
    }

    /// Storage tag describing which stage produced this candidate.
    pub fn strategy(&self) -> ParseStrategy {
        let bucket = self.confidence_bucket();
        match (self.parser, self.recovered) {
            (ParserKind::DomFallback, recovered) => ParseStrategy::DomFallback {
                class: self.fallback_class.unwrap_or(FailureClass::Unclassified),
                bucket,
                recovered,
            },
            (base, true) => ParseStrategy::Recovery {
                class: self.fallback_class.unwrap_or(FailureClass::UnknownParseFailure),
                base,
                bucket,
            },
            (parser, false) => ParseStrategy::Parsed { parser, bucket },
        }
    }

    /// Plain-text rendering stored with queued jobs.
    pub fn render_raw_text(&self) -> String {
        let mut lines = vec!["Ingredients".to_string()];
        for ingredient in &self.ingredients {
            lines.push(
                format!(
                    "- {} {} {}",
                    ingredient.quantity, ingredient.unit, ingredient.name
                )
                .trim()
                .to_string(),
            );
        }
        lines.push("Instructions".to_string());
        for step in self.instructions.iter().filter(|s| !s.is_empty()) {
            lines.push(format!("- {}", step));
        }
        lines.join("\n")
    }
}
