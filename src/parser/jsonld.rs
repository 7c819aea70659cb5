//! schema.org JSON-LD recipe extraction.

use serde_json::{Map, Value};

use crate::models::{ParsedRecipe, ParserKind, Signals};

use super::ingredient::parse_ingredient_line;
use super::signals::{aggregate_rating, interaction_counts, signals_from_dom};
use super::{ParseContext, ParseStage};

type JsonObject = Map<String, Value>;

/// First object whose `@type` is (or lists) `Recipe`.
pub fn find_recipe(items: &[JsonObject]) -> Option<&JsonObject> {
    items.iter().find(|item| match item.get("@type") {
        Some(Value::String(t)) => t.eq_ignore_ascii_case("recipe"),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| t.eq_ignore_ascii_case("recipe")),
        _ => false,
    })
}

/// First untyped object that still carries usable recipe fields: two or
/// more ingredients and at least one instruction.
pub fn find_recipe_like(items: &[JsonObject]) -> Option<&JsonObject> {
    items.iter().find(|item| {
        let Some(Value::Array(ingredients)) = item.get("recipeIngredient") else {
            return false;
        };
        ingredients.len() >= 2 && !normalize_instructions(item.get("recipeInstructions")).is_empty()
    })
}

/// Flatten the shapes `recipeInstructions` comes in: plain text (one step
/// per line), `HowToStep` objects, nested lists and `HowToSection` item
/// lists.
pub fn normalize_instructions(value: Option<&Value>) -> Vec<String> {
    let mut steps = Vec::new();
    if let Some(value) = value {
        collect_instructions(value, &mut steps);
    }
    steps.retain(|step| !step.is_empty());
    steps
}

fn collect_instructions(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(text) => out.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        ),
        Value::Array(entries) => {
            for entry in entries {
                match entry {
                    Value::String(text) => out.push(text.trim().to_string()),
                    Value::Object(obj) => push_step_text(obj, out),
                    Value::Array(_) => collect_instructions(entry, out),
                    _ => {}
                }
            }
        }
        Value::Object(obj) => match obj.get("itemListElement") {
            Some(items) => collect_instructions(items, out),
            None => push_step_text(obj, out),
        },
        _ => {}
    }
}

fn push_step_text(obj: &JsonObject, out: &mut Vec<String>) {
    if let Some(text) = non_empty(obj.get("text")).or_else(|| non_empty(obj.get("name"))) {
        out.push(text.trim().to_string());
    }
}

/// Truthy scalar rendered as a string.
fn non_empty(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn ingredient_lines(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(entries)) = value else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(line) => Some(line.clone()),
            Value::Object(obj) => non_empty(obj.get("name"))
                .or_else(|| non_empty(obj.get("text")))
                .or_else(|| non_empty(obj.get("ingredient"))),
            _ => None,
        })
        .collect()
}

fn author_name(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Object(obj) => non_empty(obj.get("name")),
        Value::Array(entries) => entries
            .iter()
            .filter_map(Value::as_object)
            .find_map(|obj| non_empty(obj.get("name"))),
        _ => None,
    }
}

fn tag_values(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(entries)) => entries
            .iter()
            .map(|entry| match entry {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Null) | Some(Value::Bool(false)) | None => Vec::new(),
        Some(other) => vec![other.to_string()],
    }
}

/// Reads the page's `Recipe` object, or a recipe-shaped object without a
/// type. Missing engagement values are filled from the DOM.
pub struct JsonLdStage;

impl ParseStage for JsonLdStage {
    fn name(&self) -> &'static str {
        "jsonld"
    }

    fn attempt(&self, ctx: &ParseContext<'_>) -> Option<ParsedRecipe> {
        let items = ctx.page.jsonld();
        let (recipe, parser) = match find_recipe(items) {
            Some(recipe) => (recipe, ParserKind::JsonLd),
            None => (find_recipe_like(items)?, ParserKind::JsonLdRecipeFields),
        };

        let canonical_name = non_empty(recipe.get("name"))?;
        let ingredients: Vec<_> = ingredient_lines(recipe.get("recipeIngredient"))
            .iter()
            .map(|line| parse_ingredient_line(line))
            .collect();
        let instructions = normalize_instructions(recipe.get("recipeInstructions"));
        if ingredients.is_empty() || instructions.is_empty() {
            return None;
        }

        let author = author_name(recipe.get("author")).or_else(|| ctx.page.meta_name("author"));
        let (rating_value, rating_count) = aggregate_rating(recipe.get("aggregateRating"));
        let (like_count, share_count) = interaction_counts(recipe.get("interactionStatistic"));
        let signals = Signals {
            rating_value,
            rating_count,
            like_count,
            share_count,
        }
        .or(signals_from_dom(ctx.page, ctx.profile.as_ref()));

        let mut tags = tag_values(recipe.get("recipeCategory"));
        tags.extend(tag_values(recipe.get("recipeCuisine")));
        tags.extend(ctx.page.tags());
        tags.retain(|tag| !tag.is_empty());

        Some(ParsedRecipe {
            canonical_name,
            description: recipe
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            ingredients,
            instructions,
            author,
            signals,
            source_url: ctx.page.url().to_string(),
            tags,
            parser,
            recovered: false,
            fallback_class: None,
            extraction_confidence: 0.0,
        })
    }
}
