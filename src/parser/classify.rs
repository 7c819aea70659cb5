//! Failure classification for pages the primary stages could not handle.

use crate::models::FailureClass;

use super::jsonld::{find_recipe, find_recipe_like};
use super::page::Page;
use super::settings::{keyword_setting, INSTRUCTION_HEADING_KEYWORDS};
use super::ParseContext;

/// Text markers whose total absence means the page is not a recipe.
const RECIPE_TEXT_MARKERS: &[&str] = &["ingredients", "instructions", "directions", "method"];

/// Pages with less text than this are treated as stubs.
const MIN_PAGE_TEXT: usize = 80;

/// Profile selector diagnosis shared by both classifiers.
fn profile_mismatch(ctx: &ParseContext<'_>) -> Option<FailureClass> {
    let profile = ctx.profile.as_ref()?;
    let ingredient_hits = ctx.page.match_count(&profile.ingredient_selectors);
    let instruction_hits = ctx.page.match_count(&profile.instruction_selectors);
    if ingredient_hits == 0 && instruction_hits == 0 {
        return Some(FailureClass::DomainSelectorMismatch);
    }
    if ingredient_hits < 2 {
        return Some(FailureClass::DomainIngredientsSparse);
    }
    if instruction_hits < 1 {
        let keywords = keyword_setting(
            ctx.settings,
            "instruction_heading_keywords",
            INSTRUCTION_HEADING_KEYWORDS,
        );
        if ctx.page.section_list_items(&keywords).is_empty() {
            return Some(FailureClass::InstructionStructureMismatch);
        }
        return Some(FailureClass::DomainInstructionsSparse);
    }
    None
}

pub fn has_recipe_jsonld(page: &Page) -> bool {
    let items = page.jsonld();
    find_recipe(items).is_some() || find_recipe_like(items).is_some()
}

pub fn has_recipe_microdata(page: &Page) -> bool {
    page.select_first(r#"[itemprop="recipeIngredient"]"#).is_some()
        || page.select_first(r#"[itemprop="recipeInstructions"]"#).is_some()
}

/// Why the structured stages missed a page that the generic DOM fallback
/// did parse.
pub fn classify_dom_fallback(ctx: &ParseContext<'_>) -> FailureClass {
    if let Some(class) = profile_mismatch(ctx) {
        return class;
    }
    if has_recipe_jsonld(ctx.page) {
        return FailureClass::JsonldIncomplete;
    }
    if has_recipe_microdata(ctx.page) {
        return FailureClass::MicrodataIncomplete;
    }
    FailureClass::GenericDomPattern
}

/// Why no stage produced a candidate.
pub fn classify_parse_failure(ctx: &ParseContext<'_>) -> FailureClass {
    if let Some(class) = profile_mismatch(ctx) {
        return class;
    }
    if has_recipe_jsonld(ctx.page) {
        return FailureClass::JsonldParseFailed;
    }
    if has_recipe_microdata(ctx.page) {
        return FailureClass::MicrodataParseFailed;
    }
    let text = ctx.page.lower_text();
    if text.is_empty() {
        return FailureClass::EmptyDocument;
    }
    if !RECIPE_TEXT_MARKERS.iter().any(|marker| text.contains(marker)) {
        return FailureClass::MissingRecipeMarkers;
    }
    if text.chars().count() < MIN_PAGE_TEXT {
        return FailureClass::InsufficientPageContent;
    }
    FailureClass::UnknownParseFailure
}
