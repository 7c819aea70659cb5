//! Last-resort extraction from common class/id naming patterns.

use crate::models::{Ingredient, ParsedRecipe, ParserKind};

use super::classify::classify_dom_fallback;
use super::ingredient::parse_ingredient_line;
use super::page::element_text;
use super::settings::{keyword_setting, INGREDIENT_HEADING_KEYWORDS, INSTRUCTION_HEADING_KEYWORDS};
use super::signals::signals_from_dom;
use super::{ParseContext, ParseStage};

const INGREDIENT_ROWS: &str =
    ".ingredients li, [class*='ingredient'] li, [id*='ingredient'] li, .recipe-ingredients li";
const INSTRUCTION_ROWS: &str =
    ".instructions li, [class*='instruction'] li, [id*='instruction'] li, .method li, .directions li";

pub struct DomFallbackStage;

impl ParseStage for DomFallbackStage {
    fn name(&self) -> &'static str {
        "dom_fallback"
    }

    fn attempt(&self, ctx: &ParseContext<'_>) -> Option<ParsedRecipe> {
        let page = ctx.page;
        let canonical_name = page.heading_or_og_title()?;

        let mut ingredients: Vec<Ingredient> = page
            .select(INGREDIENT_ROWS)
            .into_iter()
            .map(element_text)
            .filter(|text| !text.is_empty())
            .map(|text| parse_ingredient_line(&text))
            .collect();
        if ingredients.is_empty() {
            let keywords = keyword_setting(
                ctx.settings,
                "ingredient_heading_keywords",
                INGREDIENT_HEADING_KEYWORDS,
            );
            ingredients = page
                .section_list_items(&keywords)
                .iter()
                .map(|text| parse_ingredient_line(text))
                .collect();
        }

        let mut instructions: Vec<String> = page
            .select(INSTRUCTION_ROWS)
            .into_iter()
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect();
        if instructions.is_empty() {
            let keywords = keyword_setting(
                ctx.settings,
                "instruction_heading_keywords",
                INSTRUCTION_HEADING_KEYWORDS,
            );
            instructions = page.section_list_items(&keywords);
        }

        if ingredients.len() < 2 || instructions.is_empty() {
            return None;
        }

        Some(ParsedRecipe {
            canonical_name,
            description: page.meta_property("og:description"),
            ingredients,
            instructions,
            author: None,
            signals: signals_from_dom(page, ctx.profile.as_ref()),
            source_url: page.url().to_string(),
            tags: page.tags(),
            parser: ParserKind::DomFallback,
            recovered: false,
            fallback_class: Some(classify_dom_fallback(ctx)),
            extraction_confidence: 0.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureClass, SettingsMap};
    use crate::parser::page::Page;

    #[test]
    fn test_fallback_from_class_names() {
        let html = r#"<html><head><meta property="og:description" content="Bright and sour."></head>
            <body><h1>Whiskey Sour</h1>
            <ul class="recipe-ingredients"><li>2 oz bourbon</li><li>0.75 oz lemon</li><li>0.5 oz syrup</li></ul>
            <ol class="directions"><li>Shake hard.</li><li>Strain over ice.</li></ol>
        </body></html>"#;
        let page = Page::parse(html, "https://example.org/recipes/whiskey-sour");
        let settings = SettingsMap::new();
        let recipe = DomFallbackStage
            .attempt(&ParseContext::new(&page, &settings))
            .unwrap();
        assert_eq!(recipe.ingredients.len(), 3);
        assert_eq!(recipe.instructions, vec!["Shake hard.", "Strain over ice."]);
        assert_eq!(recipe.description.as_deref(), Some("Bright and sour."));
        assert_eq!(recipe.fallback_class, Some(FailureClass::GenericDomPattern));
    }

    #[test]
    fn test_fallback_from_headings() {
        let html = r#"<html><body><h1>Daiquiri</h1>
            <section><h2>What you'll need</h2><ul><li>2 oz rum</li><li>1 oz lime juice</li></ul></section>
            <section><h3>Steps</h3><p>Shake with ice and strain.</p></section>
        </body></html>"#;
        let page = Page::parse(html, "https://example.org/recipes/daiquiri");
        let settings = SettingsMap::new();
        let recipe = DomFallbackStage
            .attempt(&ParseContext::new(&page, &settings))
            .unwrap();
        assert_eq!(recipe.ingredients[0].name, "rum");
        assert_eq!(recipe.instructions, vec!["Shake with ice and strain."]);
    }

    #[test]
    fn test_fallback_needs_two_ingredients() {
        let html = concat!(
            r#"<h1>X</h1><ul class="ingredients"><li>gin</li></ul>"#,
            r#"<ul class="method"><li>Stir.</li></ul>"#,
        );
        let page = Page::parse(html, "https://example.org/recipes/x");
        let settings = SettingsMap::new();
        assert!(DomFallbackStage
            .attempt(&ParseContext::new(&page, &settings))
            .is_none());
    }
}
