//! schema.org microdata (`itemprop`) extraction.

use crate::models::{ParsedRecipe, ParserKind};

use super::ingredient::parse_ingredient_line;
use super::page::{element_lines, element_text, meta_value};
use super::signals::signals_from_dom;
use super::{ParseContext, ParseStage};

pub struct MicrodataStage;

impl ParseStage for MicrodataStage {
    fn name(&self) -> &'static str {
        "microdata"
    }

    fn attempt(&self, ctx: &ParseContext<'_>) -> Option<ParsedRecipe> {
        let page = ctx.page;
        let canonical_name = page
            .h1()
            .or_else(|| {
                page.select(r#"[itemprop="name"]"#)
                    .into_iter()
                    .find_map(meta_value)
            })
            .or_else(|| page.meta_property("og:title"))?;

        let ingredients: Vec<_> = page
            .select(r#"[itemprop="recipeIngredient"]"#)
            .into_iter()
            .map(element_text)
            .filter(|text| !text.is_empty())
            .map(|text| parse_ingredient_line(&text))
            .collect();

        let mut instructions = Vec::new();
        for node in page.select(r#"[itemprop="recipeInstructions"]"#) {
            if node.value().name() == "li" {
                instructions.push(element_text(node));
            } else {
                instructions.extend(element_lines(node));
            }
        }
        instructions.retain(|step| !step.is_empty());

        if ingredients.is_empty() || instructions.is_empty() {
            return None;
        }

        Some(ParsedRecipe {
            canonical_name,
            description: None,
            ingredients,
            instructions,
            author: None,
            signals: signals_from_dom(page, ctx.profile.as_ref()),
            source_url: page.url().to_string(),
            tags: page.tags(),
            parser: ParserKind::Microdata,
            recovered: false,
            fallback_class: None,
            extraction_confidence: 0.0,
        })
    }
}
