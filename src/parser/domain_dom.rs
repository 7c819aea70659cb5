//! Extraction driven by a publisher's domain profile.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;

use crate::models::{Ingredient, ParsedRecipe, ParserKind};

use super::ingredient::parse_ingredient_line;
use super::page::{element_lines, element_text, Page};
use super::settings::{keyword_setting, INGREDIENT_HEADING_KEYWORDS, INSTRUCTION_HEADING_KEYWORDS};
use super::signals::signals_from_dom;
use super::{ParseContext, ParseStage};

static DIGIT_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d").unwrap());

const NOTE_PREFIXES: &[&str] = &["tools:", "tool:", "glass:", "glassware:", "garnish:", "serves:"];
const UNIT_TOKENS: &[&str] = &[" oz", " ml", " dash", " dashes", " tsp", " tbsp", " cup", " cups"];
const FOOTER_MARKERS: &[&str] = &["recipe by", "photo by", "advertisement"];
const MAX_RTE_STEPS: usize = 6;

fn is_note(line: &str) -> bool {
    let lower = line.to_lowercase();
    NOTE_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
}

/// Text of every match of the first selector that yields anything.
fn first_selector_rows(page: &Page, selectors: &[String]) -> Vec<String> {
    for selector in selectors {
        let rows: Vec<String> = page
            .select(selector)
            .into_iter()
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect();
        if !rows.is_empty() {
            return rows;
        }
    }
    Vec::new()
}

/// Imbibe's rich-text template: one paragraph of `<br>`-separated ingredient
/// lines followed by method paragraphs, ending at an attribution in `<em>`.
///
/// Returns empty lists unless the page is on imbibemagazine.com and has an
/// ingredient-looking paragraph.
pub fn imbibe_rich_text(page: &Page) -> (Vec<Ingredient>, Vec<String>) {
    if !page.host().ends_with("imbibemagazine.com") {
        return (Vec::new(), Vec::new());
    }
    let Some(container) = page.select_first(".recipe__main-content") else {
        return (Vec::new(), Vec::new());
    };
    let (Ok(p), Ok(em)) = (Selector::parse("p"), Selector::parse("em")) else {
        return (Vec::new(), Vec::new());
    };
    let paragraphs: Vec<_> = container.select(&p).collect();

    let mut block = None;
    for (idx, paragraph) in paragraphs.iter().enumerate() {
        let lines = element_lines(*paragraph);
        if lines.len() < 2 {
            continue;
        }
        let cleaned: Vec<String> = lines.into_iter().filter(|line| !is_note(line)).collect();
        if cleaned.len() < 2 {
            continue;
        }
        let joined = cleaned.join(" ").to_lowercase();
        if !UNIT_TOKENS.iter().any(|unit| joined.contains(unit)) && !DIGIT_WORD.is_match(&joined) {
            continue;
        }
        block = Some((idx, cleaned));
        break;
    }
    let Some((idx, lines)) = block else {
        return (Vec::new(), Vec::new());
    };

    let ingredients = lines.iter().map(|line| parse_ingredient_line(line)).collect();
    let mut steps = Vec::new();
    for paragraph in &paragraphs[idx + 1..] {
        if paragraph.select(&em).next().is_some() {
            break;
        }
        let text = element_text(*paragraph);
        if text.is_empty() {
            continue;
        }
        let lower = text.to_lowercase();
        if FOOTER_MARKERS.iter().any(|marker| lower.contains(marker)) {
            break;
        }
        if is_note(&text) {
            continue;
        }
        steps.push(text);
        if steps.len() >= MAX_RTE_STEPS {
            break;
        }
    }
    (ingredients, steps)
}

/// Profile selectors first, then keyword-headed sections, then the Imbibe
/// rich-text layout. Needs two ingredients and one step.
pub struct DomainDomStage;

impl ParseStage for DomainDomStage {
    fn name(&self) -> &'static str {
        "domain_dom"
    }

    fn attempt(&self, ctx: &ParseContext<'_>) -> Option<ParsedRecipe> {
        let profile = ctx.profile.as_ref()?;
        let page = ctx.page;
        let canonical_name = page.heading_or_og_title()?;

        let ingredient_keywords = keyword_setting(
            ctx.settings,
            "ingredient_heading_keywords",
            INGREDIENT_HEADING_KEYWORDS,
        );
        let instruction_keywords = keyword_setting(
            ctx.settings,
            "instruction_heading_keywords",
            INSTRUCTION_HEADING_KEYWORDS,
        );

        let ingredient_rows = first_selector_rows(page, &profile.ingredient_selectors);
        let mut ingredients: Vec<Ingredient> = ingredient_rows
            .iter()
            .map(|line| parse_ingredient_line(line))
            .collect();
        if ingredients.is_empty() {
            ingredients = page
                .section_list_items(&ingredient_keywords)
                .iter()
                .map(|line| parse_ingredient_line(line))
                .collect();
        }
        if ingredients.is_empty() {
            ingredients = imbibe_rich_text(page).0;
        }

        let mut instructions = first_selector_rows(page, &profile.instruction_selectors);
        if instructions.is_empty() {
            instructions = page.section_list_items(&instruction_keywords);
        }
        if instructions.is_empty() {
            let (rte_ingredients, rte_steps) = imbibe_rich_text(page);
            if ingredients.is_empty() {
                if !rte_ingredients.is_empty() && !rte_steps.is_empty() {
                    ingredients = rte_ingredients;
                    instructions = rte_steps;
                }
            } else if !rte_steps.is_empty()
                && (rte_ingredients.is_empty() || ingredients == rte_ingredients)
            {
                instructions = rte_steps;
            }
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
            signals: signals_from_dom(page, Some(profile)),
            source_url: page.url().to_string(),
            tags: page.tags(),
            parser: ParserKind::DomainDom,
            recovered: false,
            fallback_class: None,
            extraction_confidence: 0.0,
        })
    }
}
