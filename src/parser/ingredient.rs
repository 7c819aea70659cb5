//! Ingredient line parsing and plain-text recipe parsing.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::Ingredient;

static INGREDIENT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<qty>[0-9]+(?:\.[0-9]+)?)\s*(?P<unit>[a-zA-Z]+)?\s+(?P<name>.+)$").unwrap()
});

/// Split `"1.5 oz gin"` into quantity, unit and name. Lines without a
/// leading quantity become one `unit` of the whole line.
pub fn parse_ingredient_line(line: &str) -> Ingredient {
    let line = line.trim();
    if let Some(caps) = INGREDIENT_LINE.captures(line) {
        let quantity = caps
            .name("qty")
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .filter(|q| *q != 0.0)
            .unwrap_or(1.0);
        let unit = caps
            .name("unit")
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_else(|| "unit".to_string());
        let name = caps.name("name").map(|m| m.as_str().trim()).unwrap_or("");
        return Ingredient {
            name: name.to_string(),
            quantity,
            unit,
        };
    }
    Ingredient {
        name: line.to_string(),
        quantity: 1.0,
        unit: "unit".to_string(),
    }
}

/// Recipe recovered from operator-supplied text.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecipe {
    pub name: String,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<String>,
}

enum Section {
    Preamble,
    Ingredients,
    Instructions,
}

fn is_ingredient_header(lower: &str) -> bool {
    lower.starts_with("ingredients")
}

fn is_instruction_header(lower: &str) -> bool {
    lower.starts_with("instructions")
        || lower.starts_with("method")
        || lower.starts_with("directions")
}

const UNIT_HINTS: &[&str] = &["oz", "ml", "tsp", "tbsp", "cup"];

/// Parse text laid out as an optional title line, an `Ingredients` section
/// and an `Instructions`/`Method` section with bullet or numbered rows.
///
/// Without section headers, lines mentioning a bar unit are taken as
/// ingredients and the remaining lines as steps.
pub fn parse_raw_text(raw: &str, canonical_name: Option<&str>) -> RawRecipe {
    let lines: Vec<&str> = raw.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let explicit_name = canonical_name.map(str::trim).filter(|n| !n.is_empty());

    let Some(first) = lines.first() else {
        return RawRecipe {
            name: explicit_name.unwrap_or_default().to_string(),
            ingredients: Vec::new(),
            instructions: Vec::new(),
        };
    };

    let first_lower = first.to_lowercase();
    let first_is_header = is_ingredient_header(&first_lower) || is_instruction_header(&first_lower);
    let name = match explicit_name {
        Some(name) => name.to_string(),
        None if !first_is_header => first.to_string(),
        None => String::new(),
    };
    let body = if explicit_name.is_none() && !first_is_header {
        &lines[1..]
    } else {
        &lines[..]
    };

    let mut ingredients = Vec::new();
    let mut instructions = Vec::new();
    let mut section = Section::Preamble;
    for line in body {
        let lower = line.to_lowercase();
        if is_ingredient_header(&lower) {
            section = Section::Ingredients;
            continue;
        }
        if is_instruction_header(&lower) {
            section = Section::Instructions;
            continue;
        }
        match section {
            Section::Ingredients => {
                ingredients.push(parse_ingredient_line(line.trim_start_matches(['-', '*', ' '])));
            }
            Section::Instructions => {
                let step = line
                    .trim_start_matches(['-', '*', ' '])
                    .trim_start_matches(|c: char| {
                        c.is_ascii_digit() || c == '.' || c == ')' || c == ' '
                    });
                if !step.is_empty() {
                    instructions.push(step.to_string());
                }
            }
            Section::Preamble => {
                if line.starts_with('-') || line.starts_with('*') {
                    let line = line.trim_start_matches(['-', '*', ' ']);
                    ingredients.push(parse_ingredient_line(line));
                }
            }
        }
    }

    if ingredients.is_empty() {
        ingredients = body
            .iter()
            .filter(|line| {
                let lower = line.to_lowercase();
                UNIT_HINTS.iter().any(|unit| lower.contains(unit))
            })
            .map(|line| parse_ingredient_line(line))
            .collect();
    }
    if instructions.is_empty() {
        let names: Vec<&str> = ingredients.iter().map(|i| i.name.as_str()).collect();
        instructions = body
            .iter()
            .filter(|line| {
                let lower = line.to_lowercase();
                !is_ingredient_header(&lower)
                    && !is_instruction_header(&lower)
                    && !line.starts_with('-')
                    && !line.starts_with('*')
                    && !names.iter().any(|n| line.ends_with(n))
            })
            .map(|line| line.to_string())
            .collect();
    }

    RawRecipe {
        name,
        ingredients,
        instructions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_unit_name() {
        let ing = parse_ingredient_line("1.5 OZ London dry gin");
        assert_eq!(ing.quantity, 1.5);
        assert_eq!(ing.unit, "oz");
        assert_eq!(ing.name, "London dry gin");
    }

    #[test]
    fn test_plural_unit() {
        let ing = parse_ingredient_line("2 dashes Angostura bitters");
        assert_eq!((ing.quantity, ing.unit.as_str()), (2.0, "dashes"));
        assert_eq!(ing.name, "Angostura bitters");
    }

    #[test]
    fn test_quantity_without_unit() {
        let ing = parse_ingredient_line("3 mint");
        assert_eq!((ing.quantity, ing.unit.as_str()), (3.0, "unit"));
        assert_eq!(ing.name, "mint");
    }

    #[test]
    fn test_unparsed_line_is_one_unit() {
        let ing = parse_ingredient_line(" Orange twist, to garnish ");
        assert_eq!(ing.quantity, 1.0);
        assert_eq!(ing.unit, "unit");
        assert_eq!(ing.name, "Orange twist, to garnish");
    }

    #[test]
    fn test_raw_text_sections() {
        let raw = "Negroni\nIngredients\n- 1 oz gin\n- 1 oz Campari\n- 1 oz sweet vermouth\n\
                   Method\n1. Stir with ice.\n2. Strain over a large cube.";
        let recipe = parse_raw_text(raw, None);
        assert_eq!(recipe.name, "Negroni");
        assert_eq!(recipe.ingredients.len(), 3);
        assert_eq!(recipe.ingredients[1].name, "Campari");
        assert_eq!(
            recipe.instructions,
            vec!["Stir with ice.", "Strain over a large cube."]
        );
    }

    #[test]
    fn test_rendered_candidate_round_trips() {
        let raw = "Ingredients\n- 2 oz rye\n- 0.25 oz syrup\nInstructions\n- Stir.";
        let recipe = parse_raw_text(raw, Some("Old Fashioned"));
        assert_eq!(recipe.name, "Old Fashioned");
        assert_eq!(recipe.ingredients.len(), 2);
        assert_eq!(recipe.instructions, vec!["Stir."]);
    }

    #[test]
    fn test_raw_text_without_headers() {
        let raw = "Daiquiri\n2 oz rum\n1 oz lime juice\nShake hard and strain.";
        let recipe = parse_raw_text(raw, None);
        assert_eq!(recipe.ingredients.len(), 2);
        assert_eq!(recipe.instructions, vec!["Shake hard and strain."]);
    }

    #[test]
    fn test_empty_text() {
        let recipe = parse_raw_text("  \n ", Some("X"));
        assert_eq!(recipe.name, "X");
        assert!(recipe.ingredients.is_empty());
    }
}
