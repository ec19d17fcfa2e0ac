//! Ingredient extraction from free-form label text.

use once_cell::sync::Lazy;
use regex::Regex;

const MAX_INPUT_LEN: usize = 5000;

static INGREDIENT_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)(?:ingredients?|contains?):?\s*(.*?)(?:nutrition|allergen|$)").unwrap()
});
static PERCENT_PARENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*%[^)]*\)").unwrap());
static LEADING_NUMBERING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\d.]+\s*").unwrap());
static DISALLOWED_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s,().\-]").unwrap());

/// True when the text is usable at the API boundary. This is the only place
/// input problems surface as errors; everything downstream is total.
pub fn validate_input(text: &str) -> bool {
    !text.trim().is_empty() && text.len() <= MAX_INPUT_LEN
}

pub fn normalize_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    DISALLOWED_CHARS.replace_all(&collapsed, "").trim().to_string()
}

/// Pull an ingredient list out of label text. Looks for an
/// "Ingredients:"-style section first; without one, the whole text is
/// treated as the list. Never fails: unusable text produces an empty list.
pub fn extract_ingredients(text: &str) -> Vec<String> {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let section = INGREDIENT_SECTION
        .captures(&normalized)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or(normalized);

    section
        .split(',')
        .map(clean_ingredient)
        .filter(|ing| ing.len() > 1)
        .collect()
}

pub fn clean_ingredient(ingredient: &str) -> String {
    let without_percent = PERCENT_PARENS.replace_all(ingredient, "");
    let without_numbering = LEADING_NUMBERING.replace(without_percent.trim(), "");
    without_numbering
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_boundary_input() {
        assert!(!validate_input("   "));
        assert!(!validate_input(&"x".repeat(5001)));
        assert!(validate_input("sugar, salt"));
    }

    #[test]
    fn extracts_from_labeled_section() {
        let text = "Ingredients: Wheat flour, Sugar, Palm oil, Salt. Nutrition facts per 100g";
        let ingredients = extract_ingredients(text);
        assert_eq!(
            ingredients,
            vec!["Wheat flour", "Sugar", "Palm oil", "Salt."]
        );
    }

    #[test]
    fn falls_back_to_whole_text_without_section_header() {
        let ingredients = extract_ingredients("maida, sugar, emulsifier (INS 322)");
        assert_eq!(ingredients, vec!["maida", "sugar", "emulsifier (INS 322)"]);
    }

    #[test]
    fn strips_percent_parentheses_and_numbering() {
        assert_eq!(clean_ingredient("Wheat Flour (63%)"), "Wheat Flour");
        assert_eq!(clean_ingredient("2. Sugar"), "Sugar");
    }

    #[test]
    fn drops_empty_and_single_char_fragments() {
        let ingredients = extract_ingredients("sugar,, a, salt");
        assert_eq!(ingredients, vec!["sugar", "salt"]);
    }

    #[test]
    fn empty_text_yields_empty_list() {
        assert!(extract_ingredients("").is_empty());
        assert!(extract_ingredients("!!!").is_empty());
    }
}
