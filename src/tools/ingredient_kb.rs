//! Static ingredient knowledge base.
//!
//! The seed data ships inside the binary; lookups are exact name/alias
//! matches, search is substring. `bulk_lookup` silently drops unmatched
//! names — partial results are the expected shape, not an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

const KB_SEED: &str = include_str!("../../data/ingredient_kb.json");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbRecord {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub category: String,
    pub why_it_matters: String,
    #[serde(default)]
    pub risk_level: String,
    #[serde(default)]
    pub confidence: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct KbStats {
    pub total_ingredients: usize,
    pub categories: HashMap<String, usize>,
    pub confidence_levels: HashMap<String, usize>,
}

pub struct IngredientKb {
    records: Vec<KbRecord>,
    name_index: HashMap<String, usize>,
    alias_index: HashMap<String, usize>,
}

impl IngredientKb {
    pub fn load() -> Self {
        let records: Vec<KbRecord> = match serde_json::from_str(KB_SEED) {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to parse bundled ingredient KB: {}", e);
                Vec::new()
            }
        };
        info!("Loaded {} ingredients from KB", records.len());

        let mut name_index = HashMap::new();
        let mut alias_index = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            name_index.insert(record.name.to_lowercase().trim().to_string(), i);
            for alias in &record.aliases {
                alias_index.insert(alias.to_lowercase().trim().to_string(), i);
            }
        }

        Self {
            records,
            name_index,
            alias_index,
        }
    }

    /// Exact match on canonical name, then alias.
    pub fn lookup(&self, query: &str) -> Option<&KbRecord> {
        if query.is_empty() {
            return None;
        }
        let key = query.to_lowercase().trim().to_string();
        self.name_index
            .get(&key)
            .or_else(|| self.alias_index.get(&key))
            .map(|&i| &self.records[i])
    }

    /// Substring search across names and aliases.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&KbRecord> {
        if query.is_empty() {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        self.records
            .iter()
            .filter(|record| {
                record.name.to_lowercase().contains(&needle)
                    || record
                        .aliases
                        .iter()
                        .any(|alias| alias.to_lowercase().contains(&needle))
            })
            .take(limit)
            .collect()
    }

    /// Lookup many names at once; unmatched names are dropped, so the result
    /// may be shorter than the input.
    pub fn bulk_lookup(&self, ingredients: &[String]) -> Vec<&KbRecord> {
        ingredients
            .iter()
            .filter_map(|ing| self.lookup(ing))
            .collect()
    }

    pub fn by_category(&self, category: &str) -> Vec<&KbRecord> {
        self.records
            .iter()
            .filter(|record| record.category.eq_ignore_ascii_case(category))
            .collect()
    }

    pub fn stats(&self) -> KbStats {
        let mut categories: HashMap<String, usize> = HashMap::new();
        let mut confidence_levels: HashMap<String, usize> = HashMap::new();
        for record in &self.records {
            *categories.entry(record.category.clone()).or_default() += 1;
            *confidence_levels.entry(record.confidence.clone()).or_default() += 1;
        }
        KbStats {
            total_ingredients: self.records.len(),
            categories,
            confidence_levels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_data_loads() {
        let kb = IngredientKb::load();
        assert!(kb.stats().total_ingredients >= 10);
    }

    #[test]
    fn lookup_matches_name_case_insensitively() {
        let kb = IngredientKb::load();
        assert!(kb.lookup("Palm Oil").is_some());
        assert!(kb.lookup("unobtainium").is_none());
        assert!(kb.lookup("").is_none());
    }

    #[test]
    fn lookup_matches_aliases() {
        let kb = IngredientKb::load();
        let record = kb.lookup("maida").unwrap();
        assert_eq!(record.name, "refined wheat flour");
        let record = kb.lookup("MSG").unwrap();
        assert_eq!(record.name, "monosodium glutamate");
    }

    #[test]
    fn bulk_lookup_drops_unmatched() {
        let kb = IngredientKb::load();
        let input = vec![
            "sugar".to_string(),
            "definitely-not-an-ingredient".to_string(),
            "palm oil".to_string(),
        ];
        let results = kb.bulk_lookup(&input);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn search_is_substring_and_limited() {
        let kb = IngredientKb::load();
        let hits = kb.search("sodium", 10);
        assert!(hits.len() >= 2);
        assert_eq!(kb.search("sodium", 1).len(), 1);
        assert!(kb.search("", 10).is_empty());
    }

    #[test]
    fn category_filter_works() {
        let kb = IngredientKb::load();
        let sweeteners = kb.by_category("sweetener");
        assert!(sweeteners.iter().any(|r| r.name == "sugar"));
    }
}
