use serde::{Deserialize, Serialize};
use std::fmt;

pub const UNCATEGORIZED: &str = "uncategorized";

/// Built-in category keys with their default display names.
pub const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("food_groceries", "Groceries"),
    ("food_restaurant", "Restaurants"),
    ("transport_public", "Public Transport"),
    ("transport_car", "Car"),
    ("housing_rent", "Rent"),
    ("utilities_electricity", "Electricity"),
    ("utilities_water", "Water"),
    ("utilities_internet", "Internet"),
    ("entertainment", "Entertainment"),
    ("healthcare", "Healthcare"),
    ("shopping", "Shopping"),
    ("income_salary", "Salary"),
    ("income_other", "Other Income"),
    (UNCATEGORIZED, "Uncategorized"),
];

/// The closed set of keys a suggestion may use. `uncategorized` is always a
/// member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryVocabulary {
    keys: Vec<String>,
}

impl CategoryVocabulary {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if !keys.iter().any(|k| k == UNCATEGORIZED) {
            keys.push(UNCATEGORIZED.to_string());
        }
        Self { keys }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Default for CategoryVocabulary {
    fn default() -> Self {
        Self::new(DEFAULT_CATEGORIES.iter().map(|(key, _)| *key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    Ai,
    Rules,
}

impl fmt::Display for SuggestionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuggestionSource::Ai => write!(f, "ai"),
            SuggestionSource::Rules => write!(f, "rules"),
        }
    }
}

/// Advisory category suggestion for the transaction at `index` of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorizationResult {
    pub index: usize,
    pub category_key: String,
    pub merchant_normalized: String,
    /// Always within [0, 1].
    pub confidence: f32,
    pub source: SuggestionSource,
}

impl CategorizationResult {
    pub fn new(
        index: usize,
        category_key: impl Into<String>,
        merchant_normalized: impl Into<String>,
        confidence: f32,
        source: SuggestionSource,
    ) -> Self {
        Self {
            index,
            category_key: category_key.into(),
            merchant_normalized: merchant_normalized.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source,
        }
    }

    pub fn is_uncategorized(&self) -> bool {
        self.category_key == UNCATEGORIZED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_always_contains_uncategorized() {
        let vocab = CategoryVocabulary::new(["food_groceries"]);
        assert!(vocab.contains("food_groceries"));
        assert!(vocab.contains(UNCATEGORIZED));
        assert!(!vocab.contains("shopping"));
        assert_eq!(vocab.keys().len(), 2);
    }

    #[test]
    fn default_vocabulary_matches_table() {
        let vocab = CategoryVocabulary::default();
        assert_eq!(vocab.keys().len(), DEFAULT_CATEGORIES.len());
        assert!(vocab.contains("housing_rent"));
    }

    #[test]
    fn result_clamps_confidence() {
        let r = CategorizationResult::new(0, "shopping", "Ikea", 1.4, SuggestionSource::Ai);
        assert_eq!(r.confidence, 1.0);
        let r = CategorizationResult::new(0, UNCATEGORIZED, "", -0.2, SuggestionSource::Rules);
        assert_eq!(r.confidence, 0.0);
        assert!(r.is_uncategorized());
    }
}
