use auszug_core::{CategorizationResult, CategoryVocabulary, SuggestionSource, UNCATEGORIZED};
use serde::{Deserialize, Serialize};

/// Confidence assigned to a keyword hit.
pub const KEYWORD_MATCH_CONFIDENCE: f32 = 0.7;
/// Confidence assigned when no keyword matched.
pub const NO_MATCH_CONFIDENCE: f32 = 0.3;

const MERCHANT_MAX_WORDS: usize = 3;

/// Booking-type words banks prefix descriptions with; never part of a
/// merchant name.
const NOISE_WORDS: &[&str] = &[
    "lastschrift",
    "kartenzahlung",
    "gutschrift",
    "überweisung",
    "ueberweisung",
    "dauerauftrag",
    "sepa",
    "basislastschrift",
    "card",
    "payment",
    "pos",
];

/// Default keyword table, checked in order; the first rule with a matching
/// keyword wins.
pub const DEFAULT_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "food_groceries",
        &[
            "rewe",
            "edeka",
            "lidl",
            "aldi",
            "penny",
            "netto",
            "kaufland",
            "supermarkt",
            "lebensmittel",
        ],
    ),
    (
        "food_restaurant",
        &[
            "restaurant",
            "cafe",
            "coffee",
            "starbucks",
            "mcdonald",
            "burger",
            "pizza",
            "sushi",
            "lieferando",
            "uber eats",
        ],
    ),
    (
        "transport_public",
        &["db ", "bahn", "ticket", "uber", "taxi", "bolt", "flixbus", "bvg", "mvg"],
    ),
    (
        "transport_car",
        &["tankstelle", "shell", "aral", "esso", "benzin", "diesel", "parking", "parkhaus"],
    ),
    ("housing_rent", &["miete", "rent", "wohnung"]),
    ("utilities_electricity", &["strom", "electricity", "vattenfall", "e.on", "stadtwerke"]),
    ("utilities_water", &["wasser", "water"]),
    ("utilities_internet", &["telekom", "vodafone", "o2 ", "1&1", "internet", "dsl"]),
    (
        "entertainment",
        &[
            "netflix",
            "spotify",
            "disney",
            "amazon prime",
            "youtube",
            "kino",
            "cinema",
            "theater",
            "steam",
            "playstation",
            "nintendo",
        ],
    ),
    ("healthcare", &["apotheke", "arzt", "doctor", "pharmacy", "krankenhaus", "hospital"]),
    ("shopping", &["amazon", "zalando", "h&m", "zara", "mediamarkt", "saturn", "ikea"]),
    ("income_salary", &["gehalt", "salary", "lohn", "wage"]),
    ("income_other", &["erstattung", "refund", "zinsen", "einzahlung"]),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub category: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct KeywordTable {
    #[serde(rename = "rule")]
    rules: Vec<KeywordRule>,
}

/// Deterministic keyword categorizer used whenever the AI path is
/// unavailable or its answer is rejected.
#[derive(Debug, Clone)]
pub struct KeywordRules {
    rules: Vec<KeywordRule>,
}

impl Default for KeywordRules {
    fn default() -> Self {
        Self::new(
            DEFAULT_KEYWORDS
                .iter()
                .map(|(category, keywords)| KeywordRule {
                    category: category.to_string(),
                    keywords: keywords.iter().map(|k| k.to_string()).collect(),
                })
                .collect(),
        )
    }
}

impl KeywordRules {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|r| KeywordRule {
                category: r.category,
                keywords: r.keywords.iter().map(|k| k.to_lowercase()).collect(),
            })
            .collect();
        Self { rules }
    }

    /// Loads a replacement table:
    ///
    /// ```toml
    /// [[rule]]
    /// category = "food_groceries"
    /// keywords = ["rewe", "edeka"]
    /// ```
    pub fn from_toml(toml_content: &str) -> Result<Self, String> {
        let table: KeywordTable =
            toml::from_str(toml_content).map_err(|e| format!("Failed to parse TOML: {e}"))?;
        Ok(Self::new(table.rules))
    }

    pub fn rules(&self) -> &[KeywordRule] {
        &self.rules
    }

    /// First rule with a keyword contained in the description whose category
    /// the vocabulary allows.
    pub fn find_category(
        &self,
        description: &str,
        vocabulary: &CategoryVocabulary,
    ) -> Option<&str> {
        let text = description.to_lowercase();
        self.rules
            .iter()
            .filter(|r| vocabulary.contains(&r.category))
            .find(|r| r.keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|r| r.category.as_str())
    }

    pub fn categorize(
        &self,
        index: usize,
        description: &str,
        vocabulary: &CategoryVocabulary,
    ) -> CategorizationResult {
        let (category, confidence) = match self.find_category(description, vocabulary) {
            Some(category) => (category, KEYWORD_MATCH_CONFIDENCE),
            None => (UNCATEGORIZED, NO_MATCH_CONFIDENCE),
        };
        CategorizationResult::new(
            index,
            category,
            normalize_merchant(description),
            confidence,
            SuggestionSource::Rules,
        )
    }
}

/// Best-effort merchant label: the first few alphabetic words of the
/// description after booking-type noise, title-cased.
pub fn normalize_merchant(description: &str) -> String {
    let words: Vec<String> = description
        .split(|c: char| c.is_whitespace() || matches!(c, '|' | '*' | '/'))
        .filter(|w| !w.is_empty())
        .skip_while(|w| NOISE_WORDS.contains(&w.to_lowercase().as_str()))
        .take_while(|w| !w.chars().any(|c| c.is_ascii_digit()))
        .filter(|w| w.chars().any(char::is_alphabetic))
        .take(MERCHANT_MAX_WORDS)
        .map(title_case)
        .collect();

    if words.is_empty() {
        "Unknown".to_string()
    } else {
        words.join(" ")
    }
}

fn title_case(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
