use async_trait::async_trait;
use auszug_core::{
    CategorizationResult, CategoryVocabulary, DraftTransaction, SuggestionSource,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::rules::KeywordRules;

pub const DEFAULT_CHUNK_SIZE: usize = 50;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Why an AI chunk was not trusted. Never fatal to an import: the chunk is
/// categorized by keyword rules instead.
#[derive(Debug, Error)]
pub enum CategorizationServiceError {
    #[error("AI categorization is not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Transport(String),
    #[error("service responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("empty response")]
    EmptyResponse,
    #[error("invalid JSON in response: {0}")]
    InvalidJson(String),
    #[error("schema violation: {0}")]
    Schema(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// One transaction as presented to the AI service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionForAnalysis {
    pub index: usize,
    pub description: String,
    /// Major units, e.g. `-19.90`.
    pub amount: Decimal,
    pub currency: String,
    pub date: String,
}

impl TransactionForAnalysis {
    pub fn from_draft(index: usize, tx: &DraftTransaction) -> Self {
        Self {
            index,
            description: tx.description_raw.clone(),
            amount: Decimal::new(tx.amount_minor, 2),
            currency: tx.account_currency.to_string(),
            date: tx.booking_date.format("%Y-%m-%d").to_string(),
        }
    }
}

/// An AI backend. Returns the raw JSON body the model produced; validation
/// happens in [`Categorizer`].
#[async_trait]
pub trait CategorizationProvider: Send + Sync {
    fn model(&self) -> &str;

    async fn analyze(
        &self,
        chunk: &[TransactionForAnalysis],
        vocabulary: &CategoryVocabulary,
    ) -> Result<String, CategorizationServiceError>;
}

// ── Response schema ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnalysisResponse {
    transactions: Vec<AnalysisItem>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct AnalysisItem {
    index: usize,
    suggested_category: String,
    merchant_normalized: String,
    confidence: f64,
}

/// Parses and checks a chunk response. The whole chunk is rejected on any
/// deviation; results come back in `expected` order.
pub fn validate_response(
    raw: &str,
    expected: &[usize],
    vocabulary: &CategoryVocabulary,
) -> Result<Vec<CategorizationResult>, CategorizationServiceError> {
    if raw.trim().is_empty() {
        return Err(CategorizationServiceError::EmptyResponse);
    }
    let response: AnalysisResponse = serde_json::from_str(raw).map_err(|e| {
        if e.is_data() {
            CategorizationServiceError::Schema(e.to_string())
        } else {
            CategorizationServiceError::InvalidJson(e.to_string())
        }
    })?;

    let wanted: HashSet<usize> = expected.iter().copied().collect();
    let mut seen = HashSet::new();
    for item in &response.transactions {
        if !wanted.contains(&item.index) {
            return Err(CategorizationServiceError::Schema(format!(
                "index {} is not part of the chunk",
                item.index
            )));
        }
        if !seen.insert(item.index) {
            return Err(CategorizationServiceError::Schema(format!(
                "index {} answered twice",
                item.index
            )));
        }
        if !vocabulary.contains(&item.suggested_category) {
            return Err(CategorizationServiceError::Schema(format!(
                "category '{}' is not in the vocabulary",
                item.suggested_category
            )));
        }
        if !(0.0..=1.0).contains(&item.confidence) {
            return Err(CategorizationServiceError::Schema(format!(
                "confidence {} outside [0, 1]",
                item.confidence
            )));
        }
    }
    if seen.len() != wanted.len() {
        return Err(CategorizationServiceError::Schema(format!(
            "{} of {} transactions answered",
            seen.len(),
            wanted.len()
        )));
    }

    let mut by_index: std::collections::HashMap<usize, AnalysisItem> = response
        .transactions
        .into_iter()
        .map(|item| (item.index, item))
        .collect();
    Ok(expected
        .iter()
        .filter_map(|idx| by_index.remove(idx))
        .map(|item| {
            CategorizationResult::new(
                item.index,
                item.suggested_category,
                item.merchant_normalized.trim(),
                item.confidence as f32,
                SuggestionSource::Ai,
            )
        })
        .collect())
}

// ── Categorizer ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CategorizationOutcome {
    /// Index-aligned with the input batch.
    pub results: Vec<CategorizationResult>,
    pub ai_chunks: usize,
    pub fallback_chunks: usize,
}

impl CategorizationOutcome {
    pub fn uncategorized(&self) -> usize {
        self.results.iter().filter(|r| r.is_uncategorized()).count()
    }
}

/// Batch categorizer: AI in sequential chunks, keyword rules for any chunk
/// the AI path cannot answer cleanly.
pub struct Categorizer {
    provider: Option<Arc<dyn CategorizationProvider>>,
    rules: KeywordRules,
    chunk_size: usize,
    timeout: Duration,
}

impl Categorizer {
    /// Rules-only categorizer.
    pub fn new(rules: KeywordRules) -> Self {
        Self {
            provider: None,
            rules,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn CategorizationProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn categorize(
        &self,
        transactions: &[DraftTransaction],
        vocabulary: &CategoryVocabulary,
    ) -> CategorizationOutcome {
        let mut results = Vec::with_capacity(transactions.len());
        let mut ai_chunks = 0;
        let mut fallback_chunks = 0;

        let requests: Vec<TransactionForAnalysis> = transactions
            .iter()
            .enumerate()
            .map(|(idx, tx)| TransactionForAnalysis::from_draft(idx, tx))
            .collect();

        for chunk in requests.chunks(self.chunk_size) {
            match self.ask_provider(chunk, vocabulary).await {
                Ok(chunk_results) => {
                    ai_chunks += 1;
                    results.extend(chunk_results);
                }
                Err(e) => {
                    if !matches!(e, CategorizationServiceError::NotConfigured) {
                        warn!(
                            first_index = chunk[0].index,
                            len = chunk.len(),
                            "AI categorization rejected, using keyword rules: {e}"
                        );
                    }
                    fallback_chunks += 1;
                    results.extend(
                        chunk
                            .iter()
                            .map(|t| self.rules.categorize(t.index, &t.description, vocabulary)),
                    );
                }
            }
        }

        info!(
            transactions = transactions.len(),
            ai_chunks, fallback_chunks, "categorization finished"
        );
        CategorizationOutcome {
            results,
            ai_chunks,
            fallback_chunks,
        }
    }

    async fn ask_provider(
        &self,
        chunk: &[TransactionForAnalysis],
        vocabulary: &CategoryVocabulary,
    ) -> Result<Vec<CategorizationResult>, CategorizationServiceError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(CategorizationServiceError::NotConfigured)?;

        let raw = tokio::time::timeout(self.timeout, provider.analyze(chunk, vocabulary))
            .await
            .map_err(|_| CategorizationServiceError::Timeout(self.timeout))??;
        debug!(model = provider.model(), bytes = raw.len(), "AI chunk answered");

        let expected: Vec<usize> = chunk.iter().map(|t| t.index).collect();
        validate_response(&raw, &expected, vocabulary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auszug_core::{Currency, SourceRef};
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn tx(desc: &str) -> DraftTransaction {
        DraftTransaction::new(
            NaiveDate::from_ymd_opt(2025, 11, 28).unwrap(),
            -1990,
            Currency::EUR,
            desc,
            SourceRef::Row(2),
        )
    }

    fn vocab() -> CategoryVocabulary {
        CategoryVocabulary::default()
    }

    /// Answers every chunk with the same category, or with the scripted
    /// replies in order.
    struct ScriptedProvider {
        replies: Mutex<Vec<Result<String, CategorizationServiceError>>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<String, CategorizationServiceError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl CategorizationProvider for ScriptedProvider {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn analyze(
            &self,
            _chunk: &[TransactionForAnalysis],
            _vocabulary: &CategoryVocabulary,
        ) -> Result<String, CategorizationServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.replies.lock().unwrap().remove(0)
        }
    }

    fn answer(items: &[(usize, &str, f64)]) -> String {
        let transactions: Vec<serde_json::Value> = items
            .iter()
            .map(|(index, category, confidence)| {
                serde_json::json!({
                    "index": index,
                    "suggestedCategory": category,
                    "merchantNormalized": "Merchant",
                    "confidence": confidence,
                })
            })
            .collect();
        serde_json::json!({ "transactions": transactions }).to_string()
    }

    // ── validation ───────────────────────────────────────────────────────────

    #[test]
    fn valid_response_in_chunk_order() {
        let raw = answer(&[(1, "shopping", 0.8), (0, "food_groceries", 0.95)]);
        let results = validate_response(&raw, &[0, 1], &vocab()).unwrap();
        assert_eq!(results[0].index, 0);
        assert_eq!(results[0].category_key, "food_groceries");
        assert_eq!(results[1].category_key, "shopping");
        assert_eq!(results[1].source, SuggestionSource::Ai);
    }

    #[test]
    fn rejects_out_of_vocabulary_category() {
        let raw = answer(&[(0, "crypto", 0.9)]);
        assert!(matches!(
            validate_response(&raw, &[0], &vocab()),
            Err(CategorizationServiceError::Schema(_))
        ));
    }

    #[test]
    fn rejects_missing_duplicate_and_foreign_indices() {
        let v = vocab();
        assert!(validate_response(&answer(&[(0, "shopping", 0.9)]), &[0, 1], &v).is_err());
        assert!(validate_response(
            &answer(&[(0, "shopping", 0.9), (0, "shopping", 0.9)]),
            &[0, 1],
            &v
        )
        .is_err());
        assert!(validate_response(&answer(&[(7, "shopping", 0.9)]), &[0], &v).is_err());
    }

    #[test]
    fn rejects_confidence_out_of_range() {
        let raw = answer(&[(0, "shopping", 1.2)]);
        assert!(validate_response(&raw, &[0], &vocab()).is_err());
    }

    #[test]
    fn rejects_malformed_json_and_unknown_fields() {
        assert!(matches!(
            validate_response("{not json", &[0], &vocab()),
            Err(CategorizationServiceError::InvalidJson(_))
        ));
        let extra = r#"{"transactions":[],"total":12}"#;
        assert!(matches!(
            validate_response(extra, &[], &vocab()),
            Err(CategorizationServiceError::Schema(_))
        ));
        assert!(matches!(
            validate_response("  ", &[0], &vocab()),
            Err(CategorizationServiceError::EmptyResponse)
        ));
    }

    // ── batching & fallback ──────────────────────────────────────────────────

    #[tokio::test]
    async fn rules_only_without_provider() {
        let categorizer = Categorizer::new(KeywordRules::default());
        let outcome = categorizer
            .categorize(&[tx("REWE SAGT DANKE"), tx("ACME GMBH")], &vocab())
            .await;
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].category_key, "food_groceries");
        assert_eq!(outcome.results[0].confidence, 0.7);
        assert!(outcome.results[1].is_uncategorized());
        assert_eq!(outcome.results[1].confidence, 0.3);
        assert_eq!(outcome.ai_chunks, 0);
        assert_eq!(outcome.fallback_chunks, 1);
        assert_eq!(outcome.uncategorized(), 1);
    }

    #[tokio::test]
    async fn failed_chunk_falls_back_entirely() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(answer(&[(0, "shopping", 0.9), (1, "shopping", 0.9)])),
            // Second chunk: one good row, one bad category
            Ok(answer(&[(2, "shopping", 0.9), (3, "crypto", 0.9)])),
        ]));
        let categorizer = Categorizer::new(KeywordRules::default())
            .with_provider(provider.clone())
            .with_chunk_size(2);
        let batch = [tx("a"), tx("b"), tx("REWE"), tx("d")];
        let outcome = categorizer.categorize(&batch, &vocab()).await;

        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(outcome.ai_chunks, 1);
        assert_eq!(outcome.fallback_chunks, 1);
        assert_eq!(outcome.results[0].source, SuggestionSource::Ai);
        assert_eq!(outcome.results[2].source, SuggestionSource::Rules);
        assert_eq!(outcome.results[2].category_key, "food_groceries");
        assert_eq!(outcome.results[3].source, SuggestionSource::Rules);
        let indices: Vec<usize> = outcome.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn transport_error_falls_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(
            CategorizationServiceError::Status {
                status: 500,
                body: "boom".into(),
            },
        )]));
        let categorizer = Categorizer::new(KeywordRules::default()).with_provider(provider);
        let outcome = categorizer.categorize(&[tx("REWE")], &vocab()).await;
        assert_eq!(outcome.fallback_chunks, 1);
        assert_eq!(outcome.results[0].category_key, "food_groceries");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out_to_fallback() {
        let mut provider = ScriptedProvider::new(vec![Ok(answer(&[(0, "shopping", 0.9)]))]);
        provider.delay = Some(Duration::from_secs(60));
        let categorizer = Categorizer::new(KeywordRules::default())
            .with_provider(Arc::new(provider))
            .with_timeout(Duration::from_secs(5));
        let outcome = categorizer.categorize(&[tx("REWE")], &vocab()).await;
        assert_eq!(outcome.ai_chunks, 0);
        assert_eq!(outcome.results[0].source, SuggestionSource::Rules);
    }

    #[tokio::test]
    async fn empty_batch_makes_no_calls() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let categorizer = Categorizer::new(KeywordRules::default()).with_provider(provider.clone());
        let outcome = categorizer.categorize(&[], &vocab()).await;
        assert!(outcome.results.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn analysis_payload_uses_major_units() {
        let t = TransactionForAnalysis::from_draft(3, &tx("x"));
        assert_eq!(t.amount.to_string(), "-19.90");
        assert_eq!(t.date, "2025-11-28");
        assert_eq!(t.index, 3);
    }
}
