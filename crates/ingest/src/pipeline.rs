use auszug_core::{
    format_minor, CategoryVocabulary, Currency, DateRange, ImportId, ImportStatus, NewImport,
    ResolvedTransaction,
};
use auszug_fx::FxResolver;
use auszug_import::{decode_statement, Categorizer, StatementFormat, StatementParser};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::IngestConfig;
use crate::error::{IngestError, ValidationError};
use crate::extractor::{extract_with_budget, TextExtractor};
use crate::hash;
use crate::ports::{ImportRef, ImportRepository, StoreError};

/// Which dedup check recognized the statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateMatch {
    FileHash,
    TextHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub import_id: ImportId,
    pub transaction_count: usize,
    pub skipped_rows: usize,
    /// Records stored without a converted amount.
    pub unconverted: usize,
    pub uncategorized: usize,
    pub ai_chunks: usize,
    pub fallback_chunks: usize,
    pub statement_period: DateRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Imported(ImportSummary),
    /// Nothing was written; the statement is already imported.
    Duplicate {
        existing: ImportId,
        matched_on: DuplicateMatch,
    },
}

/// A fully resolved statement that has not been written yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparedImport {
    pub import: NewImport,
    pub records: Vec<ResolvedTransaction>,
    pub skipped_rows: usize,
    pub ai_chunks: usize,
    pub fallback_chunks: usize,
    /// PENDING imports left behind by an earlier failed run of this same
    /// statement; removed before the new import is created.
    pub stale_pending: Vec<ImportId>,
}

impl PreparedImport {
    pub fn unconverted(&self) -> usize {
        self.records.iter().filter(|r| r.needs_fx_reconciliation()).count()
    }

    pub fn uncategorized(&self) -> usize {
        self.records.iter().filter(|r| r.suggestion.is_uncategorized()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Prepared {
    Ready(PreparedImport),
    Duplicate {
        existing: ImportId,
        matched_on: DuplicateMatch,
    },
}

fn check_size(bytes: &[u8], max: usize) -> Result<(), ValidationError> {
    if bytes.is_empty() {
        return Err(ValidationError::Empty);
    }
    if bytes.len() > max {
        return Err(ValidationError::TooLarge {
            size: bytes.len(),
            max,
        });
    }
    Ok(())
}

/// Orchestrates: size check → file hash dedup → extract → parse → text hash
/// dedup → {categorize, convert} → persist → COMPLETED.
pub struct Ingestor {
    config: IngestConfig,
    repository: Arc<dyn ImportRepository>,
    fx: FxResolver,
    categorizer: Categorizer,
    extractor: Arc<dyn TextExtractor>,
    vocabulary: CategoryVocabulary,
}

impl Ingestor {
    pub fn new(
        config: IngestConfig,
        repository: Arc<dyn ImportRepository>,
        fx: FxResolver,
        categorizer: Categorizer,
        extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            config,
            repository,
            fx,
            categorizer,
            extractor,
            vocabulary: CategoryVocabulary::default(),
        }
    }

    pub fn with_vocabulary(mut self, vocabulary: CategoryVocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Imports a statement, or reports the import it duplicates.
    pub async fn ingest(
        &self,
        bytes: &[u8],
        filename: &str,
        report_currency: Currency,
    ) -> Result<IngestOutcome, IngestError> {
        match self.prepare(bytes, filename, report_currency).await? {
            Prepared::Duplicate {
                existing,
                matched_on,
            } => {
                info!(%existing, ?matched_on, filename, "statement already imported");
                Ok(IngestOutcome::Duplicate {
                    existing,
                    matched_on,
                })
            }
            Prepared::Ready(prepared) => self.commit(prepared).await,
        }
    }

    /// Everything up to persistence. Only reads from the repository, so it
    /// doubles as a dry run.
    pub async fn prepare(
        &self,
        bytes: &[u8],
        filename: &str,
        report_currency: Currency,
    ) -> Result<Prepared, IngestError> {
        check_size(bytes, self.config.max_file_bytes)?;

        // 1. Cheapest check first: the raw bytes.
        let file_hash = hash::file_digest(bytes);
        let mut stale_pending = Vec::new();
        match self.repository.find_by_file_hash(&file_hash).await? {
            Some(ImportRef {
                id,
                status: ImportStatus::Completed,
            }) => {
                return Ok(Prepared::Duplicate {
                    existing: id,
                    matched_on: DuplicateMatch::FileHash,
                })
            }
            Some(ImportRef { id, .. }) => stale_pending.push(id),
            None => {}
        }

        let format = StatementFormat::from_filename(filename)
            .ok_or_else(|| ValidationError::UnsupportedType(filename.to_string()))?;

        // 2. Text and parse.
        let text = match format {
            StatementFormat::Csv => decode_statement(bytes),
            StatementFormat::Pdf => {
                extract_with_budget(
                    self.extractor.clone(),
                    bytes.to_vec(),
                    self.config.extraction_timeout(),
                )
                .await?
            }
        };
        let parsed = StatementParser::for_format(format, self.config.home_currency).parse(&text);
        if parsed.skipped > 0 {
            warn!(filename, skipped = parsed.skipped, "unreadable statement rows skipped");
        }
        let Some(statement_period) = parsed.period() else {
            return Err(IngestError::NoTransactions {
                skipped: parsed.skipped,
            });
        };

        // 3. Same content in another container.
        let extracted_text_hash = hash::text_digest(&parsed.text);
        match self.repository.find_by_text_hash(&extracted_text_hash).await? {
            Some(ImportRef {
                id,
                status: ImportStatus::Completed,
            }) => {
                return Ok(Prepared::Duplicate {
                    existing: id,
                    matched_on: DuplicateMatch::TextHash,
                })
            }
            Some(ImportRef { id, .. }) if !stale_pending.contains(&id) => stale_pending.push(id),
            _ => {}
        }

        // 4. Categorization and conversion are independent of each other.
        let (categories, conversions) = tokio::join!(
            self.categorizer.categorize(&parsed.transactions, &self.vocabulary),
            self.fx.convert_all(&parsed.transactions, report_currency),
        );

        let records: Vec<ResolvedTransaction> = parsed
            .transactions
            .into_iter()
            .zip(conversions)
            .zip(categories.results)
            .map(|((draft, conversion), suggestion)| {
                let conversion = match conversion {
                    Ok(c) => Some(c),
                    Err(e) => {
                        warn!(
                            source_ref = %draft.source_ref,
                            amount = %format_minor(draft.amount_minor, draft.account_currency),
                            "left unconverted: {e}"
                        );
                        None
                    }
                };
                ResolvedTransaction {
                    draft,
                    report_currency,
                    conversion,
                    suggestion,
                }
            })
            .collect();

        Ok(Prepared::Ready(PreparedImport {
            import: NewImport {
                file_hash,
                extracted_text_hash,
                statement_period,
            },
            records,
            skipped_rows: parsed.skipped,
            ai_chunks: categories.ai_chunks,
            fallback_chunks: categories.fallback_chunks,
            stale_pending,
        }))
    }

    /// Creates the import and stores its records.
    pub async fn commit(&self, prepared: PreparedImport) -> Result<IngestOutcome, IngestError> {
        for id in &prepared.stale_pending {
            warn!(import_id = %id, "discarding import left PENDING by an earlier run");
            self.repository.discard_pending(*id).await?;
        }

        let import_id = match self.repository.create_pending(&prepared.import).await {
            Ok(id) => id,
            Err(StoreError::Conflict(what)) => {
                // Duplicate only if the other run already completed; a
                // PENDING holder is still in flight.
                return match self.find_completed(&prepared.import).await? {
                    Some((existing, matched_on)) => Ok(IngestOutcome::Duplicate {
                        existing,
                        matched_on,
                    }),
                    None => Err(StoreError::Conflict(what).into()),
                };
            }
            Err(e) => return Err(e.into()),
        };

        self.repository.complete(import_id, &prepared.records).await?;

        let summary = ImportSummary {
            import_id,
            transaction_count: prepared.records.len(),
            skipped_rows: prepared.skipped_rows,
            unconverted: prepared.unconverted(),
            uncategorized: prepared.uncategorized(),
            ai_chunks: prepared.ai_chunks,
            fallback_chunks: prepared.fallback_chunks,
            statement_period: prepared.import.statement_period,
        };
        info!(
            %import_id,
            transactions = summary.transaction_count,
            skipped = summary.skipped_rows,
            unconverted = summary.unconverted,
            uncategorized = summary.uncategorized,
            "import completed"
        );
        Ok(IngestOutcome::Imported(summary))
    }

    async fn find_completed(
        &self,
        import: &NewImport,
    ) -> Result<Option<(ImportId, DuplicateMatch)>, IngestError> {
        let completed = |r: &ImportRef| r.status == ImportStatus::Completed;
        let by_file = self.repository.find_by_file_hash(&import.file_hash).await?;
        if let Some(r) = by_file.filter(completed) {
            return Ok(Some((r.id, DuplicateMatch::FileHash)));
        }
        let by_text = self
            .repository
            .find_by_text_hash(&import.extracted_text_hash)
            .await?;
        if let Some(r) = by_text.filter(completed) {
            return Ok(Some((r.id, DuplicateMatch::TextHash)));
        }
        Ok(None)
    }
}
