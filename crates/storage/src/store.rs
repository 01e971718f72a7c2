use async_trait::async_trait;
use auszug_core::{
    Currency, FxRate, ImportId, ImportStatus, NewImport, ResolvedTransaction, SuggestionSource,
};
use auszug_fx::{RateStore, RateStoreError};
use auszug_ingest::{ImportRef, ImportRepository, StoreError};
use chrono::NaiveDate;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::db::{self, DbPool, StorageError};

fn store_error(e: impl Into<StorageError>) -> StoreError {
    let e = e.into();
    if e.is_unique_violation() {
        StoreError::Conflict(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

fn rate_error(e: impl Into<StorageError>) -> RateStoreError {
    RateStoreError::Backend(e.into().to_string())
}

/// SQLite-backed imports, transactions and EUR rate table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Opens (or creates) the database file and seeds the default categories.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        let pool = db::create_db(path).await?;
        db::seed_default_categories(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let pool = db::create_memory_db().await?;
        db::seed_default_categories(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn find_by(
        &self,
        column: HashColumn,
        hash: &str,
    ) -> Result<Option<ImportRef>, StoreError> {
        let sql = match column {
            HashColumn::File => "SELECT id, status FROM imports WHERE file_hash = ?",
            HashColumn::Text => "SELECT id, status FROM imports WHERE extracted_text_hash = ?",
        };
        let row = sqlx::query_as::<_, (i64, String)>(sql)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.map(|(id, status)| {
            let status = ImportStatus::from_str(&status)
                .map_err(|e| store_error(StorageError::Corrupt(e)))?;
            Ok(ImportRef {
                id: ImportId(id),
                status,
            })
        })
        .transpose()
    }
}

#[derive(Debug, Clone, Copy)]
enum HashColumn {
    File,
    Text,
}

#[async_trait]
impl ImportRepository for SqliteStore {
    async fn find_by_file_hash(&self, file_hash: &str) -> Result<Option<ImportRef>, StoreError> {
        self.find_by(HashColumn::File, file_hash).await
    }

    async fn find_by_text_hash(&self, text_hash: &str) -> Result<Option<ImportRef>, StoreError> {
        self.find_by(HashColumn::Text, text_hash).await
    }

    async fn create_pending(&self, import: &NewImport) -> Result<ImportId, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO imports
                (file_hash, extracted_text_hash, statement_from, statement_to, status)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&import.file_hash)
        .bind(&import.extracted_text_hash)
        .bind(import.statement_period.start)
        .bind(import.statement_period.end)
        .bind(ImportStatus::Pending.to_string())
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(ImportId(result.last_insert_rowid()))
    }

    async fn complete(
        &self,
        id: ImportId,
        records: &[ResolvedTransaction],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let status = sqlx::query_as::<_, (String,)>("SELECT status FROM imports WHERE id = ?")
            .bind(id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(store_error)?;
        match status {
            None => return Err(StoreError::NotFound(id)),
            Some((s,)) if s != ImportStatus::Pending.to_string() => {
                return Err(StoreError::Conflict(format!("import {id} is already {s}")))
            }
            Some(_) => {}
        }

        for (position, record) in records.iter().enumerate() {
            let draft = &record.draft;
            let conversion = record.conversion.as_ref();
            let source = match record.suggestion.source {
                SuggestionSource::Ai => "ai",
                SuggestionSource::Rules => "rules",
            };
            sqlx::query(
                r#"
                INSERT INTO transactions (
                    import_id, position, booking_date, valuta_date, amount_minor,
                    account_currency, description_raw, external_id, source_ref,
                    report_currency, converted_minor, fx_rate, fx_rate_date, fx_date_source,
                    needs_fx_reconciliation, category_key, merchant_normalized, confidence,
                    suggestion_source
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id.0)
            .bind(position as i64)
            .bind(draft.booking_date)
            .bind(draft.valuta_date)
            .bind(draft.amount_minor)
            .bind(draft.account_currency.to_string())
            .bind(&draft.description_raw)
            .bind(draft.external_id.as_deref())
            .bind(draft.source_ref.to_string())
            .bind(record.report_currency.to_string())
            .bind(conversion.map(|c| c.converted_minor))
            .bind(conversion.map(|c| c.rate.to_string()))
            .bind(conversion.map(|c| c.rate_date))
            .bind(conversion.map(|c| c.date_source.to_string()))
            .bind(record.needs_fx_reconciliation())
            .bind(&record.suggestion.category_key)
            .bind(&record.suggestion.merchant_normalized)
            .bind(f64::from(record.suggestion.confidence))
            .bind(source)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        }

        sqlx::query("UPDATE imports SET status = ?, completed_at = datetime('now') WHERE id = ?")
            .bind(ImportStatus::Completed.to_string())
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;

        tx.commit().await.map_err(store_error)?;
        debug!("Stored {} transactions for import {id}", records.len());
        Ok(())
    }

    async fn discard_pending(&self, id: ImportId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let deleted = sqlx::query("DELETE FROM imports WHERE id = ? AND status = ?")
            .bind(id.0)
            .bind(ImportStatus::Pending.to_string())
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        if deleted.rows_affected() > 0 {
            sqlx::query("DELETE FROM transactions WHERE import_id = ?")
                .bind(id.0)
                .execute(&mut *tx)
                .await
                .map_err(store_error)?;
        }

        tx.commit().await.map_err(store_error)?;
        Ok(())
    }
}

#[async_trait]
impl RateStore for SqliteStore {
    async fn latest_on_or_before(
        &self,
        quote: Currency,
        date: NaiveDate,
        not_before: NaiveDate,
    ) -> Result<Option<FxRate>, RateStoreError> {
        let row = sqlx::query_as::<_, (NaiveDate, String, String)>(
            r#"
            SELECT date, rate, source FROM fx_rates
            WHERE base_currency = ? AND quote_currency = ? AND date >= ? AND date <= ?
            ORDER BY date DESC LIMIT 1
            "#,
        )
        .bind(Currency::EUR.to_string())
        .bind(quote.to_string())
        .bind(not_before)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(rate_error)?;

        row.map(|(date, rate, source)| {
            Ok(FxRate {
                date,
                base: Currency::EUR,
                quote,
                rate: db::decimal(&rate).map_err(rate_error)?,
                source,
            })
        })
        .transpose()
    }

    async fn upsert(&self, rate: FxRate) -> Result<(), RateStoreError> {
        sqlx::query(
            r#"
            INSERT INTO fx_rates (date, base_currency, quote_currency, rate, source)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (date, base_currency, quote_currency) DO UPDATE SET
                rate = excluded.rate,
                source = excluded.source,
                fetched_at = datetime('now')
            "#,
        )
        .bind(rate.date)
        .bind(rate.base.to_string())
        .bind(rate.quote.to_string())
        .bind(rate.rate.to_string())
        .bind(&rate.source)
        .execute(&self.pool)
        .await
        .map_err(rate_error)?;
        Ok(())
    }
}
