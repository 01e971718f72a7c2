use auszug_core::{
    CategorizationResult, CategoryVocabulary, Currency, DraftTransaction, FxConversion, Import,
    ImportId, ImportStatus, ResolvedTransaction, SourceRef, SuggestionSource, DEFAULT_CATEGORIES,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    /// A stored value no longer parses into its domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StorageError::Db(sqlx::Error::Database(db)) if db.is_unique_violation())
    }
}

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    configure(&pool).await?;

    Ok(pool)
}

/// A private database that lives as long as the pool's single connection.
pub async fn create_memory_db() -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    configure(&pool).await?;
    Ok(pool)
}

async fn configure(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA cache_size = -32000")
        .execute(pool)
        .await?;

    run_migrations(pool).await
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS imports (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_hash TEXT NOT NULL UNIQUE,
            extracted_text_hash TEXT NOT NULL UNIQUE,
            statement_from TEXT NOT NULL,
            statement_to TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'PENDING',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            import_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            booking_date TEXT NOT NULL,
            valuta_date TEXT NOT NULL,
            amount_minor INTEGER NOT NULL,
            account_currency TEXT NOT NULL,
            description_raw TEXT NOT NULL,
            external_id TEXT,
            source_ref TEXT NOT NULL,
            report_currency TEXT NOT NULL,
            converted_minor INTEGER,
            fx_rate TEXT,
            fx_rate_date TEXT,
            fx_date_source TEXT,
            needs_fx_reconciliation INTEGER NOT NULL DEFAULT 0,
            category_key TEXT NOT NULL,
            merchant_normalized TEXT NOT NULL,
            confidence REAL NOT NULL,
            suggestion_source TEXT NOT NULL,
            UNIQUE (import_id, position),
            FOREIGN KEY (import_id) REFERENCES imports(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fx_rates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            base_currency TEXT NOT NULL,
            quote_currency TEXT NOT NULL,
            rate TEXT NOT NULL,
            source TEXT NOT NULL,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (date, base_currency, quote_currency)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS categories (
            key TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn seed_default_categories(pool: &DbPool) -> Result<(), sqlx::Error> {
    for (key, name) in DEFAULT_CATEGORIES {
        sqlx::query("INSERT OR IGNORE INTO categories (key, name) VALUES (?, ?)")
            .bind(*key)
            .bind(*name)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// The category keys suggestions may use; `uncategorized` is always present.
pub async fn load_category_vocabulary(pool: &DbPool) -> Result<CategoryVocabulary, sqlx::Error> {
    let keys = sqlx::query_as::<_, (String,)>("SELECT key FROM categories ORDER BY rowid")
        .fetch_all(pool)
        .await?;
    Ok(CategoryVocabulary::new(keys.into_iter().map(|(key,)| key)))
}

pub async fn get_import(pool: &DbPool, id: ImportId) -> Result<Option<Import>, StorageError> {
    let row = sqlx::query_as::<_, (i64, String, String, NaiveDate, NaiveDate, String)>(
        r#"
        SELECT id, file_hash, extracted_text_hash, statement_from, statement_to, status
        FROM imports WHERE id = ?
        "#,
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await?;

    row.map(|r| {
        Ok(Import {
            id: ImportId(r.0),
            file_hash: r.1,
            extracted_text_hash: r.2,
            statement_from: r.3,
            statement_to: r.4,
            status: ImportStatus::from_str(&r.5).map_err(StorageError::Corrupt)?,
        })
    })
    .transpose()
}

/// Stored records of one import, in statement order.
pub async fn get_transactions_for_import(
    pool: &DbPool,
    id: ImportId,
) -> Result<Vec<ResolvedTransaction>, StorageError> {
    let rows = sqlx::query(
        r#"
        SELECT position, booking_date, valuta_date, amount_minor, account_currency,
               description_raw, external_id, source_ref, report_currency,
               converted_minor, fx_rate, fx_rate_date, fx_date_source,
               category_key, merchant_normalized, confidence, suggestion_source
        FROM transactions WHERE import_id = ? ORDER BY position
        "#,
    )
    .bind(id.0)
    .fetch_all(pool)
    .await?;

    rows.iter().map(resolved_from_row).collect()
}

fn resolved_from_row(row: &SqliteRow) -> Result<ResolvedTransaction, StorageError> {
    let position: i64 = row.try_get("position")?;
    let source_ref: String = row.try_get("source_ref")?;

    let draft = DraftTransaction::new(
        row.try_get("booking_date")?,
        row.try_get("amount_minor")?,
        currency(row.try_get("account_currency")?)?,
        row.try_get::<String, _>("description_raw")?,
        SourceRef::from_str(&source_ref).map_err(StorageError::Corrupt)?,
    )
    .with_valuta(row.try_get("valuta_date")?)
    .with_external_id(row.try_get("external_id")?);

    let conversion = match row.try_get::<Option<i64>, _>("converted_minor")? {
        Some(converted_minor) => {
            let rate: Option<String> = row.try_get("fx_rate")?;
            let rate_date: Option<NaiveDate> = row.try_get("fx_rate_date")?;
            let date_source: Option<String> = row.try_get("fx_date_source")?;
            let (Some(rate), Some(rate_date), Some(date_source)) = (rate, rate_date, date_source)
            else {
                return Err(StorageError::Corrupt(format!(
                    "conversion at position {position} lacks its rate"
                )));
            };
            Some(FxConversion {
                converted_minor,
                rate: decimal(&rate)?,
                rate_date,
                date_source: date_source.parse().map_err(StorageError::Corrupt)?,
            })
        }
        None => None,
    };

    let source = match row.try_get::<String, _>("suggestion_source")?.as_str() {
        "ai" => SuggestionSource::Ai,
        "rules" => SuggestionSource::Rules,
        other => {
            return Err(StorageError::Corrupt(format!(
                "unknown suggestion source '{other}'"
            )))
        }
    };
    let confidence: f64 = row.try_get("confidence")?;
    let suggestion = CategorizationResult::new(
        usize::try_from(position).map_err(|e| StorageError::Corrupt(e.to_string()))?,
        row.try_get::<String, _>("category_key")?,
        row.try_get::<String, _>("merchant_normalized")?,
        confidence as f32,
        source,
    );

    Ok(ResolvedTransaction {
        draft,
        report_currency: currency(row.try_get("report_currency")?)?,
        conversion,
        suggestion,
    })
}

pub(crate) fn currency(code: String) -> Result<Currency, StorageError> {
    Currency::parse(&code).map_err(|e| StorageError::Corrupt(e.to_string()))
}

pub(crate) fn decimal(text: &str) -> Result<Decimal, StorageError> {
    Decimal::from_str(text).map_err(|e| StorageError::Corrupt(format!("rate '{text}': {e}")))
}
