use anyhow::{bail, Context, Result};
use auszug_core::{Currency, FxRate};
use auszug_fx::{fetch_window, EcbRateSource, FxConfig, FxResolver, RateSource, RateStore};
use auszug_import::{Categorizer, KeywordRules, OpenAiProvider};
use auszug_ingest::{default_extractor, IngestConfig, Ingestor};
use auszug_storage::{load_category_vocabulary, SqliteStore};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const MANUAL_SOURCE: &str = "manual";

/// Where the config file and the database live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config: PathBuf,
    pub db: PathBuf,
}

impl Paths {
    /// Flags win; anything not given falls back to the per-user data directory.
    pub fn resolve(config: Option<PathBuf>, db: Option<PathBuf>) -> Result<Self> {
        if let (Some(config), Some(db)) = (&config, &db) {
            return Ok(Paths {
                config: config.clone(),
                db: db.clone(),
            });
        }

        let project_dirs = directories::ProjectDirs::from("de", "auszug", "auszug")
            .context("cannot determine a data directory for this user")?;
        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("cannot create {}", data_dir.display()))?;

        Ok(Paths {
            config: config.unwrap_or_else(|| data_dir.join("config.toml")),
            db: db.unwrap_or_else(|| data_dir.join("auszug.db")),
        })
    }
}

pub fn load_config(path: &Path, api_key: Option<String>) -> Result<IngestConfig> {
    let mut config = IngestConfig::load(path)
        .with_context(|| format!("loading config {}", path.display()))?;
    if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
        config.ai.api_key = Some(key);
    }
    Ok(config)
}

pub fn load_rules(config: &IngestConfig) -> Result<KeywordRules> {
    let Some(path) = &config.keyword_rules_file else {
        return Ok(KeywordRules::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading keyword rules {}", path.display()))?;
    KeywordRules::from_toml(&content)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("parsing keyword rules {}", path.display()))
}

pub fn build_categorizer(config: &IngestConfig, rules: KeywordRules) -> Categorizer {
    let categorizer = Categorizer::new(rules)
        .with_chunk_size(config.ai.chunk_size)
        .with_timeout(Duration::from_secs(config.ai.timeout_secs));

    match OpenAiProvider::from_config(config.ai.clone()) {
        Some(provider) => {
            info!(
                model = %config.ai.model,
                prompt_version = provider.prompt_version(),
                "AI categorization enabled"
            );
            categorizer.with_provider(Arc::new(provider))
        }
        None => {
            info!("No API key configured, categorizing with keyword rules only");
            categorizer
        }
    }
}

pub fn ecb_source(config: &FxConfig) -> Result<EcbRateSource> {
    EcbRateSource::new(
        config.ecb_base_url.clone(),
        Duration::from_secs(config.fetch_timeout_secs),
    )
    .context("building ECB client")
}

pub fn build_resolver(config: &FxConfig, store: Arc<dyn RateStore>) -> Result<FxResolver> {
    let resolver = FxResolver::new(store, config.clone());
    if !config.fetch_on_miss {
        return Ok(resolver);
    }
    Ok(resolver.with_source(Arc::new(ecb_source(config)?)))
}

pub async fn build_ingestor(config: IngestConfig, store: &SqliteStore) -> Result<Ingestor> {
    let rules = load_rules(&config)?;
    let categorizer = build_categorizer(&config, rules);
    let fx = build_resolver(&config.fx, Arc::new(store.clone()))?;
    let vocabulary = load_category_vocabulary(store.pool())
        .await
        .context("loading categories")?;

    Ok(Ingestor::new(
        config,
        Arc::new(store.clone()),
        fx,
        categorizer,
        default_extractor(),
    )
    .with_vocabulary(vocabulary))
}

/// Runs one statement through the pipeline and renders the outcome as JSON.
/// A dry run stops before anything is written.
pub async fn ingest(
    ingestor: &Ingestor,
    file: &Path,
    report_currency: Option<Currency>,
    dry_run: bool,
) -> Result<String> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let report_currency =
        report_currency.unwrap_or(ingestor.config().default_report_currency);

    let json = if dry_run {
        let prepared = ingestor
            .prepare(&bytes, filename, report_currency)
            .await
            .with_context(|| format!("importing {}", file.display()))?;
        serde_json::to_string_pretty(&prepared)?
    } else {
        let outcome = ingestor
            .ingest(&bytes, filename, report_currency)
            .await
            .with_context(|| format!("importing {}", file.display()))?;
        serde_json::to_string_pretty(&outcome)?
    };
    Ok(json)
}

pub async fn set_rate(
    store: &dyn RateStore,
    date: NaiveDate,
    quote: Currency,
    rate: Decimal,
) -> Result<FxRate> {
    let rate = FxRate::eur(date, quote, rate, MANUAL_SOURCE)?;
    store.upsert(rate.clone()).await?;
    info!(%date, %quote, rate = %rate.rate, "Stored manual rate");
    Ok(rate)
}

/// Fetches the lookback window ending at `date` and stores every rate in it.
pub async fn fetch_rates(
    source: &dyn RateSource,
    store: &dyn RateStore,
    date: NaiveDate,
    quote: Currency,
    lookback_days: u32,
) -> Result<Vec<FxRate>> {
    if quote.is_eur() {
        bail!("EUR is the anchor currency, there are no EUR→EUR rates to fetch");
    }
    let (from, to) = fetch_window(date, lookback_days);
    let rates = source
        .fetch(quote, from, to)
        .await
        .with_context(|| format!("fetching {quote} rates from {}", source.name()))?;
    for rate in &rates {
        store.upsert(rate.clone()).await?;
    }
    info!(%quote, %from, %to, count = rates.len(), "Stored fetched rates");
    Ok(rates)
}
