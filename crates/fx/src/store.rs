use async_trait::async_trait;
use auszug_core::{Currency, FxRate};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RateStoreError {
    #[error("rate store backend error: {0}")]
    Backend(String),
}

/// EUR-anchored rate table: point lookup and idempotent upsert.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Most recent EUR→`quote` rate dated within `[not_before, date]`.
    async fn latest_on_or_before(
        &self,
        quote: Currency,
        date: NaiveDate,
        not_before: NaiveDate,
    ) -> Result<Option<FxRate>, RateStoreError>;

    /// Inserts or replaces the rate for `(date, EUR, quote)`; last write wins.
    async fn upsert(&self, rate: FxRate) -> Result<(), RateStoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryRateStore {
    rates: RwLock<BTreeMap<(Currency, NaiveDate), FxRate>>,
}

impl MemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rates(rates: impl IntoIterator<Item = FxRate>) -> Self {
        let map = rates
            .into_iter()
            .map(|r| ((r.quote, r.date), r))
            .collect();
        Self {
            rates: RwLock::new(map),
        }
    }

    pub fn len(&self) -> usize {
        self.rates.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RateStore for MemoryRateStore {
    async fn latest_on_or_before(
        &self,
        quote: Currency,
        date: NaiveDate,
        not_before: NaiveDate,
    ) -> Result<Option<FxRate>, RateStoreError> {
        if not_before > date {
            return Ok(None);
        }
        let rates = self
            .rates
            .read()
            .map_err(|e| RateStoreError::Backend(e.to_string()))?;
        Ok(rates
            .range((quote, not_before)..=(quote, date))
            .next_back()
            .map(|(_, r)| r.clone()))
    }

    async fn upsert(&self, rate: FxRate) -> Result<(), RateStoreError> {
        let mut rates = self
            .rates
            .write()
            .map_err(|e| RateStoreError::Backend(e.to_string()))?;
        rates.insert((rate.quote, rate.date), rate);
        Ok(())
    }
}
