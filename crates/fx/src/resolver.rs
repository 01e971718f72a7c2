use auszug_core::{round_half_up, Currency, DraftTransaction, FxConversion, FxDateSource, FxRate};
use chrono::{Duration, NaiveDate};
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::source::{fetch_window, RateSource, DEFAULT_ECB_BASE_URL};
use crate::store::{RateStore, RateStoreError};

#[derive(Debug, Error)]
pub enum FxError {
    #[error("no {from}→{to} rate on or before {valuta} or {booking}")]
    Unresolved {
        from: Currency,
        to: Currency,
        valuta: NaiveDate,
        booking: NaiveDate,
    },
    #[error("conversion of {amount_minor} {from} overflows")]
    Overflow { amount_minor: i64, from: Currency },
    #[error(transparent)]
    Store(#[from] RateStoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FxConfig {
    /// How far back a lookup may scan for the last published rate. `0` scans
    /// without limit, so a manually stored rate stays usable indefinitely.
    pub lookback_days: u32,
    /// Concurrent per-transaction conversions.
    pub fan_out: usize,
    pub fetch_on_miss: bool,
    pub ecb_base_url: String,
    pub fetch_timeout_secs: u64,
}

impl Default for FxConfig {
    fn default() -> Self {
        Self {
            lookback_days: 7,
            fan_out: 8,
            fetch_on_miss: true,
            ecb_base_url: DEFAULT_ECB_BASE_URL.to_string(),
            fetch_timeout_secs: 10,
        }
    }
}

// ── Pure derivation ───────────────────────────────────────────────────────────

/// How a pair relates to the EUR anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pair {
    Same,
    /// EUR→X: the table row as stored.
    FromEur { to: Currency },
    /// X→EUR: inverse of the EUR→X row.
    ToEur { from: Currency },
    /// X→Y: (EUR→Y) / (EUR→X).
    Cross { from: Currency, to: Currency },
}

impl Pair {
    pub fn classify(from: Currency, to: Currency) -> Self {
        match (from == to, from.is_eur(), to.is_eur()) {
            (true, _, _) => Pair::Same,
            (false, true, _) => Pair::FromEur { to },
            (false, _, true) => Pair::ToEur { from },
            (false, false, false) => Pair::Cross { from, to },
        }
    }

    /// Table rows (quote currencies) the pair needs.
    pub fn legs(&self) -> Vec<Currency> {
        match *self {
            Pair::Same => vec![],
            Pair::FromEur { to } => vec![to],
            Pair::ToEur { from } => vec![from],
            Pair::Cross { from, to } => vec![from, to],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedRate {
    pub rate: Decimal,
    /// Date of the least fresh table row involved.
    pub date: NaiveDate,
}

/// Effective from→to multiplier out of EUR-anchored rows. `from_leg` is the
/// EUR→from row, `to_leg` the EUR→to row; `None` if a needed row is missing.
pub fn derive_rate(
    pair: Pair,
    from_leg: Option<&FxRate>,
    to_leg: Option<&FxRate>,
    date: NaiveDate,
) -> Option<DerivedRate> {
    match pair {
        Pair::Same => Some(DerivedRate {
            rate: Decimal::ONE,
            date,
        }),
        Pair::FromEur { .. } => to_leg.map(|to| DerivedRate {
            rate: to.rate,
            date: to.date,
        }),
        Pair::ToEur { .. } => from_leg.and_then(|from| {
            Some(DerivedRate {
                rate: Decimal::ONE.checked_div(from.rate)?,
                date: from.date,
            })
        }),
        Pair::Cross { .. } => {
            let (from, to) = (from_leg?, to_leg?);
            Some(DerivedRate {
                rate: to.rate.checked_div(from.rate)?,
                date: from.date.min(to.date),
            })
        }
    }
}

/// `round_half_up(amount_minor × rate)`.
pub fn apply_rate(amount_minor: i64, rate: Decimal) -> Option<i64> {
    round_half_up(Decimal::from(amount_minor).checked_mul(rate)?)
}

// ── Resolver ──────────────────────────────────────────────────────────────────

pub struct FxResolver {
    store: Arc<dyn RateStore>,
    source: Option<Arc<dyn RateSource>>,
    config: FxConfig,
}

impl FxResolver {
    pub fn new(store: Arc<dyn RateStore>, config: FxConfig) -> Self {
        Self {
            store,
            source: None,
            config,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn RateSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub async fn convert(
        &self,
        amount_minor: i64,
        from: Currency,
        to: Currency,
        valuta: NaiveDate,
        booking: NaiveDate,
    ) -> Result<FxConversion, FxError> {
        let pair = Pair::classify(from, to);
        let mut candidates = vec![(valuta, FxDateSource::Valuta)];
        if booking != valuta {
            candidates.push((booking, FxDateSource::BookingFallback));
        }

        let mut fetched = false;
        loop {
            for &(date, date_source) in &candidates {
                if let Some(derived) = self.lookup(pair, date).await? {
                    let converted_minor = apply_rate(amount_minor, derived.rate)
                        .ok_or(FxError::Overflow { amount_minor, from })?;
                    return Ok(FxConversion {
                        converted_minor,
                        rate: derived.rate,
                        rate_date: derived.date,
                        date_source,
                    });
                }
            }

            if fetched || !self.config.fetch_on_miss || self.source.is_none() {
                break;
            }
            fetched = true;
            for &(date, _) in &candidates {
                self.fetch_missing(pair, date).await?;
            }
        }

        Err(FxError::Unresolved {
            from,
            to,
            valuta,
            booking,
        })
    }

    /// Converts each transaction into `report_currency`, at most `fan_out`
    /// at a time. Results are in input order.
    pub async fn convert_all(
        &self,
        transactions: &[DraftTransaction],
        report_currency: Currency,
    ) -> Vec<Result<FxConversion, FxError>> {
        stream::iter(transactions)
            .map(|tx| {
                self.convert(
                    tx.amount_minor,
                    tx.account_currency,
                    report_currency,
                    tx.valuta_date,
                    tx.booking_date,
                )
            })
            .buffered(self.config.fan_out.max(1))
            .collect()
            .await
    }

    fn window_start(&self, date: NaiveDate) -> NaiveDate {
        match self.config.lookback_days {
            0 => NaiveDate::MIN,
            days => date
                .checked_sub_signed(Duration::days(i64::from(days)))
                .unwrap_or(NaiveDate::MIN),
        }
    }

    async fn leg(&self, quote: Currency, date: NaiveDate) -> Result<Option<FxRate>, FxError> {
        Ok(self
            .store
            .latest_on_or_before(quote, date, self.window_start(date))
            .await?)
    }

    async fn lookup(&self, pair: Pair, date: NaiveDate) -> Result<Option<DerivedRate>, FxError> {
        let (from_leg, to_leg) = match pair {
            Pair::Same => (None, None),
            Pair::FromEur { to } => (None, self.leg(to, date).await?),
            Pair::ToEur { from } => (self.leg(from, date).await?, None),
            Pair::Cross { from, to } => (self.leg(from, date).await?, self.leg(to, date).await?),
        };
        Ok(derive_rate(pair, from_leg.as_ref(), to_leg.as_ref(), date))
    }

    /// Asks the external source for legs the store cannot answer at `date`
    /// and upserts what it returns. Source failures are logged, not raised.
    async fn fetch_missing(&self, pair: Pair, date: NaiveDate) -> Result<(), FxError> {
        let Some(source) = &self.source else {
            return Ok(());
        };
        for quote in pair.legs() {
            if self.leg(quote, date).await?.is_some() {
                continue;
            }
            let (from, to) = fetch_window(date, self.config.lookback_days);
            match source.fetch(quote, from, to).await {
                Ok(rates) => {
                    debug!(
                        %quote,
                        %date,
                        count = rates.len(),
                        source = source.name(),
                        "storing fetched rates"
                    );
                    for rate in rates {
                        self.store.upsert(rate).await?;
                    }
                }
                Err(e) => warn!(%quote, %date, "rate fetch failed: {e}"),
            }
        }
        Ok(())
    }
}
