use async_trait::async_trait;
use auszug_core::{Currency, FxRate};
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration as StdDuration;
use thiserror::Error;
use tracing::debug;

pub const ECB_SOURCE: &str = "ECB";
pub const DEFAULT_ECB_BASE_URL: &str = "https://data-api.ecb.europa.eu/service/data";

#[derive(Debug, Error)]
pub enum RateSourceError {
    #[error("rate request failed: {0}")]
    Transport(String),
    #[error("rate source responded with status {0}")]
    Status(u16),
    #[error("unreadable rate response: {0}")]
    Format(String),
}

/// External publisher of EUR-anchored reference rates.
#[async_trait]
pub trait RateSource: Send + Sync {
    fn name(&self) -> &str;

    /// All EUR→`quote` rates published within `[from, to]`.
    async fn fetch(
        &self,
        quote: Currency,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<FxRate>, RateSourceError>;
}

/// ECB daily reference rates (`EXR/D.<CCY>.EUR.SP00.A`) in CSV form.
pub struct EcbRateSource {
    client: reqwest::Client,
    base_url: String,
}

impl EcbRateSource {
    pub fn new(base_url: impl Into<String>, timeout: StdDuration) -> Result<Self, RateSourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RateSourceError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn series_url(&self, quote: Currency) -> String {
        format!(
            "{}/EXR/D.{}.EUR.SP00.A",
            self.base_url.trim_end_matches('/'),
            quote
        )
    }
}

#[async_trait]
impl RateSource for EcbRateSource {
    fn name(&self) -> &str {
        ECB_SOURCE
    }

    async fn fetch(
        &self,
        quote: Currency,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<FxRate>, RateSourceError> {
        let resp = self
            .client
            .get(self.series_url(quote))
            .query(&[
                ("startPeriod", from.format("%Y-%m-%d").to_string()),
                ("endPeriod", to.format("%Y-%m-%d").to_string()),
                ("format", "csvdata".to_string()),
            ])
            .send()
            .await
            .map_err(|e| RateSourceError::Transport(e.to_string()))?;

        let status = resp.status();
        // The ECB answers 404 for a window without observations.
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(RateSourceError::Status(status.as_u16()));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| RateSourceError::Transport(e.to_string()))?;
        let rates = parse_ecb_csv(&body, quote)?;
        debug!(%quote, %from, %to, count = rates.len(), "fetched ECB rates");
        Ok(rates)
    }
}

/// Reads `TIME_PERIOD`/`OBS_VALUE` pairs from an ECB `csvdata` body. Rows
/// without a usable observation are ignored.
pub fn parse_ecb_csv(body: &str, quote: Currency) -> Result<Vec<FxRate>, RateSourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| RateSourceError::Format(e.to_string()))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| RateSourceError::Format(format!("missing column {name}")))
    };
    let period_col = column("TIME_PERIOD")?;
    let value_col = column("OBS_VALUE")?;

    let mut rates = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| RateSourceError::Format(e.to_string()))?;
        let (Some(period), Some(value)) = (record.get(period_col), record.get(value_col)) else {
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(period, "%Y-%m-%d") else {
            continue;
        };
        let Ok(rate) = Decimal::from_str(value) else {
            continue;
        };
        if let Ok(fx) = FxRate::eur(date, quote, rate, ECB_SOURCE) {
            rates.push(fx);
        }
    }
    Ok(rates)
}

/// Days fetched when lookups are configured to scan without limit.
const UNBOUNDED_FETCH_DAYS: u32 = 7;

/// Window the resolver asks a source for: `lookback_days` back from `date`.
pub fn fetch_window(date: NaiveDate, lookback_days: u32) -> (NaiveDate, NaiveDate) {
    let days = match lookback_days {
        0 => UNBOUNDED_FETCH_DAYS,
        days => days,
    };
    let from = date
        .checked_sub_signed(Duration::days(i64::from(days)))
        .unwrap_or(NaiveDate::MIN);
    (from, date)
}
