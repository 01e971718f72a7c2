use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::currency::Currency;

/// One row of the EUR-anchored rate table: 1 EUR = `rate` × `quote`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxRate {
    pub date: NaiveDate,
    pub base: Currency,
    pub quote: Currency,
    pub rate: Decimal,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FxRateError {
    #[error("Rate must be positive, got {0}")]
    NonPositive(Decimal),
    #[error("EUR→EUR is not a table row")]
    EurQuote,
}

impl FxRate {
    pub fn eur(
        date: NaiveDate,
        quote: Currency,
        rate: Decimal,
        source: impl Into<String>,
    ) -> Result<Self, FxRateError> {
        if rate <= Decimal::ZERO {
            return Err(FxRateError::NonPositive(rate));
        }
        if quote.is_eur() {
            return Err(FxRateError::EurQuote);
        }
        Ok(FxRate {
            date,
            base: Currency::EUR,
            quote,
            rate,
            source: source.into(),
        })
    }
}

/// Which transaction date the applied rate was resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FxDateSource {
    Valuta,
    BookingFallback,
}

impl fmt::Display for FxDateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FxDateSource::Valuta => write!(f, "VALUTA"),
            FxDateSource::BookingFallback => write!(f, "BOOKING_FALLBACK"),
        }
    }
}

impl std::str::FromStr for FxDateSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VALUTA" => Ok(FxDateSource::Valuta),
            "BOOKING_FALLBACK" => Ok(FxDateSource::BookingFallback),
            other => Err(format!("Unknown FX date source: '{other}'")),
        }
    }
}

/// The outcome of converting one amount into the report currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxConversion {
    pub converted_minor: i64,
    pub rate: Decimal,
    pub rate_date: NaiveDate,
    pub date_source: FxDateSource,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 12, 1).unwrap()
    }

    #[test]
    fn eur_rate_validates() {
        let r = FxRate::eur(date(), Currency::USD, Decimal::new(11, 1), "ECB").unwrap();
        assert_eq!(r.base, Currency::EUR);
        assert!(matches!(
            FxRate::eur(date(), Currency::USD, Decimal::ZERO, "ECB"),
            Err(FxRateError::NonPositive(_))
        ));
        assert!(matches!(
            FxRate::eur(date(), Currency::EUR, Decimal::ONE, "ECB"),
            Err(FxRateError::EurQuote)
        ));
    }

    #[test]
    fn date_source_roundtrip() {
        for src in [FxDateSource::Valuta, FxDateSource::BookingFallback] {
            assert_eq!(FxDateSource::from_str(&src.to_string()).unwrap(), src);
        }
        assert_eq!(
            serde_json::to_string(&FxDateSource::BookingFallback).unwrap(),
            "\"BOOKING_FALLBACK\""
        );
    }
}
