use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::category::CategorizationResult;
use crate::currency::Currency;
use crate::fx::FxConversion;

/// Positional trace back into the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SourceRef {
    /// 1-based line number of a CSV record.
    Row(u64),
    /// 0-based index of a normalized PDF text line.
    Line(usize),
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Row(n) => write!(f, "row:{n}"),
            SourceRef::Line(n) => write!(f, "line:{n}"),
        }
    }
}

impl From<SourceRef> for String {
    fn from(value: SourceRef) -> Self {
        value.to_string()
    }
}

impl std::str::FromStr for SourceRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("Invalid source reference: '{s}'");
        match s.split_once(':') {
            Some(("row", n)) => n.parse().map(SourceRef::Row).map_err(|_| invalid()),
            Some(("line", n)) => n.parse().map(SourceRef::Line).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for SourceRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A transaction as read from a statement, before conversion and
/// categorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftTransaction {
    pub booking_date: NaiveDate,
    pub valuta_date: NaiveDate,
    /// Signed, in the account currency.
    pub amount_minor: i64,
    pub account_currency: Currency,
    pub description_raw: String,
    pub external_id: Option<String>,
    pub source_ref: SourceRef,
}

impl DraftTransaction {
    pub fn new(
        booking_date: NaiveDate,
        amount_minor: i64,
        account_currency: Currency,
        description_raw: impl Into<String>,
        source_ref: SourceRef,
    ) -> Self {
        DraftTransaction {
            booking_date,
            valuta_date: booking_date,
            amount_minor,
            account_currency,
            description_raw: description_raw.into(),
            external_id: None,
            source_ref,
        }
    }

    pub fn with_valuta(mut self, valuta_date: NaiveDate) -> Self {
        self.valuta_date = valuta_date;
        self
    }

    pub fn with_external_id(mut self, external_id: Option<String>) -> Self {
        self.external_id = external_id.filter(|s| !s.trim().is_empty());
        self
    }
}

/// A fully resolved record handed to the persistence boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedTransaction {
    pub draft: DraftTransaction,
    pub report_currency: Currency,
    /// `None` when no rate could be resolved; such records need manual
    /// reconciliation.
    pub conversion: Option<FxConversion>,
    pub suggestion: CategorizationResult,
}

impl ResolvedTransaction {
    pub fn converted_minor(&self) -> Option<i64> {
        self.conversion.as_ref().map(|c| c.converted_minor)
    }

    pub fn needs_fx_reconciliation(&self) -> bool {
        self.conversion.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::SuggestionSource;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn valuta_defaults_to_booking() {
        let tx = DraftTransaction::new(
            date(2025, 11, 3),
            -1990,
            Currency::EUR,
            "REWE",
            SourceRef::Row(2),
        );
        assert_eq!(tx.valuta_date, tx.booking_date);
        let tx = tx.with_valuta(date(2025, 11, 4));
        assert_eq!(tx.valuta_date, date(2025, 11, 4));
    }

    #[test]
    fn blank_external_id_is_dropped() {
        let tx =
            DraftTransaction::new(date(2025, 11, 3), 100, Currency::EUR, "x", SourceRef::Line(0))
                .with_external_id(Some("  ".to_string()));
        assert_eq!(tx.external_id, None);
    }

    #[test]
    fn source_ref_display() {
        assert_eq!(SourceRef::Row(3).to_string(), "row:3");
        assert_eq!(SourceRef::Line(12).to_string(), "line:12");
        assert_eq!("line:12".parse::<SourceRef>().unwrap(), SourceRef::Line(12));
        assert!("page:1".parse::<SourceRef>().is_err());
    }

    #[test]
    fn unconverted_record_needs_reconciliation() {
        let draft =
            DraftTransaction::new(date(2025, 11, 3), 100, Currency::USD, "x", SourceRef::Row(2));
        let record = ResolvedTransaction {
            draft,
            report_currency: Currency::EUR,
            conversion: None,
            suggestion: CategorizationResult::new(
                0,
                "uncategorized",
                "X",
                0.3,
                SuggestionSource::Rules,
            ),
        };
        assert!(record.needs_fx_reconciliation());
        assert_eq!(record.converted_minor(), None);
    }
}
