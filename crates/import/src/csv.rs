use auszug_core::{Currency, DraftTransaction, SourceRef};
use csv::StringRecord;
use thiserror::Error;
use tracing::debug;

use crate::util::{parse_amount, parse_date};
use crate::ParsedStatement;

/// A column meaning the parser knows how to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concept {
    ValutaDate,
    Reference,
    Currency,
    Amount,
    BookingDate,
    Description,
}

/// Concepts in resolution order with their header tokens, strongest first.
/// A header cell is claimed by the first concept/token pair it contains
/// (lower-cased substring match); `Description` may claim several columns.
pub const HEADER_CONCEPTS: &[(Concept, &[&str])] = &[
    (Concept::ValutaDate, &["valuta", "wertstellung", "value date"]),
    (
        Concept::Reference,
        &["referenz", "reference", "transaktions-id", "umsatz-id", "transaction id"],
    ),
    // "hrung" survives any mangling of the umlaut in "Währung".
    (Concept::Currency, &["hrung", "currency"]),
    (Concept::Amount, &["betrag", "amount", "umsatz"]),
    (
        Concept::BookingDate,
        &["buchungstag", "buchungsdatum", "booking date", "booking", "datum", "date"],
    ),
    (
        Concept::Description,
        &[
            "buchungstext",
            "verwendungszweck",
            "zweck",
            "description",
            "text",
            "empf",
            "auftraggeber",
            "beg\u{fc}nstigter",
            "beguenstigter",
            "payee",
            "counterparty",
        ],
    ),
];

/// Column positions used when the first row is data, and for any of these
/// concepts a recognized header leaves unmapped.
const POSITIONAL_BOOKING: usize = 0;
const POSITIONAL_AMOUNT: usize = 1;
const POSITIONAL_CURRENCY: usize = 2;
const POSITIONAL_DESCRIPTION: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnLayout {
    pub booking_date: Option<usize>,
    pub valuta_date: Option<usize>,
    pub amount: Option<usize>,
    pub currency: Option<usize>,
    pub description: Vec<usize>,
    pub reference: Option<usize>,
}

impl ColumnLayout {
    pub fn positional() -> Self {
        Self {
            booking_date: Some(POSITIONAL_BOOKING),
            valuta_date: None,
            amount: Some(POSITIONAL_AMOUNT),
            currency: Some(POSITIONAL_CURRENCY),
            description: vec![POSITIONAL_DESCRIPTION],
            reference: None,
        }
    }

    /// Maps header cells through `HEADER_CONCEPTS`. `None` if nothing matched.
    /// Booking date, amount, currency and description fall back to their
    /// positional column when the header names none and no other concept
    /// claimed that column.
    pub fn from_header(cells: &[String]) -> Option<Self> {
        let lowered: Vec<String> = cells.iter().map(|c| c.trim().to_lowercase()).collect();
        let mut taken = vec![false; lowered.len()];
        let mut layout = ColumnLayout::default();
        let mut matched = false;

        for (concept, tokens) in HEADER_CONCEPTS {
            if *concept == Concept::Description {
                for (idx, cell) in lowered.iter().enumerate() {
                    if !taken[idx] && tokens.iter().any(|t| cell.contains(t)) {
                        taken[idx] = true;
                        layout.description.push(idx);
                        matched = true;
                    }
                }
                continue;
            }

            let found = tokens.iter().find_map(|token| {
                lowered
                    .iter()
                    .enumerate()
                    .position(|(idx, cell)| !taken[idx] && cell.contains(token))
            });
            if let Some(idx) = found {
                taken[idx] = true;
                matched = true;
                match concept {
                    Concept::ValutaDate => layout.valuta_date = Some(idx),
                    Concept::Reference => layout.reference = Some(idx),
                    Concept::Currency => layout.currency = Some(idx),
                    Concept::Amount => layout.amount = Some(idx),
                    Concept::BookingDate => layout.booking_date = Some(idx),
                    Concept::Description => {}
                }
            }
        }

        if !matched {
            return None;
        }
        if layout.booking_date.is_none() {
            layout.booking_date = claim(&mut taken, POSITIONAL_BOOKING);
        }
        if layout.amount.is_none() {
            layout.amount = claim(&mut taken, POSITIONAL_AMOUNT);
        }
        if layout.currency.is_none() {
            layout.currency = claim(&mut taken, POSITIONAL_CURRENCY);
        }
        if layout.description.is_empty() {
            layout.description.extend(claim(&mut taken, POSITIONAL_DESCRIPTION));
        }
        Some(layout)
    }
}

fn claim(taken: &mut [bool], idx: usize) -> Option<usize> {
    let slot = taken.get_mut(idx).filter(|t| !**t)?;
    *slot = true;
    Some(idx)
}

#[derive(Debug, Error)]
enum RowError {
    #[error("missing booking date column")]
    MissingDate,
    #[error("invalid booking date '{0}'")]
    InvalidDate(String),
    #[error("missing amount column")]
    MissingAmount,
    #[error("invalid amount '{0}'")]
    InvalidAmount(String),
    #[error("invalid currency '{0}'")]
    InvalidCurrency(String),
    #[error("malformed record: {0}")]
    Malformed(#[from] csv::Error),
}

/// Semicolon-delimited bank export parser.
#[derive(Debug, Clone)]
pub struct CsvStatementParser {
    home_currency: Currency,
}

impl CsvStatementParser {
    pub fn new(home_currency: Currency) -> Self {
        Self { home_currency }
    }

    pub fn parse(&self, text: &str) -> ParsedStatement {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut layout: Option<ColumnLayout> = None;
        let mut transactions = Vec::new();
        let mut skipped = 0usize;

        for result in reader.records() {
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    debug!("skipping CSV record: {}", RowError::from(e));
                    skipped += 1;
                    continue;
                }
            };
            if record.iter().all(str::is_empty) {
                continue;
            }

            let layout = match &layout {
                Some(l) => l,
                None => {
                    let cells: Vec<String> = record.iter().map(str::to_string).collect();
                    let first_row_is_data = cells.iter().any(|c| parse_date(c).is_some());
                    let detected = if first_row_is_data {
                        ColumnLayout::positional()
                    } else {
                        ColumnLayout::from_header(&cells).unwrap_or_else(ColumnLayout::positional)
                    };
                    debug!(?detected, first_row_is_data, "CSV column layout");
                    let l = layout.insert(detected);
                    if !first_row_is_data {
                        continue;
                    }
                    l
                }
            };

            let line = record.position().map(|p| p.line()).unwrap_or(0);
            match self.parse_row(&record, layout, line) {
                Ok(tx) => transactions.push(tx),
                Err(e) => {
                    debug!(line, "skipping CSV row: {e}");
                    skipped += 1;
                }
            }
        }

        ParsedStatement {
            transactions,
            skipped,
            text: text.to_string(),
        }
    }

    fn parse_row(
        &self,
        record: &StringRecord,
        layout: &ColumnLayout,
        line: u64,
    ) -> Result<DraftTransaction, RowError> {
        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or_default();

        let booking_raw = layout
            .booking_date
            .and_then(|i| record.get(i))
            .ok_or(RowError::MissingDate)?;
        let booking_date =
            parse_date(booking_raw).ok_or_else(|| RowError::InvalidDate(booking_raw.to_string()))?;
        let valuta_date = parse_date(cell(layout.valuta_date)).unwrap_or(booking_date);

        let amount_raw = layout
            .amount
            .and_then(|i| record.get(i))
            .ok_or(RowError::MissingAmount)?;
        let amount_minor = parse_amount(amount_raw)
            .ok_or_else(|| RowError::InvalidAmount(amount_raw.to_string()))?;

        let currency_raw = cell(layout.currency);
        let currency = if currency_raw.is_empty() {
            self.home_currency
        } else {
            Currency::parse(currency_raw)
                .map_err(|_| RowError::InvalidCurrency(currency_raw.to_string()))?
        };

        let description = layout
            .description
            .iter()
            .filter_map(|&i| record.get(i))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" | ");

        let external_id = layout
            .reference
            .and_then(|i| record.get(i))
            .map(str::to_string);

        Ok(DraftTransaction::new(
            booking_date,
            amount_minor,
            currency,
            description,
            SourceRef::Row(line),
        )
        .with_valuta(valuta_date)
        .with_external_id(external_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn parser() -> CsvStatementParser {
        CsvStatementParser::new(Currency::EUR)
    }

    fn cells(line: &str) -> Vec<String> {
        line.split(';').map(str::to_string).collect()
    }

    // ── header mapping ───────────────────────────────────────────────────────

    #[test]
    fn commerzbank_header_layout() {
        let layout = ColumnLayout::from_header(&cells(
            "Buchungstag;Wertstellung;Umsatzart;Buchungstext;Betrag;Währung;IBAN Kontoinhaber;Kategorie",
        ))
        .unwrap();
        assert_eq!(layout.booking_date, Some(0));
        assert_eq!(layout.valuta_date, Some(1));
        assert_eq!(layout.amount, Some(4)); // "Betrag" outranks "Umsatzart"
        assert_eq!(layout.currency, Some(5));
        assert_eq!(layout.description, vec![3]);
    }

    #[test]
    fn english_header_layout() {
        let layout = ColumnLayout::from_header(&cells(
            "Booking Date;Value Date;Amount;Currency;Description;Reference",
        ))
        .unwrap();
        assert_eq!(layout.booking_date, Some(0));
        assert_eq!(layout.valuta_date, Some(1));
        assert_eq!(layout.amount, Some(2));
        assert_eq!(layout.currency, Some(3));
        assert_eq!(layout.description, vec![4]);
        assert_eq!(layout.reference, Some(5));
    }

    #[test]
    fn mangled_encoding_still_maps_currency() {
        let layout = ColumnLayout::from_header(&cells("Buchungstag;Betrag;WÃ¤hrung")).unwrap();
        assert_eq!(layout.currency, Some(2));
    }

    #[test]
    fn several_description_columns_are_collected() {
        let layout = ColumnLayout::from_header(&cells(
            "Buchungstag;Betrag;Buchungstext;Verwendungszweck;Empfänger",
        ))
        .unwrap();
        assert_eq!(layout.description, vec![2, 3, 4]);
    }

    #[test]
    fn unmapped_slots_take_free_positional_columns() {
        let layout = ColumnLayout::from_header(&cells("Tag;Betrag;Währung;Beschreibung")).unwrap();
        assert_eq!(layout.booking_date, Some(0));
        assert_eq!(layout.amount, Some(1));
        assert_eq!(layout.currency, Some(2));
        assert_eq!(layout.description, vec![3]);
    }

    #[test]
    fn positional_column_already_claimed_stays_unmapped() {
        let layout =
            ColumnLayout::from_header(&cells("Buchungstag;Betrag;Verwendungszweck")).unwrap();
        assert_eq!(layout.currency, None);
        assert_eq!(layout.description, vec![2]);
    }

    #[test]
    fn unknown_header_is_none() {
        assert!(ColumnLayout::from_header(&cells("foo;bar;baz")).is_none());
    }

    // ── full parses ──────────────────────────────────────────────────────────

    #[test]
    fn parses_rows_with_header() {
        let text = "Buchungstag;Valutadatum;Betrag;Währung;Verwendungszweck\n\
                    28.11.2025;29.11.2025;-19,90;EUR;REWE SAGT DANKE\n\
                    27.11.2025;;1.234,56;eur;GEHALT NOVEMBER\n";
        let parsed = parser().parse(text);
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.transactions.len(), 2);

        let first = &parsed.transactions[0];
        assert_eq!(first.booking_date, date(2025, 11, 28));
        assert_eq!(first.valuta_date, date(2025, 11, 29));
        assert_eq!(first.amount_minor, -1990);
        assert_eq!(first.account_currency, Currency::EUR);
        assert_eq!(first.description_raw, "REWE SAGT DANKE");
        assert_eq!(first.source_ref, SourceRef::Row(2));

        let second = &parsed.transactions[1];
        assert_eq!(second.valuta_date, second.booking_date);
        assert_eq!(second.amount_minor, 123456);
    }

    #[test]
    fn unparseable_rows_are_counted_not_fatal() {
        let text = "Buchungstag;Betrag;Währung;Text\n\
                    28.11.2025;-5,00;EUR;ok\n\
                    kein datum;-5,00;EUR;bad date\n\
                    28.11.2025;viel;EUR;bad amount\n\
                    28.11.2025;-5,00;€€€;bad currency\n\
                    27.11.2025;10,00;;home currency\n";
        let parsed = parser().parse(text);
        assert_eq!(parsed.transactions.len(), 2);
        assert_eq!(parsed.skipped, 3);
        assert_eq!(parsed.transactions[1].account_currency, Currency::EUR);
    }

    #[test]
    fn header_only_yields_nothing() {
        let parsed = parser().parse("Buchungstag;Valutadatum;Betrag;Währung;Verwendungszweck\n");
        assert!(parsed.transactions.is_empty());
        assert_eq!(parsed.skipped, 0);
    }

    #[test]
    fn empty_input_yields_nothing() {
        let parsed = parser().parse("");
        assert!(parsed.transactions.is_empty());
    }

    #[test]
    fn positional_fallback_without_header() {
        let text = "28.11.2025;-19,90;USD;Coffee\n29.11.2025;5,00;USD;Refund\n";
        let parsed = parser().parse(text);
        assert_eq!(parsed.transactions.len(), 2);
        assert_eq!(parsed.transactions[0].account_currency, Currency::USD);
        assert_eq!(parsed.transactions[0].description_raw, "Coffee");
        assert_eq!(parsed.transactions[0].source_ref, SourceRef::Row(1));
    }

    #[test]
    fn unrecognized_header_is_skipped_and_positions_used() {
        let text = "a;b;c;d\n2025-11-28;-1,00;EUR;X\n";
        let parsed = parser().parse(text);
        assert_eq!(parsed.transactions.len(), 1);
        assert_eq!(parsed.transactions[0].booking_date, date(2025, 11, 28));
    }

    #[test]
    fn partial_header_falls_back_per_column() {
        let text = "Tag;Betrag;Währung;Beschreibung\n28.11.2025;-19,90;EUR;REWE\n";
        let parsed = parser().parse(text);
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.transactions.len(), 1);
        assert_eq!(parsed.transactions[0].booking_date, date(2025, 11, 28));
        assert_eq!(parsed.transactions[0].amount_minor, -1990);

        let text = "Datum;Betrag;Währung;Beschreibung\n28.11.2025;-19,90;EUR;REWE Markt\n";
        let parsed = parser().parse(text);
        assert_eq!(parsed.transactions[0].description_raw, "REWE Markt");
    }

    #[test]
    fn quoted_fields_with_doubled_quotes() {
        let text = "Buchungstag;Betrag;Währung;Buchungstext;Referenz\n\
                    28.11.2025;\"-1.000,00\";EUR;\"Miete \"\"Nov\"\"; Whg 3\";TX-1\n";
        let parsed = parser().parse(text);
        assert_eq!(parsed.transactions.len(), 1);
        let tx = &parsed.transactions[0];
        assert_eq!(tx.amount_minor, -100000);
        assert_eq!(tx.description_raw, "Miete \"Nov\"; Whg 3");
        assert_eq!(tx.external_id.as_deref(), Some("TX-1"));
    }

    #[test]
    fn description_columns_joined() {
        let text = "Buchungstag;Betrag;Buchungstext;Verwendungszweck\n\
                    28.11.2025;-3,50;Lastschrift;Bäckerei\n";
        let parsed = parser().parse(text);
        assert_eq!(parsed.transactions[0].description_raw, "Lastschrift | Bäckerei");
    }
}
