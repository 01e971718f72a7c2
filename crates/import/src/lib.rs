pub mod categorize;
pub mod csv;
pub mod openai;
pub mod pdf;
pub mod rules;
pub(crate) mod util;

pub use categorize::{
    CategorizationOutcome, CategorizationProvider, CategorizationServiceError, Categorizer,
    TransactionForAnalysis,
};
pub use csv::CsvStatementParser;
pub use openai::{AiConfig, OpenAiProvider};
pub use pdf::PdfStatementParser;
pub use rules::{KeywordRule, KeywordRules};
pub use util::decode_statement;

use auszug_core::{Currency, DateRange, DraftTransaction};

/// Statement formats recognized by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementFormat {
    Csv,
    Pdf,
}

impl StatementFormat {
    /// Case-insensitive extension check; anything else is unsupported.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(StatementFormat::Csv),
            "pdf" => Some(StatementFormat::Pdf),
            _ => None,
        }
    }
}

impl std::fmt::Display for StatementFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatementFormat::Csv => write!(f, "csv"),
            StatementFormat::Pdf => write!(f, "pdf"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatement {
    pub transactions: Vec<DraftTransaction>,
    /// Rows or lines that looked like bookings but could not be read.
    pub skipped: usize,
    /// The text the transactions were read from; input to the text hash.
    pub text: String,
}

impl ParsedStatement {
    /// Earliest to latest booking date, `None` when nothing was parsed.
    pub fn period(&self) -> Option<DateRange> {
        DateRange::spanning(self.transactions.iter().map(|t| t.booking_date))
    }
}

/// Format-specific parser behind one entry point.
#[derive(Debug, Clone)]
pub enum StatementParser {
    Csv(CsvStatementParser),
    Pdf(PdfStatementParser),
}

impl StatementParser {
    pub fn for_format(format: StatementFormat, home_currency: Currency) -> Self {
        match format {
            StatementFormat::Csv => StatementParser::Csv(CsvStatementParser::new(home_currency)),
            StatementFormat::Pdf => StatementParser::Pdf(PdfStatementParser::new(home_currency)),
        }
    }

    pub fn parse(&self, text: &str) -> ParsedStatement {
        match self {
            StatementParser::Csv(p) => p.parse(text),
            StatementParser::Pdf(p) => p.parse(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn format_from_filename() {
        assert_eq!(StatementFormat::from_filename("Umsaetze.CSV"), Some(StatementFormat::Csv));
        assert_eq!(
            StatementFormat::from_filename("auszug_2025_11.pdf"),
            Some(StatementFormat::Pdf)
        );
        assert_eq!(StatementFormat::from_filename("statement.ofx"), None);
        assert_eq!(StatementFormat::from_filename("noextension"), None);
    }

    #[test]
    fn dispatch_and_period() {
        let parser = StatementParser::for_format(StatementFormat::Csv, Currency::EUR);
        let parsed = parser.parse(
            "Buchungstag;Betrag;Währung;Text\n\
             28.11.2025;-1,00;EUR;a\n\
             03.11.2025;-2,00;EUR;b\n",
        );
        let period = parsed.period().unwrap();
        assert_eq!(period.start, NaiveDate::from_ymd_opt(2025, 11, 3).unwrap());
        assert_eq!(period.end, NaiveDate::from_ymd_opt(2025, 11, 28).unwrap());
    }

    #[test]
    fn empty_parse_has_no_period() {
        let parser = StatementParser::for_format(StatementFormat::Pdf, Currency::EUR);
        assert!(parser.parse("").period().is_none());
    }
}
