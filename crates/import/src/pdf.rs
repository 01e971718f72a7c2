use auszug_core::{Currency, DraftTransaction, SourceRef};
use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use crate::util::{parse_amount, parse_date};
use crate::ParsedStatement;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// ── Patterns ──────────────────────────────────────────────────────────────────

// Runs of single digits/separators split by single spaces: "2 8 . 1 1".
re!(re_spaced_run, r"(?m)(^|[ \t])((?:[0-9.,][ \t]){2,}[0-9.,])([ \t]|$)");
re!(re_loose_separator, r"(\d)[ \t]+([.,])[ \t]*(\d)");

re!(re_any_full_date, r"\b(\d{2}\.\d{2}\.\d{4})\b");

re!(re_full_line,
    r"(\d{2}\.\d{2}\.\d{4})(?:\s+(\d{2}\.\d{2}\.\d{4}))?\s+([+-]?[ \t]?(?:\d{1,3}(?:\.\d{3})+|\d+)(?:,\d{2})?)\s+([A-Z]{3})\b");
re!(re_short_line,
    r"(?:^|\s)(\d{2})\.(\d{2})\.?\s+((?:\d{1,3}(?:\.\d{3})+|\d+),\d{2})[ \t]*([+-])?(?:\s|$)");

/// Lines carrying these words report balances, not bookings.
const BALANCE_MARKERS: &[&str] = &["kontostand", "saldo", "balance"];

/// A short-form date more than this far past the header date belongs to the
/// previous year.
const YEAR_ROLLBACK_DAYS: i64 = 31;

// ── Normalization ─────────────────────────────────────────────────────────────

/// Repairs the letter-spacing PDF text extraction tends to produce around
/// numbers: collapses spaced single-character runs, then pulls separators
/// that drifted away from their leading digit back into the number.
pub fn normalize_pdf_text(text: &str) -> String {
    let mut out = text.replace("\r\n", "\n").replace('\r', "\n");

    // A match consumes its trailing space, so an adjacent run needs another pass.
    loop {
        let next = re_spaced_run()
            .replace_all(&out, |caps: &regex::Captures| {
                format!("{}{}{}", &caps[1], caps[2].replace([' ', '\t'], ""), &caps[3])
            })
            .into_owned();
        if next == out {
            break;
        }
        out = next;
    }

    re_loose_separator()
        .replace_all(&out, "$1$2$3")
        .into_owned()
}

/// First valid `DD.MM.YYYY` date in the text.
pub fn header_date(text: &str) -> Option<NaiveDate> {
    re_any_full_date()
        .captures_iter(text)
        .find_map(|caps| parse_date(&caps[1]))
}

/// Places a day/month pair in the header's year, stepping back a year when
/// that would land more than a month after the header date.
pub fn infer_short_date(day: u32, month: u32, header: NaiveDate) -> Option<NaiveDate> {
    let candidate = NaiveDate::from_ymd_opt(header.year(), month, day)?;
    if candidate > header + Duration::days(YEAR_ROLLBACK_DAYS) {
        NaiveDate::from_ymd_opt(header.year() - 1, month, day)
    } else {
        Some(candidate)
    }
}

fn description_around(line: &str, start: usize, end: usize) -> String {
    let before = line[..start].trim();
    if !before.is_empty() {
        return before.to_string();
    }
    line[end..].trim().to_string()
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Line-oriented parser over text extracted from a statement PDF.
#[derive(Debug, Clone)]
pub struct PdfStatementParser {
    home_currency: Currency,
}

impl PdfStatementParser {
    pub fn new(home_currency: Currency) -> Self {
        Self { home_currency }
    }

    pub fn parse(&self, text: &str) -> ParsedStatement {
        let normalized = normalize_pdf_text(text);
        let header = header_date(&normalized);
        if header.is_none() {
            debug!("no header date found; short-form lines will be skipped");
        }

        let mut transactions = Vec::new();
        let mut skipped = 0usize;

        for (idx, line) in normalized.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let lowered = trimmed.to_lowercase();
            if BALANCE_MARKERS.iter().any(|m| lowered.contains(m)) {
                continue;
            }

            if let Some(caps) = re_full_line().captures(trimmed) {
                match self.full_line(trimmed, &caps, idx) {
                    Some(tx) => transactions.push(tx),
                    None => {
                        debug!(line = idx, "skipping unparseable booking line");
                        skipped += 1;
                    }
                }
                continue;
            }

            if let Some(caps) = re_short_line().captures(trimmed) {
                match header.and_then(|h| self.short_line(trimmed, &caps, h, idx)) {
                    Some(tx) => transactions.push(tx),
                    None => {
                        debug!(line = idx, "skipping short booking line");
                        skipped += 1;
                    }
                }
            }
        }

        ParsedStatement {
            transactions,
            skipped,
            text: normalized,
        }
    }

    fn full_line(
        &self,
        line: &str,
        caps: &regex::Captures,
        idx: usize,
    ) -> Option<DraftTransaction> {
        let booking = parse_date(&caps[1])?;
        let valuta = caps.get(2).and_then(|m| parse_date(m.as_str())).unwrap_or(booking);
        let amount = parse_amount(&caps[3])?;
        let currency = Currency::parse(&caps[4]).unwrap_or(self.home_currency);
        let whole = caps.get(0)?;

        Some(
            DraftTransaction::new(
                booking,
                amount,
                currency,
                description_around(line, whole.start(), whole.end()),
                SourceRef::Line(idx),
            )
            .with_valuta(valuta),
        )
    }

    fn short_line(
        &self,
        line: &str,
        caps: &regex::Captures,
        header: NaiveDate,
        idx: usize,
    ) -> Option<DraftTransaction> {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let date = infer_short_date(day, month, header)?;
        let magnitude = parse_amount(&caps[3])?;
        let amount = match caps.get(4).map(|m| m.as_str()) {
            Some("-") => -magnitude,
            _ => magnitude,
        };
        let whole = caps.get(0)?;

        Some(DraftTransaction::new(
            date,
            amount,
            self.home_currency,
            description_around(line, whole.start(), whole.end()),
            SourceRef::Line(idx),
        ))
    }
}
