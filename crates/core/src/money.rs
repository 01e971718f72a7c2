//! Integer minor-unit money helpers. Every currency is treated as having two
//! minor digits.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::currency::Currency;

pub const MINOR_PER_MAJOR: i64 = 100;

/// Rounds a (possibly fractional) amount of minor units to an integer,
/// ties away from zero. `None` if the result does not fit in `i64`.
pub fn round_half_up(minor_units: Decimal) -> Option<i64> {
    minor_units
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Converts a decimal major-unit amount (e.g. `19.90`) to minor units.
pub fn major_to_minor(major: Decimal) -> Option<i64> {
    round_half_up(major * Decimal::from(MINOR_PER_MAJOR))
}

/// en-US style rendering: `-€1,234.50`, `$100.00`, `SEK 12.00`.
pub fn format_minor(amount_minor: i64, currency: Currency) -> String {
    let negative = amount_minor < 0;
    let abs = amount_minor.unsigned_abs();
    let major = abs / MINOR_PER_MAJOR as u64;
    let minor = abs % MINOR_PER_MAJOR as u64;

    let digits = major.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let prefix = match currency.symbol() {
        Some(symbol) => symbol.to_string(),
        None => format!("{currency} "),
    };
    let sign = if negative { "-" } else { "" };
    format!("{sign}{prefix}{grouped}.{minor:02}")
}

/// Lenient user-input parser: keeps digits, `.`, `,` and `-`, treats the first
/// `,` as the decimal point and reads the longest numeric prefix. Anything
/// unparseable is `0`.
pub fn parse_lenient(input: &str) -> i64 {
    let cleaned: String = input
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    let cleaned = cleaned.replacen(',', ".", 1);

    let mut prefix = String::new();
    let mut seen_dot = false;
    for (i, ch) in cleaned.chars().enumerate() {
        match ch {
            '-' if i == 0 => prefix.push(ch),
            '.' if !seen_dot => {
                seen_dot = true;
                prefix.push(ch);
            }
            c if c.is_ascii_digit() => prefix.push(c),
            _ => break,
        }
    }
    let prefix = prefix.trim_end_matches('.');

    Decimal::from_str(prefix)
        .ok()
        .and_then(major_to_minor)
        .unwrap_or(0)
}
