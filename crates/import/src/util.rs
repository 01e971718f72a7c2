use auszug_core::money::major_to_minor;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Decodes statement bytes: UTF-8 when valid, otherwise ISO-8859-1 (the
/// usual encoding of German bank exports). A leading BOM is dropped.
pub fn decode_statement(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        // Latin-1 maps every byte to the code point of the same value.
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// `DD.MM.YYYY` or `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    ["%d.%m.%Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Parses a comma-decimal, dot-thousands amount (`-1.234,56`, `19,90-`,
/// `€ 5,00`) into signed minor units.
pub fn parse_amount(raw: &str) -> Option<i64> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '€')
        .collect();

    let (trailing_negative, body) = match compact.strip_suffix('-') {
        Some(rest) => (true, rest),
        None => (false, compact.strip_suffix('+').unwrap_or(&compact)),
    };
    let (leading_negative, body) = match body.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, body.strip_prefix('+').unwrap_or(body)),
    };

    if body.is_empty()
        || !body.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',')
        || body.matches(',').count() > 1
    {
        return None;
    }

    // Thousands separators go first, then the decimal comma becomes a point.
    let normalized = body.replace('.', "").replacen(',', ".", 1);
    let minor = major_to_minor(Decimal::from_str(&normalized).ok()?)?;
    Some(if trailing_negative ^ leading_negative { -minor } else { minor })
}
