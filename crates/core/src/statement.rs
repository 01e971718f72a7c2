use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::period::DateRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImportId(pub i64);

impl fmt::Display for ImportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    Pending,
    Completed,
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportStatus::Pending => write!(f, "PENDING"),
            ImportStatus::Completed => write!(f, "COMPLETED"),
        }
    }
}

impl std::str::FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ImportStatus::Pending),
            "COMPLETED" => Ok(ImportStatus::Completed),
            other => Err(format!("Unknown import status: '{other}'")),
        }
    }
}

/// An import about to be created; it always starts out PENDING.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewImport {
    /// SHA-256 hex of the raw uploaded bytes.
    pub file_hash: String,
    /// SHA-256 hex of the whitespace-normalized extracted text.
    pub extracted_text_hash: String,
    pub statement_period: DateRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub id: ImportId,
    pub file_hash: String,
    pub extracted_text_hash: String,
    pub statement_from: NaiveDate,
    pub statement_to: NaiveDate,
    pub status: ImportStatus,
}

impl Import {
    pub fn from_new(id: ImportId, new: NewImport) -> Self {
        Import {
            id,
            file_hash: new.file_hash,
            extracted_text_hash: new.extracted_text_hash,
            statement_from: new.statement_period.start,
            statement_to: new.statement_period.end,
            status: ImportStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_roundtrip() {
        for status in [ImportStatus::Pending, ImportStatus::Completed] {
            assert_eq!(ImportStatus::from_str(&status.to_string()).unwrap(), status);
        }
        assert!(ImportStatus::from_str("FAILED").is_err());
    }

    #[test]
    fn from_new_starts_pending() {
        let d = NaiveDate::from_ymd_opt(2025, 11, 1).unwrap();
        let import = Import::from_new(
            ImportId(7),
            NewImport {
                file_hash: "a".into(),
                extracted_text_hash: "b".into(),
                statement_period: DateRange::new(d, d),
            },
        );
        assert_eq!(import.status, ImportStatus::Pending);
        assert_eq!(import.statement_from, d);
        assert_eq!(import.id.to_string(), "7");
    }
}
