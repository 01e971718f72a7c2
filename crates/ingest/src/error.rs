use thiserror::Error;

use crate::extractor::ExtractError;
use crate::ports::StoreError;

/// Upload problems the user can fix by choosing a different file.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("file is empty")]
    Empty,
    #[error("file is {size} bytes, the limit is {max}")]
    TooLarge { size: usize, max: usize },
    #[error("unsupported file type '{0}': only CSV and PDF statements are accepted")]
    UnsupportedType(String),
}

/// Import-level failures. None of these leave a COMPLETED import behind.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("text extraction failed: {0}")]
    Extraction(#[from] ExtractError),
    #[error("no transactions found ({skipped} unreadable rows skipped)")]
    NoTransactions { skipped: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}
