use async_trait::async_trait;
use auszug_core::{ImportId, ImportStatus, NewImport, ResolvedTransaction};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint (file or text hash) rejected the write.
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("import {0} not found")]
    NotFound(ImportId),
    #[error("storage error: {0}")]
    Backend(String),
}

/// What the dedup checks need to know about an existing import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportRef {
    pub id: ImportId,
    pub status: ImportStatus,
}

/// Persistence boundary for imports and their transactions.
#[async_trait]
pub trait ImportRepository: Send + Sync {
    async fn find_by_file_hash(&self, file_hash: &str) -> Result<Option<ImportRef>, StoreError>;

    async fn find_by_text_hash(&self, text_hash: &str) -> Result<Option<ImportRef>, StoreError>;

    /// Creates a PENDING import. Fails with `Conflict` if either hash exists.
    async fn create_pending(&self, import: &NewImport) -> Result<ImportId, StoreError>;

    /// Stores every record and marks the import COMPLETED in one unit: either
    /// both happen or neither does. `NotFound` for an unknown id, `Conflict`
    /// if the import is no longer PENDING.
    async fn complete(
        &self,
        id: ImportId,
        records: &[ResolvedTransaction],
    ) -> Result<(), StoreError>;

    /// Removes an import that never completed, with anything attached to it.
    /// Completed or unknown imports are left alone and the call succeeds.
    async fn discard_pending(&self, id: ImportId) -> Result<(), StoreError>;
}
