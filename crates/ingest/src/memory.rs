use async_trait::async_trait;
use auszug_core::{Import, ImportId, ImportStatus, NewImport, ResolvedTransaction};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::ports::{ImportRef, ImportRepository, StoreError};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    imports: BTreeMap<ImportId, Import>,
    transactions: BTreeMap<ImportId, Vec<ResolvedTransaction>>,
}

/// In-process repository with the same uniqueness and atomicity rules as the
/// SQLite store.
#[derive(Debug, Default)]
pub struct MemoryImportRepository {
    state: Mutex<State>,
    fail_next_complete: AtomicBool,
}

impl MemoryImportRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `complete` call fail without writing anything, as a
    /// crashed request would.
    pub fn fail_next_complete(&self) {
        self.fail_next_complete.store(true, Ordering::SeqCst);
    }

    pub fn imports(&self) -> Vec<Import> {
        self.lock()
            .map(|s| s.imports.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn transactions(&self, id: ImportId) -> Vec<ResolvedTransaction> {
        self.lock()
            .ok()
            .and_then(|s| s.transactions.get(&id).cloned())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

fn as_ref(import: &Import) -> ImportRef {
    ImportRef {
        id: import.id,
        status: import.status,
    }
}

#[async_trait]
impl ImportRepository for MemoryImportRepository {
    async fn find_by_file_hash(&self, file_hash: &str) -> Result<Option<ImportRef>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .imports
            .values()
            .find(|i| i.file_hash == file_hash)
            .map(as_ref))
    }

    async fn find_by_text_hash(&self, text_hash: &str) -> Result<Option<ImportRef>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .imports
            .values()
            .find(|i| i.extracted_text_hash == text_hash)
            .map(as_ref))
    }

    async fn create_pending(&self, import: &NewImport) -> Result<ImportId, StoreError> {
        let mut state = self.lock()?;
        if state.imports.values().any(|i| i.file_hash == import.file_hash) {
            return Err(StoreError::Conflict("imports.file_hash".into()));
        }
        if state
            .imports
            .values()
            .any(|i| i.extracted_text_hash == import.extracted_text_hash)
        {
            return Err(StoreError::Conflict("imports.extracted_text_hash".into()));
        }
        state.next_id += 1;
        let id = ImportId(state.next_id);
        state.imports.insert(id, Import::from_new(id, import.clone()));
        Ok(id)
    }

    async fn complete(
        &self,
        id: ImportId,
        records: &[ResolvedTransaction],
    ) -> Result<(), StoreError> {
        if self.fail_next_complete.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated failure".into()));
        }
        let mut state = self.lock()?;
        let import = state.imports.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if import.status != ImportStatus::Pending {
            return Err(StoreError::Conflict(format!(
                "import {id} is already {}",
                import.status
            )));
        }
        import.status = ImportStatus::Completed;
        state.transactions.insert(id, records.to_vec());
        Ok(())
    }

    async fn discard_pending(&self, id: ImportId) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state
            .imports
            .get(&id)
            .is_some_and(|i| i.status == ImportStatus::Pending)
        {
            state.imports.remove(&id);
            state.transactions.remove(&id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auszug_core::DateRange;
    use chrono::NaiveDate;

    fn new_import(file: &str, text: &str) -> NewImport {
        let d = NaiveDate::from_ymd_opt(2025, 11, 1).unwrap();
        NewImport {
            file_hash: file.into(),
            extracted_text_hash: text.into(),
            statement_period: DateRange::new(d, d),
        }
    }

    #[tokio::test]
    async fn create_then_find() {
        let repo = MemoryImportRepository::new();
        let id = repo.create_pending(&new_import("f1", "t1")).await.unwrap();
        let found = repo.find_by_file_hash("f1").await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.status, ImportStatus::Pending);
        assert_eq!(repo.find_by_text_hash("t1").await.unwrap().unwrap().id, id);
        assert!(repo.find_by_file_hash("f2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hashes_are_unique() {
        let repo = MemoryImportRepository::new();
        repo.create_pending(&new_import("f1", "t1")).await.unwrap();
        assert!(matches!(
            repo.create_pending(&new_import("f1", "t2")).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            repo.create_pending(&new_import("f2", "t1")).await,
            Err(StoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn complete_flips_status() {
        let repo = MemoryImportRepository::new();
        let id = repo.create_pending(&new_import("f1", "t1")).await.unwrap();
        repo.complete(id, &[]).await.unwrap();
        assert_eq!(
            repo.find_by_file_hash("f1").await.unwrap().unwrap().status,
            ImportStatus::Completed
        );
    }

    #[tokio::test]
    async fn simulated_failure_leaves_pending_and_discard_removes_it() {
        let repo = MemoryImportRepository::new();
        let id = repo.create_pending(&new_import("f1", "t1")).await.unwrap();
        repo.fail_next_complete();
        assert!(repo.complete(id, &[]).await.is_err());
        assert_eq!(repo.imports()[0].status, ImportStatus::Pending);

        repo.discard_pending(id).await.unwrap();
        assert!(repo.imports().is_empty());
    }

    #[tokio::test]
    async fn discard_leaves_completed_and_unknown_imports_alone() {
        let repo = MemoryImportRepository::new();
        let id = repo.create_pending(&new_import("f1", "t1")).await.unwrap();
        repo.complete(id, &[]).await.unwrap();

        repo.discard_pending(id).await.unwrap();
        repo.discard_pending(ImportId(99)).await.unwrap();
        assert_eq!(repo.imports().len(), 1);
        assert_eq!(repo.imports()[0].status, ImportStatus::Completed);
    }

    #[tokio::test]
    async fn complete_twice_is_rejected() {
        let repo = MemoryImportRepository::new();
        let id = repo.create_pending(&new_import("f1", "t1")).await.unwrap();
        repo.complete(id, &[]).await.unwrap();
        assert!(matches!(
            repo.complete(id, &[]).await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            repo.complete(ImportId(99), &[]).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
