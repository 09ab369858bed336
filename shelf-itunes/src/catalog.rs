//! Catalog store contract
//!
//! The import, sync and write-back services only talk to the catalog through
//! [`CatalogStore`]. [`SqliteCatalog`](crate::db::SqliteCatalog) is the
//! bundled implementation.

use crate::fingerprint::LibraryFingerprint;
use crate::models::{BookSegment, CatalogBook, LibraryState};
use crate::Result;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn create_book(&self, book: &CatalogBook) -> Result<()>;

    /// Update mutable fields. An already-set persistent id is never replaced.
    async fn update_book(&self, book: &CatalogBook) -> Result<()>;

    async fn get_book(&self, id: Uuid) -> Result<Option<CatalogBook>>;

    async fn get_book_by_file_path(&self, path: &str) -> Result<Option<CatalogBook>>;

    async fn get_book_by_file_hash(&self, hash: &str) -> Result<Option<CatalogBook>>;

    async fn get_book_by_persistent_id(&self, persistent_id: &str) -> Result<Option<CatalogBook>>;

    /// Books imported from `source` in `state`, oldest first
    async fn list_books_by_import_source(
        &self,
        source: &str,
        state: LibraryState,
    ) -> Result<Vec<CatalogBook>>;

    async fn count_books(&self) -> Result<i64>;

    async fn is_hash_blocked(&self, hash: &str) -> Result<bool>;

    async fn block_hash(&self, hash: &str, reason: &str) -> Result<()>;

    async fn create_segment(&self, segment: &BookSegment) -> Result<()>;

    /// Change a segment's file path. Unknown ids are a [`NotFound`](crate::Error::NotFound).
    async fn update_segment_path(&self, segment_id: Uuid, file_path: &str) -> Result<()>;

    /// Segments of a book ordered by track number
    async fn list_segments(&self, book_id: Uuid) -> Result<Vec<BookSegment>>;

    async fn get_segment_by_persistent_id(&self, persistent_id: &str) -> Result<Option<BookSegment>>;

    /// Exact, case-sensitive name match; created when absent
    async fn get_or_create_author_by_name(&self, name: &str) -> Result<i64>;

    async fn get_or_create_series_by_name(&self, name: &str, author_id: Option<i64>) -> Result<i64>;

    async fn set_book_authors(&self, book_id: Uuid, author_ids: &[i64]) -> Result<()>;

    async fn save_library_fingerprint(&self, fingerprint: &LibraryFingerprint) -> Result<()>;

    async fn get_library_fingerprint(&self, path: &str) -> Result<Option<LibraryFingerprint>>;

    /// Store job parameters. Returns `false` when parameters already exist.
    async fn save_operation_params(&self, operation_id: &str, params_json: &str) -> Result<bool>;

    async fn get_operation_params(&self, operation_id: &str) -> Result<Option<String>>;

    async fn save_operation_state(&self, operation_id: &str, state_json: &str) -> Result<()>;

    async fn get_operation_state(&self, operation_id: &str) -> Result<Option<String>>;

    /// Remove params and state for a job. Idempotent.
    async fn delete_operation_state(&self, operation_id: &str) -> Result<()>;
}
