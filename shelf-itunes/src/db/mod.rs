//! SQLite catalog store
//!
//! Query functions live in per-table modules and take a `&SqlitePool`;
//! [`SqliteCatalog`] wires them up behind [`CatalogStore`]. Writes that can
//! race with a concurrent job go through [`retry_on_lock`].

pub mod authors;
pub mod books;
pub mod fingerprints;
pub mod operations;
pub mod segments;

use crate::catalog::CatalogStore;
use crate::fingerprint::LibraryFingerprint;
use crate::models::{BookSegment, CatalogBook, LibraryState};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::Path;
use uuid::Uuid;

/// Catalog backed by the shared SQLite database
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the catalog database at `db_path`
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = shelf_common::db::init_database(db_path).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn create_book(&self, book: &CatalogBook) -> Result<()> {
        retry_on_lock("create_book", DEFAULT_MAX_LOCK_WAIT_MS, || {
            books::save_book(&self.pool, book)
        })
        .await
    }

    async fn update_book(&self, book: &CatalogBook) -> Result<()> {
        retry_on_lock("update_book", DEFAULT_MAX_LOCK_WAIT_MS, || {
            books::update_book(&self.pool, book)
        })
        .await
    }

    async fn get_book(&self, id: Uuid) -> Result<Option<CatalogBook>> {
        books::load_book(&self.pool, id).await
    }

    async fn get_book_by_file_path(&self, path: &str) -> Result<Option<CatalogBook>> {
        books::load_book_by_path(&self.pool, path).await
    }

    async fn get_book_by_file_hash(&self, hash: &str) -> Result<Option<CatalogBook>> {
        books::load_book_by_hash(&self.pool, hash).await
    }

    async fn get_book_by_persistent_id(&self, persistent_id: &str) -> Result<Option<CatalogBook>> {
        books::load_book_by_persistent_id(&self.pool, persistent_id).await
    }

    async fn list_books_by_import_source(
        &self,
        source: &str,
        state: LibraryState,
    ) -> Result<Vec<CatalogBook>> {
        books::load_books_by_import_source(&self.pool, source, state).await
    }

    async fn count_books(&self) -> Result<i64> {
        books::count_books(&self.pool).await
    }

    async fn is_hash_blocked(&self, hash: &str) -> Result<bool> {
        books::is_hash_blocked(&self.pool, hash).await
    }

    async fn block_hash(&self, hash: &str, reason: &str) -> Result<()> {
        books::block_hash(&self.pool, hash, reason).await
    }

    async fn create_segment(&self, segment: &BookSegment) -> Result<()> {
        retry_on_lock("create_segment", DEFAULT_MAX_LOCK_WAIT_MS, || {
            segments::save_segment(&self.pool, segment)
        })
        .await
    }

    async fn update_segment_path(&self, segment_id: Uuid, file_path: &str) -> Result<()> {
        let updated = retry_on_lock("update_segment_path", DEFAULT_MAX_LOCK_WAIT_MS, || {
            segments::update_segment_path(&self.pool, segment_id, file_path)
        })
        .await?;
        if !updated {
            return Err(Error::NotFound(format!("segment {}", segment_id)));
        }
        Ok(())
    }

    async fn list_segments(&self, book_id: Uuid) -> Result<Vec<BookSegment>> {
        segments::load_segments_for_book(&self.pool, book_id).await
    }

    async fn get_segment_by_persistent_id(&self, persistent_id: &str) -> Result<Option<BookSegment>> {
        segments::load_segment_by_persistent_id(&self.pool, persistent_id).await
    }

    async fn get_or_create_author_by_name(&self, name: &str) -> Result<i64> {
        retry_on_lock("get_or_create_author", DEFAULT_MAX_LOCK_WAIT_MS, || {
            authors::get_or_create_author(&self.pool, name)
        })
        .await
    }

    async fn get_or_create_series_by_name(&self, name: &str, author_id: Option<i64>) -> Result<i64> {
        retry_on_lock("get_or_create_series", DEFAULT_MAX_LOCK_WAIT_MS, || {
            authors::get_or_create_series(&self.pool, name, author_id)
        })
        .await
    }

    async fn set_book_authors(&self, book_id: Uuid, author_ids: &[i64]) -> Result<()> {
        retry_on_lock("set_book_authors", DEFAULT_MAX_LOCK_WAIT_MS, || {
            authors::replace_book_authors(&self.pool, book_id, author_ids)
        })
        .await
    }

    async fn save_library_fingerprint(&self, fingerprint: &LibraryFingerprint) -> Result<()> {
        retry_on_lock("save_library_fingerprint", DEFAULT_MAX_LOCK_WAIT_MS, || {
            fingerprints::upsert_fingerprint(&self.pool, fingerprint)
        })
        .await
    }

    async fn get_library_fingerprint(&self, path: &str) -> Result<Option<LibraryFingerprint>> {
        fingerprints::load_fingerprint(&self.pool, path).await
    }

    async fn save_operation_params(&self, operation_id: &str, params_json: &str) -> Result<bool> {
        retry_on_lock("save_operation_params", DEFAULT_MAX_LOCK_WAIT_MS, || {
            operations::insert_params(&self.pool, operation_id, params_json)
        })
        .await
    }

    async fn get_operation_params(&self, operation_id: &str) -> Result<Option<String>> {
        operations::load_params(&self.pool, operation_id).await
    }

    async fn save_operation_state(&self, operation_id: &str, state_json: &str) -> Result<()> {
        retry_on_lock("save_operation_state", DEFAULT_MAX_LOCK_WAIT_MS, || {
            operations::upsert_state(&self.pool, operation_id, state_json)
        })
        .await
    }

    async fn get_operation_state(&self, operation_id: &str) -> Result<Option<String>> {
        operations::load_state(&self.pool, operation_id).await
    }

    async fn delete_operation_state(&self, operation_id: &str) -> Result<()> {
        operations::delete_operation(&self.pool, operation_id).await
    }
}
