//! Catalog and file fixtures

use shelf_itunes::db::SqliteCatalog;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Create a catalog in a temporary directory
///
/// Returns (TempDir, catalog) - TempDir must be kept alive for duration of test
pub async fn create_test_catalog() -> (TempDir, Arc<SqliteCatalog>) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_shelf.db");
    let catalog = SqliteCatalog::open(&db_path).await.unwrap();
    (temp_dir, Arc::new(catalog))
}

/// Write a small audio stand-in whose contents are unique to `path`
pub fn write_book_file(path: &Path) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, format!("audio:{}", path.display())).unwrap();
    path.to_path_buf()
}
