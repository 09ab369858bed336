//! Database initialization
//!
//! Creates the catalog database on first run and brings the schema up to date.
//! Every statement is `CREATE ... IF NOT EXISTS`, so initialization is
//! idempotent and safe to run on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL lets status readers proceed while a job writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_catalog_schema(&pool).await?;

    Ok(pool)
}

/// Create all catalog tables and indexes
pub async fn create_catalog_schema(pool: &SqlitePool) -> Result<()> {
    create_authors_table(pool).await?;
    create_series_table(pool).await?;
    create_books_table(pool).await?;
    create_book_segments_table(pool).await?;
    create_book_authors_table(pool).await?;
    create_blocked_hashes_table(pool).await?;
    create_operation_tables(pool).await?;
    create_library_fingerprints_table(pool).await?;
    Ok(())
}

async fn create_authors_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS authors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_series_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS series (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            author_id INTEGER REFERENCES authors(id) ON DELETE SET NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_series_name ON series(name)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the books table
///
/// `persistent_id` is unique among non-empty values so a persistent id can
/// never be carried by two books.
async fn create_books_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            file_path TEXT NOT NULL,
            format TEXT NOT NULL DEFAULT '',
            duration_seconds INTEGER,
            total_size INTEGER,
            release_year INTEGER,
            narrator TEXT,
            edition TEXT,
            author_id INTEGER REFERENCES authors(id) ON DELETE SET NULL,
            series_id INTEGER REFERENCES series(id) ON DELETE SET NULL,
            series_position INTEGER,
            persistent_id TEXT,
            play_count INTEGER NOT NULL DEFAULT 0,
            rating INTEGER NOT NULL DEFAULT 0,
            bookmark_ms INTEGER NOT NULL DEFAULT 0,
            last_played TIMESTAMP,
            date_added TIMESTAMP,
            file_hash TEXT,
            original_file_hash TEXT,
            organized_file_hash TEXT,
            library_state TEXT NOT NULL DEFAULT 'imported'
                CHECK (library_state IN ('imported', 'organized', 'deleted')),
            import_source TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_books_persistent_id
        ON books(persistent_id)
        WHERE persistent_id IS NOT NULL AND persistent_id <> ''
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_books_file_path ON books(file_path)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_books_file_hash ON books(file_hash)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_books_import_source ON books(import_source, library_state)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_book_segments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS book_segments (
            id TEXT PRIMARY KEY,
            book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            file_path TEXT NOT NULL,
            format TEXT NOT NULL DEFAULT '',
            size_bytes INTEGER NOT NULL DEFAULT 0,
            duration_seconds INTEGER NOT NULL DEFAULT 0,
            track_number INTEGER,
            total_tracks INTEGER,
            persistent_id TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_book_segments_book ON book_segments(book_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_book_segments_persistent_id ON book_segments(persistent_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_book_authors_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS book_authors (
            book_id TEXT NOT NULL REFERENCES books(id) ON DELETE CASCADE,
            author_id INTEGER NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
            role TEXT NOT NULL DEFAULT 'author',
            position INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (book_id, author_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_blocked_hashes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blocked_hashes (
            hash TEXT PRIMARY KEY,
            reason TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Job parameter and checkpoint rows, both JSON documents keyed by job id
async fn create_operation_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS operation_params (
            operation_id TEXT PRIMARY KEY,
            params TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS operation_state (
            operation_id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_library_fingerprints_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS library_fingerprints (
            path TEXT PRIMARY KEY,
            size INTEGER NOT NULL,
            mod_time TEXT NOT NULL,
            checksum INTEGER NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
