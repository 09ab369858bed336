//! Book database operations

use crate::models::{CatalogBook, LibraryState};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const BOOK_COLUMNS: &str = "id, title, file_path, format, duration_seconds, total_size, \
     release_year, narrator, edition, author_id, series_id, series_position, persistent_id, \
     play_count, rating, bookmark_ms, last_played, date_added, file_hash, original_file_hash, \
     organized_file_hash, library_state, import_source";

/// Insert a new book
pub async fn save_book(pool: &SqlitePool, book: &CatalogBook) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO books (
            id, title, file_path, format, duration_seconds, total_size,
            release_year, narrator, edition, author_id, series_id, series_position,
            persistent_id, play_count, rating, bookmark_ms, last_played, date_added,
            file_hash, original_file_hash, organized_file_hash, library_state, import_source,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(book.id.to_string())
    .bind(&book.title)
    .bind(&book.file_path)
    .bind(&book.format)
    .bind(book.duration_seconds)
    .bind(book.total_size)
    .bind(book.release_year)
    .bind(&book.narrator)
    .bind(&book.edition)
    .bind(book.author_id)
    .bind(book.series_id)
    .bind(book.series_position)
    .bind(&book.persistent_id)
    .bind(book.play_count)
    .bind(book.rating)
    .bind(book.bookmark_ms)
    .bind(book.last_played.map(|t| t.to_rfc3339()))
    .bind(book.date_added.map(|t| t.to_rfc3339()))
    .bind(&book.file_hash)
    .bind(&book.original_file_hash)
    .bind(&book.organized_file_hash)
    .bind(book.library_state.as_str())
    .bind(&book.import_source)
    .execute(pool)
    .await?;

    Ok(())
}

/// Update an existing book
///
/// A persistent id already stored on the row is kept; the incoming value only
/// fills an empty slot.
pub async fn update_book(pool: &SqlitePool, book: &CatalogBook) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE books SET
            title = ?,
            file_path = ?,
            format = ?,
            duration_seconds = ?,
            total_size = ?,
            release_year = ?,
            narrator = ?,
            edition = ?,
            author_id = ?,
            series_id = ?,
            series_position = ?,
            persistent_id = COALESCE(NULLIF(books.persistent_id, ''), ?),
            play_count = ?,
            rating = ?,
            bookmark_ms = ?,
            last_played = ?,
            date_added = ?,
            file_hash = ?,
            original_file_hash = ?,
            organized_file_hash = ?,
            library_state = ?,
            import_source = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&book.title)
    .bind(&book.file_path)
    .bind(&book.format)
    .bind(book.duration_seconds)
    .bind(book.total_size)
    .bind(book.release_year)
    .bind(&book.narrator)
    .bind(&book.edition)
    .bind(book.author_id)
    .bind(book.series_id)
    .bind(book.series_position)
    .bind(&book.persistent_id)
    .bind(book.play_count)
    .bind(book.rating)
    .bind(book.bookmark_ms)
    .bind(book.last_played.map(|t| t.to_rfc3339()))
    .bind(book.date_added.map(|t| t.to_rfc3339()))
    .bind(&book.file_hash)
    .bind(&book.original_file_hash)
    .bind(&book.organized_file_hash)
    .bind(book.library_state.as_str())
    .bind(&book.import_source)
    .bind(book.id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("book {}", book.id)));
    }

    Ok(())
}

pub async fn load_book(pool: &SqlitePool, id: Uuid) -> Result<Option<CatalogBook>> {
    load_book_where(pool, "id = ?", &id.to_string()).await
}

pub async fn load_book_by_path(pool: &SqlitePool, file_path: &str) -> Result<Option<CatalogBook>> {
    load_book_where(pool, "file_path = ?", file_path).await
}

/// Match against current, original or organized hash
pub async fn load_book_by_hash(pool: &SqlitePool, hash: &str) -> Result<Option<CatalogBook>> {
    let sql = format!(
        "SELECT {} FROM books \
         WHERE file_hash = ?1 OR original_file_hash = ?1 OR organized_file_hash = ?1 \
         ORDER BY created_at, rowid LIMIT 1",
        BOOK_COLUMNS
    );
    let row = sqlx::query(&sql).bind(hash).fetch_optional(pool).await?;
    row.map(|r| book_from_row(&r)).transpose()
}

pub async fn load_book_by_persistent_id(
    pool: &SqlitePool,
    persistent_id: &str,
) -> Result<Option<CatalogBook>> {
    if persistent_id.is_empty() {
        return Ok(None);
    }
    load_book_where(pool, "persistent_id = ?", persistent_id).await
}

pub async fn load_books_by_import_source(
    pool: &SqlitePool,
    source: &str,
    state: LibraryState,
) -> Result<Vec<CatalogBook>> {
    let sql = format!(
        "SELECT {} FROM books WHERE import_source = ? AND library_state = ? \
         ORDER BY created_at, rowid",
        BOOK_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(source)
        .bind(state.as_str())
        .fetch_all(pool)
        .await?;

    rows.iter().map(book_from_row).collect()
}

pub async fn count_books(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn is_hash_blocked(pool: &SqlitePool, hash: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM blocked_hashes WHERE hash = ?")
        .bind(hash)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

pub async fn block_hash(pool: &SqlitePool, hash: &str, reason: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO blocked_hashes (hash, reason) VALUES (?, ?)
        ON CONFLICT(hash) DO UPDATE SET reason = excluded.reason
        "#,
    )
    .bind(hash)
    .bind(reason)
    .execute(pool)
    .await?;
    Ok(())
}

async fn load_book_where(
    pool: &SqlitePool,
    predicate: &str,
    value: &str,
) -> Result<Option<CatalogBook>> {
    let sql = format!(
        "SELECT {} FROM books WHERE {} ORDER BY created_at, rowid LIMIT 1",
        BOOK_COLUMNS, predicate
    );
    let row = sqlx::query(&sql).bind(value).fetch_optional(pool).await?;
    row.map(|r| book_from_row(&r)).transpose()
}

fn book_from_row(row: &SqliteRow) -> Result<CatalogBook> {
    let id: String = row.get("id");
    let state: String = row.get("library_state");

    Ok(CatalogBook {
        id: parse_uuid(&id)?,
        title: row.get("title"),
        file_path: row.get("file_path"),
        format: row.get("format"),
        duration_seconds: row.get("duration_seconds"),
        total_size: row.get("total_size"),
        release_year: row.get("release_year"),
        narrator: row.get("narrator"),
        edition: row.get("edition"),
        author_id: row.get("author_id"),
        series_id: row.get("series_id"),
        series_position: row.get("series_position"),
        persistent_id: row.get("persistent_id"),
        play_count: row.get("play_count"),
        rating: row.get("rating"),
        bookmark_ms: row.get("bookmark_ms"),
        last_played: parse_timestamp(row.get("last_played")),
        date_added: parse_timestamp(row.get("date_added")),
        file_hash: row.get("file_hash"),
        original_file_hash: row.get("original_file_hash"),
        organized_file_hash: row.get("organized_file_hash"),
        library_state: state.parse().map_err(Error::Internal)?,
        import_source: row.get("import_source"),
    })
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("Invalid UUID '{}': {}", value, e)))
}

pub(crate) fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}
