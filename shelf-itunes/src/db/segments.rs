//! Book segment database operations

use crate::db::books::parse_uuid;
use crate::models::BookSegment;
use crate::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub async fn save_segment(pool: &SqlitePool, segment: &BookSegment) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO book_segments (
            id, book_id, file_path, format, size_bytes, duration_seconds,
            track_number, total_tracks, persistent_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(segment.id.to_string())
    .bind(segment.book_id.to_string())
    .bind(&segment.file_path)
    .bind(&segment.format)
    .bind(segment.size_bytes)
    .bind(segment.duration_seconds)
    .bind(segment.track_number.map(i64::from))
    .bind(segment.total_tracks.map(i64::from))
    .bind(&segment.persistent_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Point a segment at a new file; returns false when the id is unknown
pub async fn update_segment_path(pool: &SqlitePool, segment_id: Uuid, file_path: &str) -> Result<bool> {
    let result = sqlx::query("UPDATE book_segments SET file_path = ? WHERE id = ?")
        .bind(file_path)
        .bind(segment_id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Segments of a book in track order (unnumbered last)
pub async fn load_segments_for_book(pool: &SqlitePool, book_id: Uuid) -> Result<Vec<BookSegment>> {
    let rows = sqlx::query(
        r#"
        SELECT id, book_id, file_path, format, size_bytes, duration_seconds,
               track_number, total_tracks, persistent_id
        FROM book_segments
        WHERE book_id = ?
        ORDER BY track_number IS NULL, track_number, rowid
        "#,
    )
    .bind(book_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(segment_from_row).collect()
}

pub async fn load_segment_by_persistent_id(
    pool: &SqlitePool,
    persistent_id: &str,
) -> Result<Option<BookSegment>> {
    if persistent_id.is_empty() {
        return Ok(None);
    }

    let row = sqlx::query(
        r#"
        SELECT id, book_id, file_path, format, size_bytes, duration_seconds,
               track_number, total_tracks, persistent_id
        FROM book_segments
        WHERE persistent_id = ?
        ORDER BY rowid
        LIMIT 1
        "#,
    )
    .bind(persistent_id)
    .fetch_optional(pool)
    .await?;

    row.map(|r| segment_from_row(&r)).transpose()
}

fn segment_from_row(row: &SqliteRow) -> Result<BookSegment> {
    let id: String = row.get("id");
    let book_id: String = row.get("book_id");
    let track_number: Option<i64> = row.get("track_number");
    let total_tracks: Option<i64> = row.get("total_tracks");

    Ok(BookSegment {
        id: parse_uuid(&id)?,
        book_id: parse_uuid(&book_id)?,
        file_path: row.get("file_path"),
        format: row.get("format"),
        size_bytes: row.get("size_bytes"),
        duration_seconds: row.get("duration_seconds"),
        track_number: track_number.and_then(|n| u32::try_from(n).ok()),
        total_tracks: total_tracks.and_then(|n| u32::try_from(n).ok()),
        persistent_id: row.get("persistent_id"),
    })
}
