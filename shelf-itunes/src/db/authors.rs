//! Author and series database operations

use crate::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Look up an author by exact name, inserting it when absent
pub async fn get_or_create_author(pool: &SqlitePool, name: &str) -> Result<i64> {
    sqlx::query("INSERT OR IGNORE INTO authors (name) VALUES (?)")
        .bind(name)
        .execute(pool)
        .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM authors WHERE name = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;

    Ok(id)
}

/// Look up a series by name and author, inserting it when absent
pub async fn get_or_create_series(
    pool: &SqlitePool,
    name: &str,
    author_id: Option<i64>,
) -> Result<i64> {
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM series WHERE name = ? AND author_id IS ? LIMIT 1")
            .bind(name)
            .bind(author_id)
            .fetch_optional(pool)
            .await?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let result = sqlx::query("INSERT INTO series (name, author_id) VALUES (?, ?)")
        .bind(name)
        .bind(author_id)
        .execute(pool)
        .await?;

    Ok(result.last_insert_rowid())
}

/// Replace the author links of a book, preserving the given order
pub async fn replace_book_authors(
    pool: &SqlitePool,
    book_id: Uuid,
    author_ids: &[i64],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM book_authors WHERE book_id = ?")
        .bind(book_id.to_string())
        .execute(&mut *tx)
        .await?;

    for (position, author_id) in author_ids.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO book_authors (book_id, author_id, role, position)
            VALUES (?, ?, 'author', ?)
            "#,
        )
        .bind(book_id.to_string())
        .bind(author_id)
        .bind(position as i64)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}
