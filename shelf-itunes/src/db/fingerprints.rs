//! Stored export fingerprints

use crate::fingerprint::LibraryFingerprint;
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};

pub async fn upsert_fingerprint(pool: &SqlitePool, fingerprint: &LibraryFingerprint) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO library_fingerprints (path, size, mod_time, checksum, updated_at)
        VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(path) DO UPDATE SET
            size = excluded.size,
            mod_time = excluded.mod_time,
            checksum = excluded.checksum,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(&fingerprint.path)
    .bind(fingerprint.size)
    // Nanosecond precision so a reloaded fingerprint compares equal
    .bind(fingerprint.mod_time.to_rfc3339_opts(SecondsFormat::Nanos, true))
    .bind(i64::from(fingerprint.checksum))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_fingerprint(pool: &SqlitePool, path: &str) -> Result<Option<LibraryFingerprint>> {
    let row = sqlx::query("SELECT path, size, mod_time, checksum FROM library_fingerprints WHERE path = ?")
        .bind(path)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mod_time: String = row.get("mod_time");
    let checksum: i64 = row.get("checksum");

    Ok(Some(LibraryFingerprint {
        path: row.get("path"),
        size: row.get("size"),
        mod_time: DateTime::parse_from_rfc3339(&mod_time)
            .map_err(|e| Error::Internal(format!("Invalid fingerprint mtime '{}': {}", mod_time, e)))?
            .with_timezone(&Utc),
        checksum: u32::try_from(checksum).unwrap_or(0),
    }))
}
