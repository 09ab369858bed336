//! Job parameter and checkpoint rows
//!
//! Both tables hold opaque JSON documents keyed by job id. Parameters are
//! write-once; state is overwritten at every checkpoint.

use crate::Result;
use sqlx::SqlitePool;

/// Store parameters for a job; returns `false` if a row already exists
pub async fn insert_params(pool: &SqlitePool, operation_id: &str, params_json: &str) -> Result<bool> {
    let result =
        sqlx::query("INSERT OR IGNORE INTO operation_params (operation_id, params) VALUES (?, ?)")
            .bind(operation_id)
            .bind(params_json)
            .execute(pool)
            .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn load_params(pool: &SqlitePool, operation_id: &str) -> Result<Option<String>> {
    let params: Option<String> =
        sqlx::query_scalar("SELECT params FROM operation_params WHERE operation_id = ?")
            .bind(operation_id)
            .fetch_optional(pool)
            .await?;
    Ok(params)
}

pub async fn upsert_state(pool: &SqlitePool, operation_id: &str, state_json: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO operation_state (operation_id, state, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(operation_id) DO UPDATE SET
            state = excluded.state,
            updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(operation_id)
    .bind(state_json)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_state(pool: &SqlitePool, operation_id: &str) -> Result<Option<String>> {
    let state: Option<String> =
        sqlx::query_scalar("SELECT state FROM operation_state WHERE operation_id = ?")
            .bind(operation_id)
            .fetch_optional(pool)
            .await?;
    Ok(state)
}

/// Delete params and state together
pub async fn delete_operation(pool: &SqlitePool, operation_id: &str) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM operation_state WHERE operation_id = ?")
        .bind(operation_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM operation_params WHERE operation_id = ?")
        .bind(operation_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}
