use anyhow::anyhow;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::{LibError, Result};
use crate::models::LegacyGroupId;

/// Connect to the legacy security store holding the per-group access-control
/// companion rows.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .map_err(|err| db_err("Failed to connect to the security store", err))
}

fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    LibError::database(public, anyhow!(err))
}

/// Insert the companion row keyed by the authorization store's generated id.
/// `challenge_group_ind` is always 1 for rows written by this worker.
pub async fn insert_companion(
    pool: &PgPool,
    group_id: LegacyGroupId,
    description: &str,
    create_user_id: Option<&str>,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| db_err("Failed to start security store transaction", err))?;

    sqlx::query(
        r#"
        INSERT INTO security_groups (group_id, description, create_user_id, challenge_group_ind)
        VALUES ($1, $2, $3, 1)
        "#,
    )
    .bind(group_id.0)
    .bind(description)
    .bind(create_user_id)
    .execute(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to insert security group record", err))?;

    tx.commit()
        .await
        .map_err(|err| db_err("Failed to commit security store transaction", err))?;

    Ok(())
}

/// The companion row mirrors the group name in its description column.
pub async fn update_companion(
    pool: &PgPool,
    group_id: LegacyGroupId,
    description: &str,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| db_err("Failed to start security store transaction", err))?;

    sqlx::query(
        r#"
        UPDATE security_groups
        SET description = $1
        WHERE group_id = $2
        "#,
    )
    .bind(description)
    .bind(group_id.0)
    .execute(&mut *tx)
    .await
    .map_err(|err| db_err("Failed to update security group record", err))?;

    tx.commit()
        .await
        .map_err(|err| db_err("Failed to commit security store transaction", err))?;

    Ok(())
}

pub async fn delete_companions(pool: &PgPool, group_ids: &[LegacyGroupId]) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|err| db_err("Failed to start security store transaction", err))?;

    for group_id in group_ids {
        sqlx::query(
            r#"
            DELETE FROM security_groups
            WHERE group_id = $1
            "#,
        )
        .bind(group_id.0)
        .execute(&mut *tx)
        .await
        .map_err(|err| db_err("Failed to delete security group record", err))?;
    }

    tx.commit()
        .await
        .map_err(|err| db_err("Failed to commit security store transaction", err))?;

    Ok(())
}
