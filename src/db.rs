use anyhow::anyhow;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{FromRow, MySql, MySqlPool};

use crate::error::{LibError, Result};
use crate::models::{GroupUpdate, LegacyGroupId, LegacyMemberId, NewGroup, NewMembership};

pub type AuthTx<'a> = sqlx::Transaction<'a, MySql>;

/// Connect to the authorization store. Called once at startup; the pool is
/// injected into the operations layer and closed on shutdown by drop.
pub async fn connect(url: &str, max_connections: u32) -> Result<MySqlPool> {
    MySqlPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .map_err(|err| db_err("Failed to connect to the authorization store", err))
}

#[derive(Debug, Clone, FromRow)]
pub struct GroupRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub domain: Option<String>,
    pub private_group: bool,
    pub self_register: bool,
}

fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    LibError::database(public, anyhow!(err))
}

/// Name lookup used by the duplicate and existence checks. This is a
/// read-then-write pattern with no unique constraint behind it; concurrent
/// writers can race it.
pub async fn find_group_by_name(pool: &MySqlPool, name: &str) -> Result<Option<GroupRow>> {
    let row = sqlx::query_as::<_, GroupRow>(
        r#"
        SELECT id, name, description, domain, private_group, self_register
        FROM `group`
        WHERE name = ?
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await
    .map_err(|err| db_err("Failed to query group by name", err))?;

    Ok(row)
}

pub async fn group_exists(pool: &MySqlPool, group_id: LegacyGroupId) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM `group`
        WHERE id = ?
        "#,
    )
    .bind(group_id.0)
    .fetch_one(pool)
    .await
    .map_err(|err| db_err("Failed to query group by id", err))?;

    Ok(count > 0)
}

/// Insert the group row and return the generated legacy id.
pub async fn insert_group(tx: &mut AuthTx<'_>, group: &NewGroup) -> Result<LegacyGroupId> {
    let result = sqlx::query(
        r#"
        INSERT INTO `group` (
            name,
            description,
            domain,
            private_group,
            self_register,
            createdBy,
            modifiedBy,
            createdAt,
            modifiedAt
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&group.name)
    .bind(&group.description)
    .bind(&group.domain)
    .bind(group.private_group)
    .bind(group.self_register)
    .bind(&group.created_by)
    .bind(&group.created_by)
    .bind(group.audit_at)
    .bind(group.audit_at)
    .execute(&mut **tx)
    .await
    .map_err(|err| db_err("Failed to insert group", err))?;

    Ok(LegacyGroupId(result.last_insert_id() as i64))
}

/// Overwrite the mutable columns, targeting the row by legacy id. Omitted
/// description/domain null-fill their columns.
pub async fn update_group(tx: &mut AuthTx<'_>, update: &GroupUpdate) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE `group`
        SET name = ?,
            description = ?,
            domain = ?,
            private_group = ?,
            self_register = ?,
            modifiedBy = ?,
            modifiedAt = ?
        WHERE id = ?
        "#,
    )
    .bind(&update.name)
    .bind(&update.description)
    .bind(&update.domain)
    .bind(update.private_group)
    .bind(update.self_register)
    .bind(&update.updated_by)
    .bind(update.audit_at)
    .bind(update.legacy_id.0)
    .execute(&mut **tx)
    .await
    .map_err(|err| db_err("Failed to update group", err))?;

    Ok(())
}

pub async fn delete_group_memberships(
    tx: &mut AuthTx<'_>,
    group_id: LegacyGroupId,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM group_membership
        WHERE group_id = ?
        "#,
    )
    .bind(group_id.0)
    .execute(&mut **tx)
    .await
    .map_err(|err| db_err("Failed to delete group memberships", err))?;

    Ok(result.rows_affected())
}

pub async fn delete_group(tx: &mut AuthTx<'_>, group_id: LegacyGroupId) -> Result<()> {
    sqlx::query(
        r#"
        DELETE FROM `group`
        WHERE id = ?
        "#,
    )
    .bind(group_id.0)
    .execute(&mut **tx)
    .await
    .map_err(|err| db_err("Failed to delete group", err))?;

    Ok(())
}

pub async fn insert_membership(
    tx: &mut AuthTx<'_>,
    membership: &NewMembership,
    member: LegacyMemberId,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO group_membership (
            group_id,
            member_id,
            membership_type,
            createdBy,
            modifiedBy,
            createdAt,
            modifiedAt
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(membership.group.0)
    .bind(member.0)
    .bind(membership.membership_type.as_db_value())
    .bind(&membership.created_by)
    .bind(&membership.created_by)
    .bind(membership.audit_at)
    .bind(membership.audit_at)
    .execute(&mut **tx)
    .await
    .map_err(|err| db_err("Failed to insert group membership", err))?;

    Ok(())
}

/// Membership rows are addressed by the (group, member) pair, never by a
/// dedicated record id.
pub async fn delete_membership(
    tx: &mut AuthTx<'_>,
    group_id: LegacyGroupId,
    member_id: LegacyMemberId,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM group_membership
        WHERE group_id = ? AND member_id = ?
        "#,
    )
    .bind(group_id.0)
    .bind(member_id.0)
    .execute(&mut **tx)
    .await
    .map_err(|err| db_err("Failed to delete group membership", err))?;

    Ok(result.rows_affected())
}
