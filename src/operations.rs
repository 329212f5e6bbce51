use std::sync::Arc;

use anyhow::anyhow;
use sqlx::{MySqlPool, PgPool};
use tracing::{debug, info};

use crate::db;
use crate::error::{LibError, Result};
use crate::graph::GraphClient;
use crate::models::{
    GroupDeletion, GroupEvent, GroupUpdate, MemberRef, MembershipRemoval, NewGroup, NewMembership,
};
use crate::profile::ProfileClient;
use crate::security;

/// Handlers for the replicated operations. Store handles are constructed at
/// startup and injected here; each handler call borrows one connection per
/// store for its duration and releases it on every exit path.
///
/// There is no cross-store transaction. The authorization store's local
/// transaction is the last to commit; the graph patch and the security store
/// commit that precede it are not compensated if a later step fails.
pub struct SyncOperations {
    auth: Arc<MySqlPool>,
    security: Arc<PgPool>,
    graph: GraphClient,
    profiles: ProfileClient,
}

impl SyncOperations {
    pub fn new(
        auth: Arc<MySqlPool>,
        security: Arc<PgPool>,
        graph: GraphClient,
        profiles: ProfileClient,
    ) -> Self {
        Self {
            auth,
            security,
            graph,
            profiles,
        }
    }

    pub async fn execute(&self, event: GroupEvent) -> Result<()> {
        match event {
            GroupEvent::Create(group) => self.create_group(group).await,
            GroupEvent::Update(update) => self.update_group(update).await,
            GroupEvent::Delete(deletion) => self.delete_groups(deletion).await,
            GroupEvent::AddMember(membership) => self.add_member(membership).await,
            GroupEvent::RemoveMember(removal) => self.remove_member(removal).await,
        }
    }

    async fn create_group(&self, group: NewGroup) -> Result<()> {
        debug!(name = %group.name, "checking for existing group");
        if db::find_group_by_name(&self.auth, &group.name).await?.is_some() {
            return Err(LibError::conflict(
                "Group name is already in use",
                anyhow!("group named {:?} already exists", group.name),
            ));
        }

        let mut tx = self
            .auth
            .begin()
            .await
            .map_err(|err| begin_err(anyhow!(err)))?;

        let legacy_id = db::insert_group(&mut tx, &group).await?;
        debug!(%legacy_id, "group inserted into the authorization store");

        // Writes from here on are not covered by the authorization
        // transaction: a failure below rolls back the relational insert but
        // leaves the patched graph node (and any committed companion row)
        // in place.
        self.graph.set_legacy_id(group.id, legacy_id).await?;
        debug!(group_id = %group.id, %legacy_id, "graph node patched with legacy id");

        security::insert_companion(&self.security, legacy_id, &group.name, group.created_by.as_deref())
            .await?;

        tx.commit().await.map_err(|err| commit_err(anyhow!(err)))?;
        info!(group_id = %group.id, %legacy_id, name = %group.name, "group replicated");
        Ok(())
    }

    async fn update_group(&self, update: GroupUpdate) -> Result<()> {
        if !db::group_exists(&self.auth, update.legacy_id).await? {
            return Err(LibError::not_found(
                "Group does not exist",
                anyhow!("no group with legacy id {}", update.legacy_id),
            ));
        }

        if update.name != update.old_name
            && db::find_group_by_name(&self.auth, &update.name).await?.is_some()
        {
            return Err(LibError::conflict(
                "Group name is already used",
                anyhow!("group named {:?} already exists", update.name),
            ));
        }

        let mut tx = self
            .auth
            .begin()
            .await
            .map_err(|err| begin_err(anyhow!(err)))?;

        db::update_group(&mut tx, &update).await?;
        security::update_companion(&self.security, update.legacy_id, &update.name).await?;

        tx.commit().await.map_err(|err| commit_err(anyhow!(err)))?;
        info!(legacy_id = %update.legacy_id, name = %update.name, "group updated");
        Ok(())
    }

    async fn delete_groups(&self, deletion: GroupDeletion) -> Result<()> {
        // Every reference is checked before the first write so that a single
        // unknown id fails the whole message without touching any store.
        for group_id in &deletion.groups {
            if !db::group_exists(&self.auth, *group_id).await? {
                return Err(LibError::not_found(
                    "Group does not exist",
                    anyhow!("no group with legacy id {}", group_id),
                ));
            }
        }

        let mut tx = self
            .auth
            .begin()
            .await
            .map_err(|err| begin_err(anyhow!(err)))?;

        for group_id in &deletion.groups {
            let memberships = db::delete_group_memberships(&mut tx, *group_id).await?;
            db::delete_group(&mut tx, *group_id).await?;
            debug!(legacy_id = %group_id, memberships, "group row deleted");
        }

        security::delete_companions(&self.security, &deletion.groups).await?;

        tx.commit().await.map_err(|err| commit_err(anyhow!(err)))?;
        info!(count = deletion.groups.len(), "groups deleted");
        Ok(())
    }

    async fn add_member(&self, membership: NewMembership) -> Result<()> {
        if !db::group_exists(&self.auth, membership.group).await? {
            return Err(LibError::not_found(
                "Group does not exist",
                anyhow!("no group with legacy id {}", membership.group),
            ));
        }

        let member = match &membership.member {
            MemberRef::Legacy(member_id) => *member_id,
            MemberRef::External(universal_uid) => {
                self.profiles.resolve_member(universal_uid).await?
            }
        };

        let mut tx = self
            .auth
            .begin()
            .await
            .map_err(|err| begin_err(anyhow!(err)))?;

        db::insert_membership(&mut tx, &membership, member).await?;

        tx.commit().await.map_err(|err| commit_err(anyhow!(err)))?;
        info!(
            group = %membership.group,
            member = %member,
            membership_type = membership.membership_type.as_db_value(),
            "membership added"
        );
        Ok(())
    }

    async fn remove_member(&self, removal: MembershipRemoval) -> Result<()> {
        if !db::group_exists(&self.auth, removal.group).await? {
            return Err(LibError::not_found(
                "Group does not exist",
                anyhow!("no group with legacy id {}", removal.group),
            ));
        }

        let mut tx = self
            .auth
            .begin()
            .await
            .map_err(|err| begin_err(anyhow!(err)))?;

        let removed = db::delete_membership(&mut tx, removal.group, removal.member).await?;

        tx.commit().await.map_err(|err| commit_err(anyhow!(err)))?;
        if removed == 0 {
            debug!(group = %removal.group, member = %removal.member, "no membership row matched");
        }
        info!(group = %removal.group, member = %removal.member, "membership removed");
        Ok(())
    }
}

fn begin_err(source: anyhow::Error) -> LibError {
    LibError::database("Failed to start authorization store transaction", source)
}

fn commit_err(source: anyhow::Error) -> LibError {
    LibError::database("Failed to commit authorization store transaction", source)
}
