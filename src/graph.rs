use anyhow::anyhow;
use neo4rs::{query, Graph};
use tracing::warn;

use crate::error::{LibError, Result};
use crate::models::{GroupId, LegacyGroupId};

/// Thin wrapper over the Bolt driver. The worker never creates `Group`
/// nodes; they are owned by the upstream producer and only patched here.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|err| LibError::graph("Failed to connect to the graph store", anyhow!(err)))?;
        Ok(Self { graph })
    }

    /// Back-fill the generated legacy id onto the pre-existing `Group` node.
    /// The id is stored stringified, matching what downstream readers expect.
    ///
    /// There is no compensating rollback for this patch: if a later step of
    /// the create handler fails, the node keeps its `oldId`.
    pub async fn set_legacy_id(&self, id: GroupId, legacy_id: LegacyGroupId) -> Result<()> {
        let q = query(
            "MATCH (g:Group {id: $id})
             SET g.oldId = $oldId
             RETURN g.id AS id",
        )
        .param("id", id.to_string())
        .param("oldId", legacy_id.to_string());

        let mut stream = self
            .graph
            .execute(q)
            .await
            .map_err(|err| LibError::graph("Failed to patch group node", anyhow!(err)))?;

        // A missing node is not an error: the upstream system may not have
        // replicated the node yet. MATCH simply patches nothing.
        if stream
            .next()
            .await
            .map_err(|err| LibError::graph("Failed to read graph response", anyhow!(err)))?
            .is_none()
        {
            warn!(group_id = %id, legacy_id = %legacy_id, "no graph node matched group id");
        }

        Ok(())
    }
}
