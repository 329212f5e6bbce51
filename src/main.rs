use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use groups_sync::config::Config;
use groups_sync::consumer::EventConsumer;
use groups_sync::graph::GraphClient;
use groups_sync::operations::SyncOperations;
use groups_sync::profile::ProfileClient;
use groups_sync::{db, health, security};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let auth = db::connect(&config.authorization_db_url, config.authorization_pool_size)
        .await
        .context("failed to connect to the authorization store")?;
    let security_pool = security::connect(&config.security_db_url, config.security_pool_size)
        .await
        .context("failed to connect to the security store")?;
    let graph = GraphClient::connect(&config.graph.uri, &config.graph.user, &config.graph.password)
        .await
        .context("failed to connect to the graph store")?;
    let profiles = ProfileClient::new(config.profile.clone())
        .context("failed to build the profile service client")?;

    let operations = SyncOperations::new(Arc::new(auth), Arc::new(security_pool), graph, profiles);
    let consumer =
        EventConsumer::new(&config, operations).context("failed to start the broker consumer")?;

    tokio::spawn(health::serve(config.health_bind, consumer.status()));

    consumer.run().await.context("consumer loop failed")
}
