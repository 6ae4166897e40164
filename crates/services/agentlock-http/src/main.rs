use agentlock_common::config::AppConfig;
use agentlock_common::tracing::setup_tracing;
use agentlock_core::kv::{KeyValueStore, RedisStore};
use agentlock_core::remote::github::GitHubRemoteRepository;
use agentlock_core::remote::RemoteRepository;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let json_logs = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);
    setup_tracing(json_logs);

    let config = AppConfig::load()?;
    tracing::info!(host = %config.server.host, port = config.server.port, "loaded configuration");

    let kv: Arc<dyn KeyValueStore> = Arc::new(RedisStore::connect(&config.kv.url).await?);
    let remote: Arc<dyn RemoteRepository> = Arc::new(GitHubRemoteRepository::new(
        config.remote.api_base.clone(),
        config.remote.token.clone(),
        config.remote.request_timeout_ms,
    )?);

    agentlock_server::run(config, kv, remote).await?;
    Ok(())
}
