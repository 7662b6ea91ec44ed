//! Store, bus and dispatcher wiring.

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value as JsonValue;

use catalog_events::{EventEnvelope, InMemoryEventBus};
use catalog_infra::{CatalogStore, CommandDispatcher, InMemoryCatalogStore, PostgresCatalogStore};

use crate::config::AppConfig;

pub type CatalogBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

pub struct AppServices {
    pub dispatcher: CommandDispatcher<CatalogBus>,
}

/// Postgres when `DATABASE_URL` is configured (migrations are applied on
/// startup), the in-memory store otherwise.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let store: Arc<dyn CatalogStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresCatalogStore::connect(url, config.database_max_connections)
                .await
                .context("failed to connect to the catalog database")?;
            store.migrate().await.context("failed to apply catalog migrations")?;
            tracing::info!(max_connections = config.database_max_connections, "using postgres catalog store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory catalog store");
            Arc::new(InMemoryCatalogStore::new())
        }
    };

    let bus: CatalogBus = Arc::new(InMemoryEventBus::new());
    Ok(AppServices {
        dispatcher: CommandDispatcher::new(store, bus, config.products.clone()),
    })
}
