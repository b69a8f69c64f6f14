use std::sync::Arc;

use gc_domain_engine::ports::{AccountRepository, BundleRepository, CqrsStore, MeterDataClient, WhitelistRepository};
use gc_infra_db::{AccountReadRepository, BundleReadRepository, CqrsCoordinator, StoreRole, TursoClient, WhitelistReadRepository};
use gc_infra_meter::HttpMeterDataClient;

use crate::config::Settings;

/// Everything a handler needs, composed once at startup and cheap to
/// clone per request (every field is an `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub bundles: Arc<dyn BundleRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub whitelist: Arc<dyn WhitelistRepository>,
    pub meter_client: Arc<dyn MeterDataClient>,
    pub store: Arc<dyn CqrsStore>,
    pub settings: Arc<Settings>,
    /// Raw connection to the write store, for entities the domain ports
    /// don't cover yet (metadata de-duplication at import time, user
    /// and API key lookups for auth).
    pub write_store: TursoClient,
    pub read_store: TursoClient,
}

impl AppState {
    pub async fn connect(settings: Settings) -> Result<Self, anyhow::Error> {
        let write_store = TursoClient::connect(
            &settings.write_database_url,
            settings.write_database_token.clone(),
            StoreRole::Write,
        )
        .await?;
        let read_store = TursoClient::connect(
            &settings.read_database_url,
            settings.read_database_token.clone(),
            StoreRole::Read,
        )
        .await?;
        let event_store = TursoClient::connect(
            &settings.event_database_url,
            settings.event_database_token.clone(),
            StoreRole::Event,
        )
        .await?;

        let store = Arc::new(CqrsCoordinator {
            write_store: write_store.clone(),
            read_store: read_store.clone(),
            event_store,
        });

        let bundles = Arc::new(BundleReadRepository {
            read_store: read_store.clone(),
        });
        let accounts = Arc::new(AccountReadRepository {
            read_store: read_store.clone(),
        });
        let whitelist = Arc::new(WhitelistReadRepository {
            read_store: read_store.clone(),
        });
        let meter_client = Arc::new(HttpMeterDataClient::new(
            settings.meter_base_url.clone(),
            settings.meter_api_key.clone(),
        ));

        Ok(Self {
            bundles,
            accounts,
            whitelist,
            meter_client,
            store,
            settings: Arc::new(settings),
            write_store,
            read_store,
        })
    }
}
