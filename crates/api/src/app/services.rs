//! Back end assembly: event store choice, replay, settings.

use std::sync::Arc;

use nimbus_infra::services::ServiceError;
use nimbus_infra::{Crm, CrmSettings};

use crate::config::{AppConfig, Persistence};

/// Builds the back end the router serves. A Postgres store is replayed into
/// fresh read models before the first request.
pub async fn build_services(config: &AppConfig) -> Result<Arc<Crm>, ServiceError> {
    let settings = CrmSettings {
        duplicates: config.duplicates,
    };

    match &config.persistence {
        Persistence::InMemory => {
            tracing::info!("using in-memory event store");
            Ok(Arc::new(Crm::in_memory(settings)))
        }
        Persistence::Postgres {
            database_url,
            max_connections,
        } => open_postgres(database_url, *max_connections, settings).await,
    }
}

#[cfg(feature = "postgres")]
async fn open_postgres(
    database_url: &str,
    max_connections: u32,
    settings: CrmSettings,
) -> Result<Arc<Crm>, ServiceError> {
    use nimbus_infra::event_store::{EventStore, PostgresEventStore};

    let store = PostgresEventStore::connect(database_url, max_connections).await?;
    let store: Arc<dyn EventStore> = Arc::new(store);
    let crm = Crm::open(store, settings)?;
    tracing::info!("using postgres event store");
    Ok(Arc::new(crm))
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(
    _database_url: &str,
    _max_connections: u32,
    _settings: CrmSettings,
) -> Result<Arc<Crm>, ServiceError> {
    Err(ServiceError::Unavailable(
        "USE_PERSISTENT_STORES is set but this build lacks the postgres feature".into(),
    ))
}
