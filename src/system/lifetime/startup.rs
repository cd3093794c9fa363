//! Startup: storage selection and service wiring

use std::sync::Arc;

use tracing::{error, info};

use crate::config::StaticConfig;
use crate::errors::Result;
use crate::identity::IdentityIssuer;
use crate::services::ShorteningService;
use crate::storage::StoreSelector;

/// Everything a boundary layer needs to serve requests.
pub struct AppContext {
    pub config: Arc<StaticConfig>,
    pub service: ShorteningService,
    pub identity: IdentityIssuer,
}

/// Builds the store, the deletion pipeline and the identity issuer.
///
/// A store that cannot be constructed or fails its health check is an
/// error here; the caller must not serve traffic.
pub async fn prepare(config: Arc<StaticConfig>) -> Result<AppContext> {
    let store = StoreSelector::create(&config.storage).await.inspect_err(|e| {
        error!("Storage backend unavailable: {}", e);
    })?;

    let service = ShorteningService::start(store, &config.deletion);
    let identity = IdentityIssuer::from_config(&config.identity);

    info!(
        "Shortener ready (backend: {}, deletion workers: {})",
        service.store().backend_name(),
        config.deletion.workers.max(1)
    );

    Ok(AppContext {
        config,
        service,
        identity,
    })
}
