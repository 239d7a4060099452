//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::NotifyConfig;
use crate::domain::MarketStore;
use crate::service::{MarketService, NotifyHub};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Sessions, subscriptions and the publication bus.
    pub hub: Arc<NotifyHub>,
    /// Marketplace reads and writes.
    pub market: Arc<MarketService>,
}

impl AppState {
    /// Starts the notification core and wires an empty market store to it.
    ///
    /// Background tasks stop when `shutdown` is cancelled.
    #[must_use]
    pub fn start(config: NotifyConfig, shutdown: CancellationToken) -> Self {
        let hub = Arc::new(NotifyHub::start(config, shutdown));
        let market = Arc::new(MarketService::new(
            Arc::new(MarketStore::new()),
            hub.bus().clone(),
        ));
        Self { hub, market }
    }
}
