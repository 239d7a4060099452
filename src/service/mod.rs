//! Service layer: business logic orchestration.
//!
//! [`NotifyHub`] owns sessions, subscriptions and the publication bus.
//! [`MarketService`] reads and writes marketplace records and publishes an
//! invalidation after every write.

pub mod market_service;
pub mod notify_hub;

pub use market_service::{MarketQueries, MarketService};
pub use notify_hub::NotifyHub;
