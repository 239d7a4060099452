//! # marina-gateway
//!
//! Backend for a boat rental and sales marketplace with live queries.
//!
//! Every query endpoint can subscribe: the caller keeps the first result and
//! the server pushes JSON patches over a Server-Sent Events stream whenever
//! a later write changes that result. Writes publish an invalidation per
//! collection; the publication bus fans it out to every streaming session,
//! each session re-runs its subscribed queries and diffs them against the
//! last result it delivered.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, EventSource)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── Stream Handler (stream/)
//!     │
//!     ├── MarketService, NotifyHub (service/)
//!     │
//!     ├── PublicationBus, Heartbeat (domain/)
//!     ├── SessionRegistry, SubscriptionTable (domain/)
//!     ├── ResponseDiffer (domain/diff)
//!     │
//!     └── MarketStore (in-memory tables)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod stream;
