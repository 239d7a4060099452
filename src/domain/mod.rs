//! Domain layer: marketplace records and the change-notification core.
//!
//! The notification core is made of the snapshot differ, per-session
//! subscription tables, the session registry, the publication bus actor and
//! the heartbeat. The marketplace store and record shapes feed it.

pub mod collection;
pub mod diff;
pub mod heartbeat;
pub mod ids;
pub mod market_store;
pub mod publication;
pub mod publication_bus;
pub mod query;
pub mod records;
pub mod session;
pub mod snapshot;
pub mod subscription;

pub use collection::CollectionKind;
pub use diff::diff_snapshots;
pub use heartbeat::spawn_heartbeat;
pub use ids::{ConnectionId, SessionId, SubscriptionId};
pub use market_store::MarketStore;
pub use publication::Publication;
pub use publication_bus::{PublicationBus, PublicationReceiver, PublishOutcome};
pub use query::{Invocation, QueryHandler, QueryRequest, QueryResponse};
pub use session::{Identity, Session, SessionRegistry};
pub use snapshot::Snapshot;
pub use subscription::{Subscription, SubscriptionTable};
