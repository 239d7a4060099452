//! Periodic ping publication.
//!
//! Pings never trigger subscription work, but they flow through the bus's
//! broadcast path like any other publication, so a connection that stopped
//! draining gets evicted even when nothing is being written.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{Publication, PublicationBus, PublishOutcome};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Spawns the heartbeat task. The first ping goes out one `period` after
/// the call; the task ends when `shutdown` is cancelled or the bus stops.
/// Periods below one millisecond are raised to one millisecond.
pub fn spawn_heartbeat(
    bus: PublicationBus,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let period = period.max(MIN_PERIOD);
    tokio::spawn(async move {
        let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let outcome = bus.publish(Publication::Ping);
                    trace!(?outcome, "heartbeat");
                    if outcome == PublishOutcome::Dropped {
                        break;
                    }
                }
            }
        }
        debug!("heartbeat stopped");
    })
}
