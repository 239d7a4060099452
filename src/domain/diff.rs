//! Minimal patch between two snapshots.
//!
//! Only collections populated on *both* sides are compared; a collection
//! missing from either side is skipped, never treated as empty. Within a
//! collection:
//!
//! | baseline | fresh | patch entry |
//! |----------|-------|-------------|
//! | present  | absent | `null` (delete) |
//! | present  | different value | fresh value (update) |
//! | present  | equal value | omitted |
//! | absent   | present | fresh value (insert) |

use super::CollectionKind;
use super::snapshot::{RecordSet, Snapshot};

/// Computes the patch that turns `baseline` into `fresh`.
///
/// Returns `None` when nothing changed in any collection populated on both
/// sides. Otherwise the patch populates only the collections that changed.
#[must_use]
pub fn diff_snapshots(fresh: &Snapshot, baseline: &Snapshot) -> Option<Snapshot> {
    let mut patch = Snapshot::new();
    for kind in CollectionKind::ALL {
        let (Some(next), Some(last)) = (fresh.records(kind), baseline.records(kind)) else {
            continue;
        };
        let changes = diff_records(next, last);
        if !changes.is_empty() {
            *patch.populate(kind) = changes;
        }
    }
    if patch.is_empty() { None } else { Some(patch) }
}

fn diff_records(next: &RecordSet, last: &RecordSet) -> RecordSet {
    let mut changes = RecordSet::new();
    for (id, last_value) in last {
        match next.get(id) {
            Some(next_value) if next_value == last_value => {}
            Some(next_value) => {
                changes.insert(*id, next_value.clone());
            }
            None => {
                changes.insert(*id, None);
            }
        }
    }
    for (id, next_value) in next {
        if !last.contains_key(id) {
            changes.insert(*id, next_value.clone());
        }
    }
    changes
}
