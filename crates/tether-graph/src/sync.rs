//! Delta sync: the substrate boundary.
//!
//! A delta is everything the receiver has not observed, filtered against a
//! version vector: changed node records (whole records — field merges are
//! idempotent, so over-shipping is harmless), node removal markers, and
//! tombstone records. Applying a delta is commutative, associative, and
//! idempotent; merge order across replicas never changes the converged
//! state.
//!
//! `since` must be the receiving replica's current version vector — the
//! standard exchange is `b.apply_delta(&a.export_delta(&b.version())?)`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use tether_crdt::{Stamp, VersionVector};

use crate::store::{GraphDoc, NodeRecord};
use crate::tombstone::TombstoneRecord;

/// Wire form of a delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DeltaPayload {
    /// Sender's full version vector at export time.
    pub version: VersionVector,
    pub nodes: Vec<(String, NodeRecord)>,
    pub node_removals: Vec<(String, Stamp)>,
    pub tombstones: Vec<TombstoneRecord>,
}

/// Collect everything `since` has not seen.
pub(crate) fn export(doc: &GraphDoc, since: &VersionVector) -> DeltaPayload {
    let nodes: Vec<(String, NodeRecord)> = doc
        .store
        .nodes
        .iter()
        .filter(|(_, record)| record.changed_since(since))
        .map(|(id, record)| (id.clone(), record.clone()))
        .collect();
    let node_removals: Vec<(String, Stamp)> = doc
        .store
        .node_removals
        .iter()
        .filter(|(_, stamp)| !since.contains(stamp))
        .map(|(id, stamp)| (id.clone(), stamp.clone()))
        .collect();
    let tombstones: Vec<TombstoneRecord> = doc
        .log
        .records()
        .iter()
        .filter(|record| !since.contains(&record.stamp))
        .cloned()
        .collect();

    debug!(
        nodes = nodes.len(),
        removals = node_removals.len(),
        tombstones = tombstones.len(),
        "delta exported"
    );
    DeltaPayload {
        version: doc.version.clone(),
        nodes,
        node_removals,
        tombstones,
    }
}

/// Merge a delta into the document. Returns true if anything changed.
///
/// Removal markers land before records so a record superseded by a marker
/// in the same payload is discarded on arrival (deletion precedence).
pub(crate) fn apply(doc: &mut GraphDoc, payload: &DeltaPayload) -> bool {
    let mut changed = false;

    for (id, stamp) in &payload.node_removals {
        doc.observe(stamp);
        if doc.store.merge_removal(id, stamp) {
            changed = true;
        }
    }
    for (id, record) in &payload.nodes {
        let mut observed = VersionVector::new();
        record.observe_into(&mut observed);
        doc.version.merge(&observed);
        doc.counter = doc.counter.max(observed.max_counter());
        if doc.store.merge_record(id, record) {
            changed = true;
        }
    }
    for record in &payload.tombstones {
        doc.observe(&record.stamp);
    }
    if doc.log.merge(&payload.tombstones) {
        changed = true;
    }
    doc.version.merge(&payload.version);
    doc.counter = doc.counter.max(payload.version.max_counter());

    debug!(changed, "delta applied");
    changed
}
