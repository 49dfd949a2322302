//! Tombstone log: the causally-merged journal of removed elements.
//!
//! Every removal appends an entry carrying enough material to replay the
//! element later: a removed node keeps its full snapshot including every
//! edge that referenced it, a removed edge keeps its key and label. Records
//! are totally ordered by stamp, which gives an append order that is
//! identical on every replica once logs have merged — recency ranking in
//! the repair engine is based on this order, never on wall-clock time.
//!
//! The log is capacity-bounded: beyond a configured number of node entries
//! the oldest node entries are evicted, trading repair material for very
//! old splits against bounded memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use tether_core::models::{Dimension, Position};
use tether_crdt::Stamp;

use crate::store::GraphStore;

/// One directed edge reference inside a node snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRef {
    /// The other endpoint.
    pub peer: String,
    pub label: String,
}

/// A removed element, with the material needed to replay it.
///
/// Closed sum type: the repair engine matches it exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TombstoneEntry {
    /// A removed node with its full snapshot. `outgoing` holds refs where
    /// the node was the source, `incoming` where it was the target — both
    /// include edges that were already tombstoned elsewhere.
    Node {
        id: String,
        label: String,
        position: Position,
        dimension: Dimension,
        outgoing: Vec<EdgeRef>,
        incoming: Vec<EdgeRef>,
    },
    /// A removed directed edge.
    Edge {
        source: String,
        target: String,
        label: String,
    },
}

impl TombstoneEntry {
    /// Whether the element this entry describes is live again in the store.
    fn is_live_in(&self, store: &GraphStore) -> bool {
        match self {
            TombstoneEntry::Node { id, .. } => store.is_live(id),
            TombstoneEntry::Edge { source, target, .. } => store.edge_present(source, target),
        }
    }
}

/// A log record: the entry plus its causal stamp and a diagnostic wall-clock
/// time (never used for ordering; it travels with the record so converged
/// logs serialize identically).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TombstoneRecord {
    pub stamp: Stamp,
    pub removed_at: DateTime<Utc>,
    pub entry: TombstoneEntry,
}

/// Append-only, causally-merged, capacity-bounded journal of removals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct TombstoneLog {
    /// Ascending stamp order.
    records: Vec<TombstoneRecord>,
}

impl TombstoneLog {
    pub fn records(&self) -> &[TombstoneRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Append a local removal. Local stamps are monotone, so the record
    /// belongs at the back; out-of-order stamps are tolerated defensively.
    pub fn append(&mut self, record: TombstoneRecord) {
        match self.records.last() {
            Some(last) if last.stamp > record.stamp => {
                let at = self
                    .records
                    .partition_point(|r| r.stamp < record.stamp);
                self.records.insert(at, record);
            }
            _ => self.records.push(record),
        }
    }

    /// Union with remote records, deduplicating by stamp. Returns true if
    /// the log changed.
    pub fn merge(&mut self, remote: &[TombstoneRecord]) -> bool {
        let known: BTreeSet<Stamp> = self.records.iter().map(|r| r.stamp.clone()).collect();
        let mut changed = false;
        for record in remote {
            if !known.contains(&record.stamp) {
                self.records.push(record.clone());
                changed = true;
            }
        }
        if changed {
            self.records.sort_by(|a, b| a.stamp.cmp(&b.stamp));
        }
        changed
    }

    /// Drop entries whose element is live again (replayed locally, or
    /// resurrected by a merged-in remote repair).
    pub fn purge_live(&mut self, store: &GraphStore) -> usize {
        let before = self.records.len();
        self.records.retain(|r| !r.entry.is_live_in(store));
        before - self.records.len()
    }

    /// Evict the oldest node entries beyond `capacity`. Returns the number
    /// evicted. Deterministic: replicas with equal logs evict equally.
    pub fn enforce_capacity(&mut self, capacity: usize) -> usize {
        let node_count = self
            .records
            .iter()
            .filter(|r| matches!(r.entry, TombstoneEntry::Node { .. }))
            .count();
        if node_count <= capacity {
            return 0;
        }
        let mut to_evict = node_count - capacity;
        let evicted = to_evict;
        self.records.retain(|r| {
            if to_evict > 0 && matches!(r.entry, TombstoneEntry::Node { .. }) {
                to_evict -= 1;
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Remove the records with the given stamps (consumed by a replay).
    pub fn remove_stamps(&mut self, stamps: &BTreeSet<Stamp>) {
        self.records.retain(|r| !stamps.contains(&r.stamp));
    }

    /// The newest node entry for `id`, with its index in the log.
    pub fn newest_node_entry(&self, id: &str) -> Option<(usize, &TombstoneRecord)> {
        self.records
            .iter()
            .enumerate()
            .rev()
            .find(|(_, r)| matches!(&r.entry, TombstoneEntry::Node { id: nid, .. } if nid == id))
    }
}
