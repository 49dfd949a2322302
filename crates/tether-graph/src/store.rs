//! Live node/edge store and the replicated graph document.
//!
//! Every node holds its outgoing and incoming edge maps for O(1)
//! bidirectional neighbor lookup. An edge is represented as two half-edges
//! (one slot in each endpoint's map); a slot carries a removal marker so
//! that edge removals propagate through merges and a newer re-add can win
//! back the key.
//!
//! Node liveness is decided against a document-level removal-marker map:
//! a node is live only while its `created` stamp is newer than its removal
//! marker. Deep edits under a node never refresh `created`, so deleting a
//! node discards concurrent edits beneath it — node deletion takes
//! precedence over concurrent edge additions that were nested inside it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use tether_core::models::{Dimension, Position};
use tether_crdt::{LwwRegister, Stamp, VersionVector};

use crate::tombstone::TombstoneLog;

/// One half of a directed edge, stored in an endpoint's edge map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct EdgeSlot {
    /// Edge label; the stamp doubles as the add/upsert time.
    pub label: LwwRegister<String>,
    /// Removal marker. The half is present while unset, or while the label
    /// stamp is newer than the marker (a later re-add wins the key back).
    pub removed: Option<Stamp>,
}

impl EdgeSlot {
    pub fn new(label: String, stamp: Stamp) -> Self {
        Self {
            label: LwwRegister::new(label, stamp),
            removed: None,
        }
    }

    /// Whether this half-edge is present (not superseded by a removal).
    pub fn present(&self) -> bool {
        match &self.removed {
            None => true,
            Some(removed) => self.label.stamp() > removed,
        }
    }

    /// Mark the half removed at the given stamp.
    pub fn mark_removed(&mut self, stamp: Stamp) {
        match &self.removed {
            Some(existing) if *existing >= stamp => {}
            _ => self.removed = Some(stamp),
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.label.merge(&other.label);
        if let Some(theirs) = &other.removed {
            self.mark_removed(theirs.clone());
        }
    }

    pub fn changed_since(&self, seen: &VersionVector) -> bool {
        if !seen.contains(self.label.stamp()) {
            return true;
        }
        matches!(&self.removed, Some(r) if !seen.contains(r))
    }
}

/// A live node: replicated scalar fields plus both edge maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct NodeRecord {
    /// Stamp of the latest (re-)creation. Liveness compares this against
    /// the node's removal marker; field edits never refresh it.
    pub created: Stamp,
    pub label: LwwRegister<String>,
    pub position: LwwRegister<Position>,
    pub dimension: LwwRegister<Dimension>,
    /// target id → half-edge for every edge leaving this node.
    pub outgoing: BTreeMap<String, EdgeSlot>,
    /// source id → half-edge for every edge entering this node.
    pub incoming: BTreeMap<String, EdgeSlot>,
}

impl NodeRecord {
    pub fn new(label: String, position: Position, stamp: Stamp) -> Self {
        Self {
            created: stamp.clone(),
            label: LwwRegister::new(label, stamp.clone()),
            position: LwwRegister::new(position, stamp.clone()),
            dimension: LwwRegister::new(Dimension::default(), stamp),
            outgoing: BTreeMap::new(),
            incoming: BTreeMap::new(),
        }
    }

    pub fn merge(&mut self, other: &Self) {
        if other.created > self.created {
            self.created = other.created.clone();
        }
        self.label.merge(&other.label);
        self.position.merge(&other.position);
        self.dimension.merge(&other.dimension);
        merge_slots(&mut self.outgoing, &other.outgoing);
        merge_slots(&mut self.incoming, &other.incoming);
    }

    pub fn changed_since(&self, seen: &VersionVector) -> bool {
        !seen.contains(&self.created)
            || !seen.contains(self.label.stamp())
            || !seen.contains(self.position.stamp())
            || !seen.contains(self.dimension.stamp())
            || self.outgoing.values().any(|s| s.changed_since(seen))
            || self.incoming.values().any(|s| s.changed_since(seen))
    }

    /// All stamps carried by this record, for version bookkeeping.
    pub fn observe_into(&self, vv: &mut VersionVector) {
        vv.observe(&self.created);
        vv.observe(self.label.stamp());
        vv.observe(self.position.stamp());
        vv.observe(self.dimension.stamp());
        for slot in self.outgoing.values().chain(self.incoming.values()) {
            vv.observe(slot.label.stamp());
            if let Some(r) = &slot.removed {
                vv.observe(r);
            }
        }
    }
}

fn merge_slots(ours: &mut BTreeMap<String, EdgeSlot>, theirs: &BTreeMap<String, EdgeSlot>) {
    for (peer, slot) in theirs {
        match ours.get_mut(peer) {
            Some(existing) => existing.merge(slot),
            None => {
                ours.insert(peer.clone(), slot.clone());
            }
        }
    }
}

/// Live store: node records plus node removal markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct GraphStore {
    /// Only records that currently win against their removal marker.
    pub nodes: BTreeMap<String, NodeRecord>,
    /// node id → stamp of its most recent removal.
    pub node_removals: BTreeMap<String, Stamp>,
}

impl GraphStore {
    pub fn is_live(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn live_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn removal_marker(&self, id: &str) -> Option<&Stamp> {
        self.node_removals.get(id)
    }

    /// Whether a record with the given creation stamp survives the marker.
    pub fn creation_wins(&self, id: &str, created: &Stamp) -> bool {
        match self.node_removals.get(id) {
            Some(marker) => created > marker,
            None => true,
        }
    }

    /// Insert or merge a record, honoring the removal marker. A record whose
    /// creation is superseded by the marker is discarded wholesale (deletion
    /// precedence). Returns true if the store changed.
    pub fn merge_record(&mut self, id: &str, record: &NodeRecord) -> bool {
        if !self.creation_wins(id, &record.created) {
            return false;
        }
        match self.nodes.get_mut(id) {
            Some(existing) => {
                let before = existing.clone();
                existing.merge(record);
                *existing != before
            }
            None => {
                self.nodes.insert(id.to_string(), record.clone());
                true
            }
        }
    }

    /// Record a node removal: keep the newest marker and drop any record it
    /// supersedes. Returns true if the store changed.
    pub fn merge_removal(&mut self, id: &str, stamp: &Stamp) -> bool {
        let mut changed = false;
        match self.node_removals.get_mut(id) {
            Some(existing) if *existing >= *stamp => {}
            Some(existing) => {
                *existing = stamp.clone();
                changed = true;
            }
            None => {
                self.node_removals.insert(id.to_string(), stamp.clone());
                changed = true;
            }
        }
        let superseded = self
            .nodes
            .get(id)
            .map(|record| record.created.clone())
            .is_some_and(|created| !self.creation_wins(id, &created));
        if superseded {
            self.nodes.remove(id);
            changed = true;
        }
        changed
    }

    /// Whether the directed edge `(source, target)` is present between two
    /// live nodes (either half suffices; merges can leave one half behind).
    pub fn edge_present(&self, source: &str, target: &str) -> bool {
        if !self.is_live(source) || !self.is_live(target) {
            return false;
        }
        let out_half = self.nodes[source]
            .outgoing
            .get(target)
            .is_some_and(EdgeSlot::present);
        let in_half = self.nodes[target]
            .incoming
            .get(source)
            .is_some_and(EdgeSlot::present);
        out_half || in_half
    }

    /// All present directed edges between live nodes, as sorted keys with
    /// labels. Half-edges are unioned so a missing mirror never hides an
    /// edge.
    pub fn present_edges(&self) -> BTreeMap<(String, String), String> {
        let mut edges = BTreeMap::new();
        for (id, record) in &self.nodes {
            for (target, slot) in &record.outgoing {
                if slot.present() && self.is_live(target) {
                    edges
                        .entry((id.clone(), target.clone()))
                        .or_insert_with(|| slot.label.get().clone());
                }
            }
            for (source, slot) in &record.incoming {
                if slot.present() && self.is_live(source) {
                    edges
                        .entry((source.clone(), id.clone()))
                        .or_insert_with(|| slot.label.get().clone());
                }
            }
        }
        edges
    }
}

/// The replicated graph document: store, tombstone log, and clock state.
///
/// This is the unit of replication — everything in here merges
/// commutatively, associatively, and idempotently. Selection state lives
/// outside it, on the replica handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct GraphDoc {
    /// This replica's actor id for stamp allocation.
    pub actor: String,
    /// Lamport counter: strictly above every stamp this replica has seen.
    pub counter: u64,
    /// Everything this replica has observed, for delta sync.
    pub version: VersionVector,
    pub store: GraphStore,
    pub log: TombstoneLog,
}

impl GraphDoc {
    pub fn new(actor: String) -> Self {
        Self {
            actor,
            counter: 0,
            version: VersionVector::new(),
            store: GraphStore::default(),
            log: TombstoneLog::default(),
        }
    }

    /// Allocate a fresh stamp for a local write.
    pub fn next_stamp(&mut self) -> Stamp {
        self.counter += 1;
        let stamp = Stamp::new(self.counter, self.actor.clone());
        self.version.observe(&stamp);
        stamp
    }

    /// Fold a remote stamp into the clock so later local stamps sort after it.
    pub fn observe(&mut self, stamp: &Stamp) {
        self.counter = self.counter.max(stamp.counter);
        self.version.observe(stamp);
    }

    /// Write (or upsert) the directed edge `(source, target)` between two
    /// live nodes. One fresh stamp covers both halves; a newer stamp also
    /// wins the key back from any earlier removal marker.
    pub fn write_edge(&mut self, source: &str, target: &str, label: &str) {
        if !self.store.is_live(source) || !self.store.is_live(target) {
            return;
        }
        let stamp = self.next_stamp();
        if let Some(record) = self.store.nodes.get_mut(source) {
            match record.outgoing.get_mut(target) {
                Some(slot) => slot.label.set(label.to_string(), stamp.clone()),
                None => {
                    record
                        .outgoing
                        .insert(target.to_string(), EdgeSlot::new(label.to_string(), stamp.clone()));
                }
            }
        }
        if let Some(record) = self.store.nodes.get_mut(target) {
            match record.incoming.get_mut(source) {
                Some(slot) => slot.label.set(label.to_string(), stamp.clone()),
                None => {
                    record
                        .incoming
                        .insert(source.to_string(), EdgeSlot::new(label.to_string(), stamp));
                }
            }
        }
    }
}
