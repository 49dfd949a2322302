//! The replica handle: public mutation, read, and sync surface.
//!
//! A [`GraphReplica`] owns one independent copy of the replicated document
//! plus replica-local state (selection sets, configuration). Operations
//! execute synchronously against in-memory state; "concurrency" is purely
//! logical, between replicas, reconciled through [`GraphReplica::apply_delta`].
//!
//! Every mutating call returns `Result<(), GraphWarning>`: `Ok(())` means
//! the operation was applied and observers should be notified, `Err`
//! carries the structured warning for a rejected no-op. All pre-condition
//! checks run before the first write, so a rejected call leaves the
//! replica unchanged.

use std::collections::BTreeSet;
use tracing::warn;

use chrono::Utc;
use uuid::Uuid;

use tether_core::config::GraphConfig;
use tether_core::errors::{GraphResult, GraphWarning, SyncError};
use tether_core::models::{Dimension, EdgeView, NodeView, Position};
use tether_crdt::VersionVector;

use crate::connectivity::{self, Exclusion};
use crate::gc;
use crate::guard::{self, EdgeRemoval};
use crate::repair::{self, RepairReport};
use crate::store::{GraphDoc, GraphStore, NodeRecord};
use crate::sync::{self, DeltaPayload};
use crate::tombstone::{EdgeRef, TombstoneEntry, TombstoneRecord};

/// Replica-local selection bookkeeping. Never replicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct SelectionState {
    pub nodes: BTreeSet<String>,
    pub edges: BTreeSet<(String, String)>,
}

impl SelectionState {
    /// Drop selection entries whose element no longer exists.
    pub fn prune(&mut self, store: &GraphStore) {
        self.nodes.retain(|id| store.is_live(id));
        self.edges
            .retain(|(source, target)| store.edge_present(source, target));
    }
}

/// Outcome of applying a delta: whether the merge changed local state, and
/// what the post-merge repair did. Either signal means observers should be
/// notified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub changed: bool,
    pub repair: RepairReport,
}

/// One replica of the weakly-connected graph.
#[derive(Debug, Clone)]
pub struct GraphReplica {
    doc: GraphDoc,
    selection: SelectionState,
    config: GraphConfig,
}

impl GraphReplica {
    /// Create a replica from configuration. A missing `replica_id` gets a
    /// generated one.
    pub fn new(config: GraphConfig) -> Self {
        let actor = config
            .replica_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            doc: GraphDoc::new(actor),
            selection: SelectionState::default(),
            config,
        }
    }

    /// Convenience: a default-configured replica with the given id.
    pub fn with_replica_id(id: impl Into<String>) -> Self {
        Self::new(GraphConfig {
            replica_id: Some(id.into()),
            ..GraphConfig::default()
        })
    }

    /// This replica's actor id.
    pub fn replica_id(&self) -> &str {
        &self.doc.actor
    }

    // ── Mutations ──────────────────────────────────────────────────────

    /// Seed an empty graph with its first node. Any further growth must go
    /// through [`GraphReplica::add_node_with_edge`].
    pub fn add_node(
        &mut self,
        id: &str,
        label: &str,
        position: Position,
    ) -> GraphResult<()> {
        if self.doc.store.live_count() > 0 {
            return Err(self.reject(GraphWarning::InvalidReference {
                op: "add_node",
                reason: "graph is not empty; grow it with add_node_with_edge".to_string(),
            }));
        }
        let stamp = self.doc.next_stamp();
        let record = NodeRecord::new(label.to_string(), position, stamp);
        self.doc.store.merge_record(id, &record);
        Ok(())
    }

    /// Add a node born connected: exactly one of `edge_source` /
    /// `edge_target` must be the new node, the other an existing live node.
    pub fn add_node_with_edge(
        &mut self,
        node_id: &str,
        label: &str,
        position: Position,
        edge_source: &str,
        edge_target: &str,
        edge_label: &str,
    ) -> GraphResult<()> {
        let node_is_source = edge_source == node_id;
        let node_is_target = edge_target == node_id;
        if node_is_source == node_is_target {
            return Err(self.reject(GraphWarning::InvalidReference {
                op: "add_node_with_edge",
                reason: format!("exactly one edge endpoint must be the new node {node_id}"),
            }));
        }
        if self.doc.store.is_live(node_id) {
            return Err(self.reject(GraphWarning::InvalidReference {
                op: "add_node_with_edge",
                reason: format!("node {node_id} already exists"),
            }));
        }
        let anchor = if node_is_source { edge_target } else { edge_source };
        if !self.doc.store.is_live(anchor) {
            return Err(self.reject(guard::missing_node(
                "add_node_with_edge",
                &self.doc.store,
                anchor,
            )));
        }

        let stamp = self.doc.next_stamp();
        let record = NodeRecord::new(label.to_string(), position, stamp);
        self.doc.store.merge_record(node_id, &record);
        self.doc.write_edge(edge_source, edge_target, edge_label);
        Ok(())
    }

    /// Add (or upsert the label of) a directed edge between two live nodes.
    /// Re-adding an existing key updates the label; it never duplicates.
    pub fn add_edge(&mut self, source: &str, target: &str, label: &str) -> GraphResult<()> {
        if source == target {
            return Err(self.reject(GraphWarning::InvalidReference {
                op: "add_edge",
                reason: format!("self-loop {source} -> {target}"),
            }));
        }
        for endpoint in [source, target] {
            if !self.doc.store.is_live(endpoint) {
                return Err(self.reject(guard::missing_node(
                    "add_edge",
                    &self.doc.store,
                    endpoint,
                )));
            }
        }
        self.doc.write_edge(source, target, label);
        Ok(())
    }

    /// Remove a node, tombstoning its full snapshot. Rejected when the
    /// remainder (if non-empty) would not stay connected.
    pub fn remove_node(&mut self, id: &str) -> GraphResult<()> {
        if let Err(warning) = guard::check_remove_node(&self.doc.store, id) {
            return Err(self.reject(warning));
        }
        self.remove_node_unchecked(id);
        Ok(())
    }

    /// Remove a directed edge. The key resolves structurally (the reverse
    /// key is accepted when only it exists); a removal that would strand an
    /// endpoint cascades into removing that node; a removal that would
    /// split the graph into two multi-node parts is rejected; dangling
    /// edges are removed half by half.
    pub fn remove_edge(&mut self, source: &str, target: &str) -> GraphResult<()> {
        let plan = match guard::plan_remove_edge(&self.doc.store, source, target) {
            Ok(plan) => plan,
            Err(warning) => return Err(self.reject(warning)),
        };
        match plan {
            EdgeRemoval::Edge { source, target } | EdgeRemoval::Dangling { source, target } => {
                self.remove_edge_unchecked(&source, &target);
            }
            EdgeRemoval::Cascade { node, .. } => {
                self.remove_node_unchecked(&node);
            }
        }
        Ok(())
    }

    /// Unconditional position write (metadata mutators skip the guard).
    pub fn change_node_position(&mut self, id: &str, position: Position) -> GraphResult<()> {
        if !self.doc.store.is_live(id) {
            return Err(self.reject(guard::missing_node(
                "change_node_position",
                &self.doc.store,
                id,
            )));
        }
        let stamp = self.doc.next_stamp();
        if let Some(record) = self.doc.store.nodes.get_mut(id) {
            record.position.set(position, stamp);
        }
        Ok(())
    }

    /// Unconditional dimension write.
    pub fn change_node_dimension(&mut self, id: &str, dimension: Dimension) -> GraphResult<()> {
        if !self.doc.store.is_live(id) {
            return Err(self.reject(guard::missing_node(
                "change_node_dimension",
                &self.doc.store,
                id,
            )));
        }
        let stamp = self.doc.next_stamp();
        if let Some(record) = self.doc.store.nodes.get_mut(id) {
            record.dimension.set(dimension, stamp);
        }
        Ok(())
    }

    /// Unconditional label write.
    pub fn change_node_label(&mut self, id: &str, label: &str) -> GraphResult<()> {
        if !self.doc.store.is_live(id) {
            return Err(self.reject(guard::missing_node(
                "change_node_label",
                &self.doc.store,
                id,
            )));
        }
        let stamp = self.doc.next_stamp();
        if let Some(record) = self.doc.store.nodes.get_mut(id) {
            record.label.set(label.to_string(), stamp);
        }
        Ok(())
    }

    /// Update an existing edge's label (register semantics).
    pub fn change_edge_label(&mut self, source: &str, target: &str, label: &str) -> GraphResult<()> {
        if !self.doc.store.edge_present(source, target) {
            return Err(self.reject(GraphWarning::InvalidReference {
                op: "change_edge_label",
                reason: format!("no edge {source} -> {target}"),
            }));
        }
        self.doc.write_edge(source, target, label);
        Ok(())
    }

    /// Toggle the replica-local selection flag of a node.
    pub fn change_node_selection(&mut self, id: &str, selected: bool) -> GraphResult<()> {
        if !self.doc.store.is_live(id) {
            return Err(self.reject(guard::missing_node(
                "change_node_selection",
                &self.doc.store,
                id,
            )));
        }
        if selected {
            self.selection.nodes.insert(id.to_string());
        } else {
            self.selection.nodes.remove(id);
        }
        Ok(())
    }

    /// Toggle the replica-local selection flag of an edge.
    pub fn change_edge_selection(
        &mut self,
        source: &str,
        target: &str,
        selected: bool,
    ) -> GraphResult<()> {
        if !self.doc.store.edge_present(source, target) {
            return Err(self.reject(GraphWarning::InvalidReference {
                op: "change_edge_selection",
                reason: format!("no edge {source} -> {target}"),
            }));
        }
        let key = (source.to_string(), target.to_string());
        if selected {
            self.selection.edges.insert(key);
        } else {
            self.selection.edges.remove(&key);
        }
        Ok(())
    }

    // ── Reads ──────────────────────────────────────────────────────────

    /// Render-ready node snapshots, sorted by id.
    pub fn nodes(&self) -> Vec<NodeView> {
        self.doc
            .store
            .nodes
            .iter()
            .map(|(id, record)| NodeView {
                id: id.clone(),
                label: record.label.get().clone(),
                position: *record.position.get(),
                dimension: *record.dimension.get(),
                selected: self.selection.nodes.contains(id),
            })
            .collect()
    }

    /// Render-ready edge snapshots, sorted by key. Garbage-collects
    /// dangling references first, so every returned endpoint is live.
    pub fn edges(&mut self) -> Vec<EdgeView> {
        gc::collect(&mut self.doc, &mut self.selection);
        self.doc
            .store
            .present_edges()
            .into_iter()
            .map(|((source, target), label)| EdgeView {
                selected: self
                    .selection
                    .edges
                    .contains(&(source.clone(), target.clone())),
                source,
                target,
                label,
            })
            .collect()
    }

    /// Snapshot of a single live node.
    pub fn get_node(&self, id: &str) -> Option<NodeView> {
        let record = self.doc.store.nodes.get(id)?;
        Some(NodeView {
            id: id.to_string(),
            label: record.label.get().clone(),
            position: *record.position.get(),
            dimension: *record.dimension.get(),
            selected: self.selection.nodes.contains(id),
        })
    }

    /// Snapshot of a single live edge (garbage-collecting read).
    pub fn get_edge(&mut self, source: &str, target: &str) -> Option<EdgeView> {
        gc::collect(&mut self.doc, &mut self.selection);
        let key = (source.to_string(), target.to_string());
        let label = self.doc.store.present_edges().remove(&key)?;
        Some(EdgeView {
            selected: self.selection.edges.contains(&key),
            source: key.0,
            target: key.1,
            label,
        })
    }

    pub fn is_node_selected(&self, id: &str) -> bool {
        self.selection.nodes.contains(id)
    }

    pub fn is_edge_selected(&self, source: &str, target: &str) -> bool {
        self.selection
            .edges
            .contains(&(source.to_string(), target.to_string()))
    }

    pub fn node_count(&self) -> usize {
        self.doc.store.live_count()
    }

    /// Number of live edges (garbage-collecting read).
    pub fn edge_count(&mut self) -> usize {
        gc::collect(&mut self.doc, &mut self.selection);
        self.doc.store.present_edges().len()
    }

    pub fn selected_node_count(&self) -> usize {
        self.selection.nodes.len()
    }

    pub fn selected_edge_count(&self) -> usize {
        self.selection.edges.len()
    }

    /// Whether every live node reaches every other, ignoring direction.
    /// Vacuously true for the empty graph.
    pub fn is_weakly_connected(&self) -> bool {
        connectivity::is_weakly_connected(&self.doc.store, &Exclusion::none())
    }

    // ── Debug / test dumps ─────────────────────────────────────────────

    /// Canonical (sorted) JSON dump of live nodes.
    pub fn nodes_as_json(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string(&self.nodes())?)
    }

    /// Canonical (sorted) JSON dump of live edges (garbage-collecting read).
    pub fn edges_as_json(&mut self) -> Result<String, SyncError> {
        Ok(serde_json::to_string(&self.edges())?)
    }

    /// Canonical JSON dump of the tombstone log, in its causally-merged
    /// order — byte-equal across converged replicas.
    pub fn removed_elements_as_json(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string(self.doc.log.records())?)
    }

    // ── Sync boundary ──────────────────────────────────────────────────

    /// Everything this replica has observed, for a peer's `export_delta`.
    pub fn version(&self) -> VersionVector {
        self.doc.version.clone()
    }

    /// Export a delta of everything `since` has not seen. `since` must be
    /// the receiving replica's current version.
    pub fn export_delta(&self, since: &VersionVector) -> Result<Vec<u8>, SyncError> {
        let payload = sync::export(&self.doc, since);
        Ok(serde_json::to_vec(&payload)?)
    }

    /// Apply a delta, then immediately repair connectivity. Idempotent:
    /// re-applying an already-applied delta reports `changed == false` and
    /// leaves observable state untouched.
    pub fn apply_delta(&mut self, bytes: &[u8]) -> Result<MergeOutcome, SyncError> {
        let payload: DeltaPayload = serde_json::from_slice(bytes)?;
        let changed = sync::apply(&mut self.doc, &payload);
        self.doc
            .log
            .enforce_capacity(self.config.tombstoned_node_capacity);
        self.selection.prune(&self.doc.store);
        let repair = repair::run(&mut self.doc, &mut self.selection, &self.config);
        Ok(MergeOutcome { changed, repair })
    }

    /// Explicit repair trigger: reconnect split components from tombstone
    /// material until one component remains (or material runs out).
    pub fn make_weakly_connected(&mut self) -> RepairReport {
        repair::run(&mut self.doc, &mut self.selection, &self.config)
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn reject(&self, warning: GraphWarning) -> GraphWarning {
        warn!(replica = %self.doc.actor, %warning, "operation rejected");
        warning
    }

    /// Remove a node without re-checking the guard: snapshot it (including
    /// every edge that references it, even halves already tombstoned
    /// elsewhere), write the removal markers, and append the tombstone.
    fn remove_node_unchecked(&mut self, id: &str) {
        let Some(record) = self.doc.store.nodes.get(id).cloned() else {
            return;
        };

        // Snapshot both edge maps, then union in halves recorded on other
        // nodes that reference this one.
        let mut outgoing: std::collections::BTreeMap<String, String> = record
            .outgoing
            .iter()
            .map(|(peer, slot)| (peer.clone(), slot.label.get().clone()))
            .collect();
        let mut incoming: std::collections::BTreeMap<String, String> = record
            .incoming
            .iter()
            .map(|(peer, slot)| (peer.clone(), slot.label.get().clone()))
            .collect();
        for (other_id, other) in &self.doc.store.nodes {
            if other_id == id {
                continue;
            }
            if let Some(slot) = other.outgoing.get(id) {
                incoming
                    .entry(other_id.clone())
                    .or_insert_with(|| slot.label.get().clone());
            }
            if let Some(slot) = other.incoming.get(id) {
                outgoing
                    .entry(other_id.clone())
                    .or_insert_with(|| slot.label.get().clone());
            }
        }

        let entry = TombstoneEntry::Node {
            id: id.to_string(),
            label: record.label.get().clone(),
            position: *record.position.get(),
            dimension: *record.dimension.get(),
            outgoing: outgoing
                .iter()
                .map(|(peer, label)| EdgeRef {
                    peer: peer.clone(),
                    label: label.clone(),
                })
                .collect(),
            incoming: incoming
                .iter()
                .map(|(peer, label)| EdgeRef {
                    peer: peer.clone(),
                    label: label.clone(),
                })
                .collect(),
        };

        // Mark every half on surviving neighbors, then drop the record.
        let peers: BTreeSet<String> = outgoing.keys().chain(incoming.keys()).cloned().collect();
        for peer in &peers {
            if !self.doc.store.is_live(peer) {
                continue;
            }
            let stamp = self.doc.next_stamp();
            if let Some(neighbor) = self.doc.store.nodes.get_mut(peer) {
                if let Some(slot) = neighbor.outgoing.get_mut(id) {
                    slot.mark_removed(stamp.clone());
                }
                if let Some(slot) = neighbor.incoming.get_mut(id) {
                    slot.mark_removed(stamp);
                }
            }
        }
        let marker = self.doc.next_stamp();
        self.doc.store.merge_removal(id, &marker);

        let log_stamp = self.doc.next_stamp();
        self.doc.log.append(TombstoneRecord {
            stamp: log_stamp,
            removed_at: Utc::now(),
            entry,
        });
        self.doc
            .log
            .enforce_capacity(self.config.tombstoned_node_capacity);

        self.selection.nodes.remove(id);
        self.selection
            .edges
            .retain(|(source, target)| source != id && target != id);
    }

    /// Remove whatever halves of `(source, target)` exist and tombstone the
    /// edge.
    fn remove_edge_unchecked(&mut self, source: &str, target: &str) {
        let label = self
            .doc
            .store
            .nodes
            .get(source)
            .and_then(|r| r.outgoing.get(target))
            .or_else(|| {
                self.doc
                    .store
                    .nodes
                    .get(target)
                    .and_then(|r| r.incoming.get(source))
            })
            .map(|slot| slot.label.get().clone())
            .unwrap_or_default();

        let stamp = self.doc.next_stamp();
        if let Some(record) = self.doc.store.nodes.get_mut(source) {
            if let Some(slot) = record.outgoing.get_mut(target) {
                slot.mark_removed(stamp.clone());
            }
        }
        if let Some(record) = self.doc.store.nodes.get_mut(target) {
            if let Some(slot) = record.incoming.get_mut(source) {
                slot.mark_removed(stamp.clone());
            }
        }

        let log_stamp = self.doc.next_stamp();
        self.doc.log.append(TombstoneRecord {
            stamp: log_stamp,
            removed_at: Utc::now(),
            entry: TombstoneEntry::Edge {
                source: source.to_string(),
                target: target.to_string(),
                label,
            },
        });

        self.selection
            .edges
            .remove(&(source.to_string(), target.to_string()));
    }
}
