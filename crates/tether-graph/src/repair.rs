//! Post-merge repair: deterministically reconnect components split apart
//! by concurrent deletions.
//!
//! The engine runs after every merge (and on explicit invocation). It
//! operates only on already-merged state — the store, the component
//! decomposition, and the tombstone log are identical on every replica at
//! that point, and every choice below ranks candidates by canonical orders
//! (log stamp order, sorted component sets, lexicographic tie-breaks), so
//! all replicas replay the same material and converge.
//!
//! Outer loop: garbage-collect, decompose into components, and while more
//! than one remains try — in order — the most recent single tombstoned
//! element that bridges two components, then the cheapest path of
//! tombstoned nodes (exponential recency weights over log positions).
//! When neither exists the graph is left split: a recoverable conflict
//! awaiting more tombstone material from a later merge, never an error.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use tether_core::config::GraphConfig;
use tether_core::models::{Dimension, Position};
use tether_crdt::Stamp;

use crate::connectivity::{self, Exclusion};
use crate::gc;
use crate::replica::SelectionState;
use crate::store::{GraphDoc, NodeRecord};
use crate::tombstone::{EdgeRef, TombstoneEntry};

/// What a repair run did, for observers and logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Components found when the run started (1 means nothing to do).
    pub components_found: usize,
    /// Component merges performed.
    pub bridges: usize,
    /// Tombstoned nodes resurrected into the live store.
    pub nodes_revived: usize,
    /// Edges re-inserted (bridging edges and snapshot edges).
    pub edges_revived: usize,
    /// Dangling half-edges dropped by the collector.
    pub dangling_removed: usize,
    /// Nodes collected after being stripped bare by dangling references.
    pub orphans_collected: usize,
    /// True when components remain that no tombstone material can bridge.
    pub split_remaining: bool,
}

impl RepairReport {
    /// Whether the run changed the live store at all.
    pub fn changed_anything(&self) -> bool {
        self.bridges > 0
            || self.nodes_revived > 0
            || self.edges_revived > 0
            || self.dangling_removed > 0
            || self.orphans_collected > 0
    }
}

/// Cloned replay material for one tombstoned node.
#[derive(Debug, Clone)]
struct Snapshot {
    id: String,
    label: String,
    position: Position,
    dimension: Dimension,
    outgoing: Vec<EdgeRef>,
    incoming: Vec<EdgeRef>,
}

impl Snapshot {
    fn of(entry: &TombstoneEntry) -> Option<Snapshot> {
        match entry {
            TombstoneEntry::Node {
                id,
                label,
                position,
                dimension,
                outgoing,
                incoming,
            } => Some(Snapshot {
                id: id.clone(),
                label: label.clone(),
                position: *position,
                dimension: *dimension,
                outgoing: outgoing.clone(),
                incoming: incoming.clone(),
            }),
            TombstoneEntry::Edge { .. } => None,
        }
    }

    /// Every neighbor id recorded in the snapshot, either direction.
    fn refs(&self) -> BTreeSet<String> {
        self.outgoing
            .iter()
            .chain(self.incoming.iter())
            .map(|r| r.peer.clone())
            .collect()
    }
}

/// A single-element bridge chosen by the scan.
enum BridgePlan {
    Edge {
        stamp: Stamp,
        source: String,
        target: String,
        label: String,
        revive_source: Option<(Stamp, Snapshot)>,
        revive_target: Option<(Stamp, Snapshot)>,
    },
    Node {
        stamp: Stamp,
        snapshot: Snapshot,
    },
}

/// Run the repair loop until the graph is one component or out of material.
pub(crate) fn run(
    doc: &mut GraphDoc,
    selection: &mut SelectionState,
    config: &GraphConfig,
) -> RepairReport {
    let mut report = RepairReport::default();

    loop {
        let swept = gc::collect(doc, selection);
        report.dangling_removed += swept.dangling_halves;
        report.orphans_collected += swept.orphan_nodes.len();
        doc.log.purge_live(&doc.store);

        let comps = connectivity::components(&doc.store, &Exclusion::none());
        if report.components_found == 0 {
            report.components_found = comps.len();
        }
        if comps.len() <= 1 {
            break;
        }

        if let Some(plan) = find_single_bridge(doc, &comps) {
            apply_single_bridge(doc, plan, &mut report);
            report.bridges += 1;
            continue;
        }

        match find_path_bridge(doc, &comps, config) {
            Ok(Some(path)) => {
                apply_path_bridge(doc, path, &mut report);
                report.bridges += 1;
                continue;
            }
            Ok(None) => {
                warn!(
                    components = comps.len(),
                    "no bridging material in tombstone log; graph remains split"
                );
                report.split_remaining = true;
                break;
            }
            Err(reason) => {
                warn!(reason = %reason, "repair attempt aborted; graph remains split");
                report.split_remaining = true;
                break;
            }
        }
    }

    if report.changed_anything() {
        info!(
            components = report.components_found,
            bridges = report.bridges,
            nodes_revived = report.nodes_revived,
            edges_revived = report.edges_revived,
            "repair complete"
        );
    }
    report
}

fn component_index(comps: &[BTreeSet<String>]) -> BTreeMap<String, usize> {
    let mut index = BTreeMap::new();
    for (i, comp) in comps.iter().enumerate() {
        for id in comp {
            index.insert(id.clone(), i);
        }
    }
    index
}

/// Components an endpoint can attach to: its own if live, or — for a
/// tombstoned endpoint that a `Node` entry would simultaneously revive —
/// the components of that entry's live references.
fn endpoint_comps(
    doc: &GraphDoc,
    comp_of: &BTreeMap<String, usize>,
    endpoint: &str,
) -> BTreeSet<usize> {
    if let Some(&comp) = comp_of.get(endpoint) {
        return BTreeSet::from([comp]);
    }
    let Some((_, record)) = doc.log.newest_node_entry(endpoint) else {
        return BTreeSet::new();
    };
    let Some(snapshot) = Snapshot::of(&record.entry) else {
        return BTreeSet::new();
    };
    snapshot
        .refs()
        .iter()
        .filter_map(|peer| comp_of.get(peer).copied())
        .collect()
}

fn bridges_two(a: &BTreeSet<usize>, b: &BTreeSet<usize>) -> bool {
    a.iter().any(|x| b.iter().any(|y| x != y))
}

/// Scan the log most-recent-first for one entry whose replay merges two
/// components.
fn find_single_bridge(doc: &GraphDoc, comps: &[BTreeSet<String>]) -> Option<BridgePlan> {
    let comp_of = component_index(comps);

    for record in doc.log.records().iter().rev() {
        match &record.entry {
            TombstoneEntry::Edge {
                source,
                target,
                label,
            } => {
                let source_comps = endpoint_comps(doc, &comp_of, source);
                let target_comps = endpoint_comps(doc, &comp_of, target);
                if !bridges_two(&source_comps, &target_comps) {
                    continue;
                }
                let revive = |id: &str| -> Option<(Stamp, Snapshot)> {
                    if comp_of.contains_key(id) {
                        return None;
                    }
                    let (_, rec) = doc.log.newest_node_entry(id)?;
                    Some((rec.stamp.clone(), Snapshot::of(&rec.entry)?))
                };
                return Some(BridgePlan::Edge {
                    stamp: record.stamp.clone(),
                    source: source.clone(),
                    target: target.clone(),
                    label: label.clone(),
                    revive_source: revive(source),
                    revive_target: revive(target),
                });
            }
            TombstoneEntry::Node { .. } => {
                let Some(snapshot) = Snapshot::of(&record.entry) else {
                    continue;
                };
                let touched: BTreeSet<usize> = snapshot
                    .refs()
                    .iter()
                    .filter_map(|peer| comp_of.get(peer).copied())
                    .collect();
                if touched.len() >= 2 {
                    return Some(BridgePlan::Node {
                        stamp: record.stamp.clone(),
                        snapshot,
                    });
                }
            }
        }
    }
    None
}

fn apply_single_bridge(doc: &mut GraphDoc, plan: BridgePlan, report: &mut RepairReport) {
    let mut consumed: BTreeSet<Stamp> = BTreeSet::new();
    match plan {
        BridgePlan::Edge {
            stamp,
            source,
            target,
            label,
            revive_source,
            revive_target,
        } => {
            debug!(source = %source, target = %target, "replaying tombstoned edge as bridge");
            consumed.insert(stamp);
            for (entry_stamp, snapshot) in [revive_source, revive_target].into_iter().flatten() {
                consumed.insert(entry_stamp);
                revive_node(doc, &snapshot, None, report);
            }
            if insert_edge_if_absent(doc, &source, &target, &label) {
                report.edges_revived += 1;
            }
        }
        BridgePlan::Node { stamp, snapshot } => {
            debug!(node = %snapshot.id, "replaying tombstoned node as bridge");
            consumed.insert(stamp);
            revive_node(doc, &snapshot, None, report);
        }
    }
    doc.log.remove_stamps(&consumed);
}

/// Resurrect a node from its snapshot. With `allowed_peers` unset the full
/// snapshot is replayed toward whatever peers are live; with it set only
/// edges to the allowed peers are re-inserted (path trimming). Replay is
/// idempotent: an edge already present in the live graph is skipped.
fn revive_node(
    doc: &mut GraphDoc,
    snapshot: &Snapshot,
    allowed_peers: Option<&BTreeSet<String>>,
    report: &mut RepairReport,
) {
    let stamp = doc.next_stamp();
    let mut record = NodeRecord::new(snapshot.label.clone(), snapshot.position, stamp);
    record.dimension.set(snapshot.dimension, doc.next_stamp());
    doc.store.merge_record(&snapshot.id, &record);
    report.nodes_revived += 1;

    let allowed = |peer: &str| allowed_peers.map_or(true, |set| set.contains(peer));
    for edge in &snapshot.outgoing {
        if allowed(&edge.peer)
            && doc.store.is_live(&edge.peer)
            && insert_edge_if_absent(doc, &snapshot.id, &edge.peer, &edge.label)
        {
            report.edges_revived += 1;
        }
    }
    for edge in &snapshot.incoming {
        if allowed(&edge.peer)
            && doc.store.is_live(&edge.peer)
            && insert_edge_if_absent(doc, &edge.peer, &snapshot.id, &edge.label)
        {
            report.edges_revived += 1;
        }
    }
}

/// Insert the directed edge unless it is already present (idempotent
/// replay: an edge already in the live graph is skipped).
fn insert_edge_if_absent(doc: &mut GraphDoc, source: &str, target: &str, label: &str) -> bool {
    if doc.store.edge_present(source, target) {
        return false;
    }
    if !doc.store.is_live(source) || !doc.store.is_live(target) {
        return false;
    }
    doc.write_edge(source, target, label);
    true
}

/// A chosen bridge path of tombstoned nodes, oldest-first irrelevant —
/// stored in traversal order with the material needed to replay it.
struct PathPlan {
    stamps: Vec<Stamp>,
    snapshots: Vec<Snapshot>,
}

/// Search for the lowest-cost simple path of tombstoned nodes whose
/// endpoints attach to two distinct components.
///
/// Cost is `Σ 2^(reverse log position)` over the path's entries: distinct
/// positions make costs collision-free in any log the capacity bound
/// allows, so the choice is deterministic and identical on every replica.
/// A path and its reverse count once (canonical id sequence). The search
/// budget bounds traversal; exhausting it aborts the attempt.
fn find_path_bridge(
    doc: &GraphDoc,
    comps: &[BTreeSet<String>],
    config: &GraphConfig,
) -> Result<Option<PathPlan>, String> {
    let comp_of = component_index(comps);
    let log_len = doc.log.len();

    // Auxiliary vertices: the newest node entry per tombstoned id.
    struct Aux {
        stamp: Stamp,
        weight: u128,
        snapshot: Snapshot,
        refs: BTreeSet<String>,
        live_comps: BTreeSet<usize>,
    }
    let mut aux: Vec<Aux> = Vec::new();
    let mut seen_ids: BTreeSet<String> = BTreeSet::new();
    for (idx, record) in doc.log.records().iter().enumerate().rev() {
        let Some(snapshot) = Snapshot::of(&record.entry) else {
            continue;
        };
        if !seen_ids.insert(snapshot.id.clone()) {
            continue; // an older entry shadowed by a newer one for the same id
        }
        let reverse_position = (log_len - 1 - idx).min(120) as u32;
        let refs = snapshot.refs();
        let live_comps = refs
            .iter()
            .filter_map(|peer| comp_of.get(peer).copied())
            .collect();
        aux.push(Aux {
            stamp: record.stamp.clone(),
            weight: 1u128 << reverse_position,
            snapshot,
            refs,
            live_comps,
        });
    }
    if aux.len() < 2 {
        return Ok(None);
    }
    // Canonical vertex order (by id) keeps enumeration replica-agnostic.
    aux.sort_by(|a, b| a.snapshot.id.cmp(&b.snapshot.id));

    // Undirected adjacency between tombstoned nodes that reference each other.
    let n = aux.len();
    let mut adjacent = vec![Vec::new(); n];
    for i in 0..n {
        for j in (i + 1)..n {
            if aux[i].refs.contains(&aux[j].snapshot.id) || aux[j].refs.contains(&aux[i].snapshot.id)
            {
                adjacent[i].push(j);
                adjacent[j].push(i);
            }
        }
    }

    let mut best: Option<(u128, Vec<String>, Vec<usize>)> = None;
    let mut budget = config.bridge_search_budget;

    // Depth-first enumeration of simple paths from every start vertex,
    // with an explicit stack of (vertex, next-neighbor cursor).
    for start in 0..n {
        let mut on_path = vec![false; n];
        let mut path = vec![start];
        let mut cost = aux[start].weight;
        on_path[start] = true;
        let mut stack: Vec<(usize, usize)> = vec![(start, 0)];

        while !stack.is_empty() {
            if budget == 0 {
                return Err("path search budget exhausted".to_string());
            }
            budget -= 1;

            let top = stack.len() - 1;
            let (vertex, cursor) = stack[top];
            stack[top].1 += 1;

            let Some(&next) = adjacent[vertex].get(cursor) else {
                // Neighbors exhausted: backtrack.
                stack.pop();
                on_path[vertex] = false;
                path.pop();
                cost -= aux[vertex].weight;
                continue;
            };
            if on_path[next] || path.len() >= config.max_bridge_path_len {
                continue;
            }

            path.push(next);
            on_path[next] = true;
            cost += aux[next].weight;

            let first = path[0];
            if bridges_two(&aux[first].live_comps, &aux[next].live_comps) {
                let ids: Vec<String> = path.iter().map(|&v| aux[v].snapshot.id.clone()).collect();
                let mut reversed = ids.clone();
                reversed.reverse();
                let canon = ids.clone().min(reversed);
                let better = match &best {
                    None => true,
                    Some((best_cost, best_canon, _)) => (cost, &canon) < (*best_cost, best_canon),
                };
                if better {
                    best = Some((cost, canon, path.clone()));
                }
            }
            stack.push((next, 0));
        }
    }

    Ok(best.map(|(_, _, path)| PathPlan {
        stamps: path.iter().map(|&v| aux[v].stamp.clone()).collect(),
        snapshots: path.iter().map(|&v| aux[v].snapshot.clone()).collect(),
    }))
}

/// Replay a bridge path: revive every node on it, trimmed so endpoints keep
/// only edges into the pre-existing live graph or their path neighbor, and
/// interior nodes keep only their path neighbors — irrelevant historical
/// edges stay dead.
fn apply_path_bridge(doc: &mut GraphDoc, plan: PathPlan, report: &mut RepairReport) {
    let live_before: BTreeSet<String> = doc.store.nodes.keys().cloned().collect();
    let path_ids: Vec<String> = plan.snapshots.iter().map(|s| s.id.clone()).collect();
    debug!(path = ?path_ids, "replaying tombstoned path as bridge");

    // Records first, so edge replay sees every path node live.
    let empty: Vec<EdgeRef> = Vec::new();
    for snapshot in &plan.snapshots {
        let bare = Snapshot {
            outgoing: empty.clone(),
            incoming: empty.clone(),
            ..snapshot.clone()
        };
        revive_node(doc, &bare, None, report);
    }

    let last = plan.snapshots.len() - 1;
    for (i, snapshot) in plan.snapshots.iter().enumerate() {
        let mut allowed: BTreeSet<String> = BTreeSet::new();
        if i > 0 {
            allowed.insert(path_ids[i - 1].clone());
        }
        if i < last {
            allowed.insert(path_ids[i + 1].clone());
        }
        if i == 0 || i == last {
            allowed.extend(live_before.iter().cloned());
        }
        for edge in &snapshot.outgoing {
            if allowed.contains(&edge.peer)
                && doc.store.is_live(&edge.peer)
                && insert_edge_if_absent(doc, &snapshot.id, &edge.peer, &edge.label)
            {
                report.edges_revived += 1;
            }
        }
        for edge in &snapshot.incoming {
            if allowed.contains(&edge.peer)
                && doc.store.is_live(&edge.peer)
                && insert_edge_if_absent(doc, &edge.peer, &snapshot.id, &edge.label)
            {
                report.edges_revived += 1;
            }
        }
    }

    let consumed: BTreeSet<Stamp> = plan.stamps.into_iter().collect();
    doc.log.remove_stamps(&consumed);
}
