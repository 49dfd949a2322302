//! Invariant guard: pre-condition checks for removals.
//!
//! Removals are simulated through the connectivity analyzer before anything
//! is written. A removal that would split the live graph into two
//! multi-node parts is rejected outright; an edge removal that would merely
//! strand one of its endpoints as a singleton cascades into removing that
//! endpoint, so the graph never carries an isolated island.

use tether_core::errors::{GraphResult, GraphWarning};

use crate::connectivity::{self, Exclusion};
use crate::store::GraphStore;

/// How a requested edge removal is to be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EdgeRemoval {
    /// Remove the directed edge `(source, target)`; the remainder stays
    /// connected (or a reverse edge still links the endpoints).
    Edge { source: String, target: String },
    /// Removing the edge would strand `node` as a singleton: cascade into
    /// removing the node, which carries the edge into its snapshot.
    Cascade {
        source: String,
        target: String,
        node: String,
    },
    /// One endpoint is no longer live (a dangling edge from a concurrent
    /// node removal): remove whatever halves exist and tombstone the edge.
    Dangling { source: String, target: String },
}

/// Check that removing `id` leaves the remainder (when non-empty) connected.
pub(crate) fn check_remove_node(store: &GraphStore, id: &str) -> GraphResult<()> {
    if !store.is_live(id) {
        return Err(missing_node("remove_node", store, id));
    }
    if store.live_count() > 1 {
        let comps = connectivity::components(store, &Exclusion::node(id));
        if comps.len() > 1 {
            return Err(GraphWarning::ConnectivityViolation {
                op: "remove_node",
                subject: id.to_string(),
            });
        }
    }
    Ok(())
}

/// Resolve and check an edge removal.
///
/// The key is resolved structurally: if `(source, target)` does not exist
/// but `(target, source)` does, the removal operates on the stored key.
/// The simulation excludes both directions of the resolved pair together,
/// so one of two parallel directed edges can always be removed.
pub(crate) fn plan_remove_edge(
    store: &GraphStore,
    source: &str,
    target: &str,
) -> GraphResult<EdgeRemoval> {
    let (source, target) = match resolve_key(store, source, target) {
        Some(key) => key,
        None => {
            return Err(GraphWarning::InvalidReference {
                op: "remove_edge",
                reason: format!("no edge between {source} and {target}"),
            });
        }
    };

    if !store.is_live(&source) || !store.is_live(&target) {
        return Ok(EdgeRemoval::Dangling { source, target });
    }

    // A live reverse edge keeps the endpoints linked: removal is always safe.
    if store.edge_present(&target, &source) {
        return Ok(EdgeRemoval::Edge { source, target });
    }

    let comps = connectivity::components(store, &Exclusion::edge_pair(&source, &target));
    if comps.len() <= 1 {
        return Ok(EdgeRemoval::Edge { source, target });
    }

    // The removal splits the graph. Stranding a lone endpoint cascades into
    // removing that node (target side first); splitting two multi-node
    // parts is rejected.
    let singleton = |id: &str| {
        comps
            .iter()
            .any(|c| c.contains(id) && c.len() == 1)
    };
    if comps.len() == 2 && singleton(&target) {
        let node = target.clone();
        return Ok(EdgeRemoval::Cascade {
            source,
            target,
            node,
        });
    }
    if comps.len() == 2 && singleton(&source) {
        let node = source.clone();
        return Ok(EdgeRemoval::Cascade {
            source,
            target,
            node,
        });
    }
    Err(GraphWarning::ConnectivityViolation {
        op: "remove_edge",
        subject: format!("{source}->{target}"),
    })
}

/// Dangling halves included: an edge "exists" for removal purposes when
/// either endpoint still records a half for the key.
fn key_exists(store: &GraphStore, source: &str, target: &str) -> bool {
    if store.edge_present(source, target) {
        return true;
    }
    let out_half = store
        .nodes
        .get(source)
        .and_then(|r| r.outgoing.get(target))
        .is_some_and(|s| s.present());
    let in_half = store
        .nodes
        .get(target)
        .and_then(|r| r.incoming.get(source))
        .is_some_and(|s| s.present());
    out_half || in_half
}

fn resolve_key(store: &GraphStore, source: &str, target: &str) -> Option<(String, String)> {
    if key_exists(store, source, target) {
        Some((source.to_string(), target.to_string()))
    } else if key_exists(store, target, source) {
        Some((target.to_string(), source.to_string()))
    } else {
        None
    }
}

/// Distinguish a never-seen id from a removed one.
pub(crate) fn missing_node(op: &'static str, store: &GraphStore, id: &str) -> GraphWarning {
    if store.removal_marker(id).is_some() {
        GraphWarning::AlreadyRemoved {
            op,
            id: id.to_string(),
        }
    } else {
        GraphWarning::InvalidReference {
            op,
            reason: format!("unknown node {id}"),
        }
    }
}
