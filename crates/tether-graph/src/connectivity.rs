//! Undirected reachability over the live store.
//!
//! Traversal follows both outgoing and incoming adjacency (edge direction
//! is ignored), visits only live nodes, and skips anything named in the
//! exclusion set — which is how the invariant guard simulates a removal
//! before committing it. Dangling references (peers that are no longer
//! live) are invisible here.
//!
//! The traversal is iterative with an explicit stack, so depth is
//! independent of call-stack limits. O(V+E) per call.

use std::collections::BTreeSet;

use crate::store::GraphStore;

/// Elements to pretend are absent during a traversal.
#[derive(Debug, Clone, Default)]
pub(crate) struct Exclusion {
    pub nodes: BTreeSet<String>,
    /// Directed pairs; callers exclude both directions of a structural edge.
    pub edges: BTreeSet<(String, String)>,
}

impl Exclusion {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn node(id: &str) -> Self {
        let mut excl = Self::default();
        excl.nodes.insert(id.to_string());
        excl
    }

    /// Exclude the structural pair `(source, target)` and `(target, source)`
    /// together, so one of two parallel directed edges can still be removed
    /// without over-restricting.
    pub fn edge_pair(source: &str, target: &str) -> Self {
        let mut excl = Self::default();
        excl.edges
            .insert((source.to_string(), target.to_string()));
        excl.edges
            .insert((target.to_string(), source.to_string()));
        excl
    }

    fn skips_edge(&self, source: &str, target: &str) -> bool {
        self.edges
            .contains(&(source.to_string(), target.to_string()))
    }
}

/// Undirected neighbors of `id` among live, non-excluded nodes.
fn neighbors(store: &GraphStore, id: &str, excl: &Exclusion) -> Vec<String> {
    let Some(record) = store.nodes.get(id) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (target, slot) in &record.outgoing {
        if slot.present()
            && store.is_live(target)
            && !excl.nodes.contains(target)
            && !excl.skips_edge(id, target)
        {
            out.push(target.clone());
        }
    }
    for (source, slot) in &record.incoming {
        if slot.present()
            && store.is_live(source)
            && !excl.nodes.contains(source)
            && !excl.skips_edge(source, id)
        {
            out.push(source.clone());
        }
    }
    out
}

/// Partition all live, non-excluded nodes into connected components.
///
/// Components are returned sorted by their smallest member, each as a
/// sorted set — the ordering is canonical so downstream repair decisions
/// are identical on every replica.
pub(crate) fn components(store: &GraphStore, excl: &Exclusion) -> Vec<BTreeSet<String>> {
    let mut visited: BTreeSet<String> = BTreeSet::new();
    let mut out = Vec::new();

    for id in store.nodes.keys() {
        if excl.nodes.contains(id) || visited.contains(id) {
            continue;
        }
        // Iterative DFS with an explicit stack.
        let mut component = BTreeSet::new();
        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if !component.insert(current.clone()) {
                continue;
            }
            visited.insert(current.clone());
            for neighbor in neighbors(store, &current, excl) {
                if !component.contains(&neighbor) {
                    stack.push(neighbor);
                }
            }
        }
        out.push(component);
    }
    out
}

/// Whether the remainder (live nodes minus exclusions) is one component.
/// Vacuously true when empty.
pub(crate) fn is_weakly_connected(store: &GraphStore, excl: &Exclusion) -> bool {
    components(store, excl).len() <= 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EdgeSlot, GraphDoc, NodeRecord};
    use tether_core::models::Position;

    fn doc_with_chain(ids: &[&str]) -> GraphDoc {
        let mut doc = GraphDoc::new("test".to_string());
        for id in ids {
            let stamp = doc.next_stamp();
            doc.store.nodes.insert(
                id.to_string(),
                NodeRecord::new(id.to_string(), Position::default(), stamp),
            );
        }
        for pair in ids.windows(2) {
            let stamp = doc.next_stamp();
            let slot = EdgeSlot::new("e".to_string(), stamp);
            doc.store
                .nodes
                .get_mut(pair[0])
                .unwrap()
                .outgoing
                .insert(pair[1].to_string(), slot.clone());
            doc.store
                .nodes
                .get_mut(pair[1])
                .unwrap()
                .incoming
                .insert(pair[0].to_string(), slot);
        }
        doc
    }

    #[test]
    fn chain_is_one_component() {
        let doc = doc_with_chain(&["a", "b", "c"]);
        assert!(is_weakly_connected(&doc.store, &Exclusion::none()));
        assert_eq!(components(&doc.store, &Exclusion::none()).len(), 1);
    }

    #[test]
    fn excluding_interior_node_splits_chain() {
        let doc = doc_with_chain(&["a", "b", "c"]);
        let comps = components(&doc.store, &Exclusion::node("b"));
        assert_eq!(comps.len(), 2);
        assert!(comps[0].contains("a"));
        assert!(comps[1].contains("c"));
    }

    #[test]
    fn excluding_edge_pair_splits_chain() {
        let doc = doc_with_chain(&["a", "b"]);
        assert!(!is_weakly_connected(
            &doc.store,
            &Exclusion::edge_pair("a", "b")
        ));
        // Excluding the reverse key splits just the same.
        assert!(!is_weakly_connected(
            &doc.store,
            &Exclusion::edge_pair("b", "a")
        ));
    }

    #[test]
    fn empty_store_is_vacuously_connected() {
        let doc = GraphDoc::new("test".to_string());
        assert!(is_weakly_connected(&doc.store, &Exclusion::none()));
    }
}
