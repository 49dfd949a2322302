//! Cross-replica convergence tests.
//!
//! Each scenario drives two replicas through concurrent operations, merges
//! them pairwise, and asserts that observable state (node ids, edge ids,
//! counts, canonical JSON dumps) is identical on both sides and weakly
//! connected.

use tether_graph::{GraphReplica, Position};

/// Exchange deltas in both directions until neither side changes.
fn sync_pair(a: &mut GraphReplica, b: &mut GraphReplica) {
    for _ in 0..8 {
        let to_b = a.export_delta(&b.version()).unwrap();
        let b_outcome = b.apply_delta(&to_b).unwrap();
        let to_a = b.export_delta(&a.version()).unwrap();
        let a_outcome = a.apply_delta(&to_a).unwrap();
        if !a_outcome.changed && !b_outcome.changed {
            return;
        }
    }
    panic!("replicas failed to quiesce");
}

fn assert_converged(a: &mut GraphReplica, b: &mut GraphReplica) {
    assert_eq!(a.node_count(), b.node_count());
    assert_eq!(a.edge_count(), b.edge_count());
    assert_eq!(a.nodes_as_json().unwrap(), b.nodes_as_json().unwrap());
    assert_eq!(a.edges_as_json().unwrap(), b.edges_as_json().unwrap());
    assert_eq!(
        a.removed_elements_as_json().unwrap(),
        b.removed_elements_as_json().unwrap()
    );
}

fn pos() -> Position {
    Position::new(0.0, 0.0)
}

#[test]
fn seed_node_reaches_empty_replica() {
    let mut a = GraphReplica::with_replica_id("a");
    let mut b = GraphReplica::with_replica_id("b");

    a.add_node("root", "Root", pos()).unwrap();
    sync_pair(&mut a, &mut b);

    for replica in [&mut a, &mut b] {
        assert_eq!(replica.node_count(), 1);
        assert_eq!(replica.edge_count(), 0);
        assert!(replica.is_weakly_connected());
    }
    assert_converged(&mut a, &mut b);
}

#[test]
fn reversed_key_edge_removal_cascades_into_leaf_node() {
    let mut a = GraphReplica::with_replica_id("a");
    let mut b = GraphReplica::with_replica_id("b");

    a.add_node("root", "Root", pos()).unwrap();
    a.add_node_with_edge("n1", "N1", pos(), "root", "n1", "e1")
        .unwrap();
    sync_pair(&mut a, &mut b);

    // The stored key is (root, n1); the reversed key resolves to it. The
    // removal would strand n1 as a lone island, so it cascades into
    // removing the node, snapshot and all.
    a.remove_edge("n1", "root").unwrap();
    sync_pair(&mut a, &mut b);

    for replica in [&mut a, &mut b] {
        assert_eq!(replica.node_count(), 1);
        assert!(replica.get_node("root").is_some());
        assert_eq!(replica.edge_count(), 0);
        assert!(replica.is_weakly_connected());
    }
    assert_converged(&mut a, &mut b);
}

#[test]
fn node_deletion_beats_concurrent_growth_under_it() {
    let mut a = GraphReplica::with_replica_id("a");
    let mut b = GraphReplica::with_replica_id("b");

    a.add_node("root", "Root", pos()).unwrap();
    a.add_node_with_edge("n1", "N1", pos(), "root", "n1", "e1")
        .unwrap();
    sync_pair(&mut a, &mut b);

    // A removes the only edge, which takes n1 with it; B concurrently
    // grows a new branch from n1. The deletion wins: n2 arrives holding
    // only references to the dead n1 and is collected with it.
    a.remove_edge("root", "n1").unwrap();
    b.add_node_with_edge("n2", "N2", pos(), "n1", "n2", "e1-2")
        .unwrap();
    sync_pair(&mut a, &mut b);

    for replica in [&mut a, &mut b] {
        assert_eq!(replica.node_count(), 1);
        assert!(replica.get_node("root").is_some());
        assert!(replica.get_node("n1").is_none());
        assert!(replica.get_node("n2").is_none());
        assert_eq!(replica.edge_count(), 0);
        assert!(replica.is_weakly_connected());
    }
    assert_converged(&mut a, &mut b);
}

#[test]
fn dangling_reference_from_concurrent_add_and_remove_is_collected() {
    let mut a = GraphReplica::with_replica_id("a");
    let mut b = GraphReplica::with_replica_id("b");

    a.add_node("u", "U", pos()).unwrap();
    a.add_node_with_edge("v", "V", pos(), "u", "v", "uv").unwrap();
    a.add_node_with_edge("w", "W", pos(), "v", "w", "vw").unwrap();
    sync_pair(&mut a, &mut b);

    // Concurrent add-edge toward a node the other replica removes: the
    // merge legally leaves u with a half-edge toward the absent w.
    b.remove_node("w").unwrap();
    a.add_edge("u", "w", "uw").unwrap();

    let delta = b.export_delta(&a.version()).unwrap();
    a.apply_delta(&delta).unwrap();

    // Reading edges must collect the dangling half without panicking.
    let edges = a.edges();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source, "u");
    assert_eq!(edges[0].target, "v");
    assert_eq!(a.edge_count(), 1);
    assert_eq!(a.node_count(), 2);
    assert!(a.is_weakly_connected());

    // Every edge endpoint returned by a read is a live node.
    let node_ids: Vec<String> = a.nodes().into_iter().map(|n| n.id).collect();
    for edge in a.edges() {
        assert!(node_ids.contains(&edge.source));
        assert!(node_ids.contains(&edge.target));
    }

    sync_pair(&mut a, &mut b);
    assert_converged(&mut a, &mut b);
}

#[test]
fn removed_node_leaves_no_dangling_edge_count() {
    let mut a = GraphReplica::with_replica_id("a");
    let mut b = GraphReplica::with_replica_id("b");

    a.add_node("u", "U", pos()).unwrap();
    a.add_node_with_edge("v", "V", pos(), "u", "v", "uv").unwrap();
    sync_pair(&mut a, &mut b);

    b.remove_node("v").unwrap();
    let delta = b.export_delta(&a.version()).unwrap();
    a.apply_delta(&delta).unwrap();

    assert_eq!(a.edge_count(), 0);
    assert_eq!(a.node_count(), 1);
    assert!(a.is_weakly_connected());
}

#[test]
fn reapplying_a_delta_changes_nothing() {
    let mut a = GraphReplica::with_replica_id("a");
    let mut b = GraphReplica::with_replica_id("b");

    a.add_node("root", "Root", pos()).unwrap();
    a.add_node_with_edge("n1", "N1", pos(), "root", "n1", "e1")
        .unwrap();

    let delta = a.export_delta(&b.version()).unwrap();
    let first = b.apply_delta(&delta).unwrap();
    assert!(first.changed);

    let nodes_before = b.nodes_as_json().unwrap();
    let edges_before = b.edges_as_json().unwrap();
    let second = b.apply_delta(&delta).unwrap();
    assert!(!second.changed);
    assert_eq!(b.nodes_as_json().unwrap(), nodes_before);
    assert_eq!(b.edges_as_json().unwrap(), edges_before);
}

#[test]
fn merging_a_replica_with_itself_is_identity() {
    let mut a = GraphReplica::with_replica_id("a");
    a.add_node("root", "Root", pos()).unwrap();
    a.add_node_with_edge("n1", "N1", pos(), "root", "n1", "e1")
        .unwrap();

    let own_version = a.version();
    let delta = a.export_delta(&own_version).unwrap();
    let nodes_before = a.nodes_as_json().unwrap();
    let outcome = a.apply_delta(&delta).unwrap();
    assert!(!outcome.changed);
    assert_eq!(a.nodes_as_json().unwrap(), nodes_before);
}

#[test]
fn canonical_dumps_are_sorted() {
    let mut a = GraphReplica::with_replica_id("a");
    a.add_node("m", "M", pos()).unwrap();
    for id in ["z", "b", "q", "a1"] {
        a.add_node_with_edge(id, id, pos(), "m", id, "e").unwrap();
    }

    let ids: Vec<String> = a.nodes().into_iter().map(|n| n.id).collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);

    let keys: Vec<(String, String)> = a
        .edges()
        .into_iter()
        .map(|e| (e.source, e.target))
        .collect();
    let mut sorted_keys = keys.clone();
    sorted_keys.sort();
    assert_eq!(keys, sorted_keys);
}
