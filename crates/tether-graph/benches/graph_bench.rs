//! Criterion benchmarks for the replicated graph engine.
//!
//! Targets:
//! - connectivity check (500-node chain) < 5ms
//! - full snapshot merge (500 nodes) < 50ms
//! - merge + repair of a split cycle < 10ms
//! - garbage-collecting edge read (500 nodes) < 5ms

use criterion::{criterion_group, criterion_main, Criterion};

use tether_graph::{GraphReplica, Position};

fn build_chain(n: usize) -> GraphReplica {
    let mut replica = GraphReplica::with_replica_id("bench");
    replica
        .add_node("n0000", "n0000", Position::new(0.0, 0.0))
        .unwrap();
    for i in 1..n {
        let id = format!("n{i:04}");
        let prev = format!("n{:04}", i - 1);
        replica
            .add_node_with_edge(&id, &id, Position::new(i as f64, 0.0), &prev, &id, "e")
            .unwrap();
    }
    replica
}

fn build_cycle(replica: &mut GraphReplica, ids: &[&str]) {
    replica.add_node(ids[0], ids[0], Position::new(0.0, 0.0)).unwrap();
    for pair in ids.windows(2) {
        replica
            .add_node_with_edge(pair[1], pair[1], Position::new(0.0, 0.0), pair[0], pair[1], "e")
            .unwrap();
    }
    replica.add_edge(ids[ids.len() - 1], ids[0], "close").unwrap();
}

fn bench_connectivity_check(c: &mut Criterion) {
    let replica = build_chain(500);
    c.bench_function("is_weakly_connected_500_chain", |bench| {
        bench.iter(|| replica.is_weakly_connected());
    });
}

fn bench_full_merge(c: &mut Criterion) {
    let source = build_chain(500);
    let empty = GraphReplica::with_replica_id("sink");
    let delta = source.export_delta(&empty.version()).unwrap();

    c.bench_function("full_snapshot_merge_500_nodes", |bench| {
        bench.iter(|| {
            let mut sink = empty.clone();
            sink.apply_delta(&delta).unwrap();
        });
    });
}

fn bench_merge_and_repair_split(c: &mut Criterion) {
    // Two replicas remove opposite sides of a square; the merged state
    // needs a tombstoned-node bridge.
    let mut a = GraphReplica::with_replica_id("a");
    build_cycle(&mut a, &["na", "nb", "nc", "nd"]);
    let mut b = GraphReplica::with_replica_id("b");
    let seed = a.export_delta(&b.version()).unwrap();
    b.apply_delta(&seed).unwrap();

    a.remove_node("nb").unwrap();
    b.remove_node("nd").unwrap();
    let delta = a.export_delta(&b.version()).unwrap();

    c.bench_function("merge_and_repair_split_cycle", |bench| {
        bench.iter(|| {
            let mut target = b.clone();
            target.apply_delta(&delta).unwrap();
        });
    });
}

fn bench_gc_edge_read(c: &mut Criterion) {
    let replica = build_chain(500);
    c.bench_function("edge_count_gc_read_500_nodes", |bench| {
        bench.iter(|| {
            let mut local = replica.clone();
            local.edge_count()
        });
    });
}

criterion_group!(
    benches,
    bench_connectivity_check,
    bench_full_merge,
    bench_merge_and_repair_split,
    bench_gc_edge_read,
);
criterion_main!(benches);
