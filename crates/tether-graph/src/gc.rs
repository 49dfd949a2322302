//! Garbage collector for dangling references.
//!
//! The substrate resolves adds and removes independently per key, so a
//! concurrent `add_edge(u, v)` on one replica and `remove_node(v)` on
//! another legally merge into `u` holding a half-edge toward the now-absent
//! `v`. The collector runs lazily on edge-reading paths and as the first
//! step of repair: it deletes such dangling halves, drops the matching
//! selection bookkeeping, and collects nodes that the sweep strips bare.
//!
//! A node whose every present edge was dangling owed its membership in the
//! graph to elements that were concurrently deleted; once the sweep leaves
//! it with no edges at all (and other live nodes exist) it is removed with
//! a removal marker. Nodes that lost their edges through proper tombstoned
//! removals are untouched — the repair engine reconnects those.

use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::replica::SelectionState;
use crate::store::GraphDoc;

/// What a collection pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct GcReport {
    pub dangling_halves: usize,
    pub orphan_nodes: Vec<String>,
}

impl GcReport {
    pub fn is_empty(&self) -> bool {
        self.dangling_halves == 0 && self.orphan_nodes.is_empty()
    }
}

/// Sweep the store until no dangling reference remains.
pub(crate) fn collect(doc: &mut GraphDoc, selection: &mut SelectionState) -> GcReport {
    let mut report = GcReport::default();

    loop {
        let mut orphans: Vec<String> = Vec::new();
        let live: BTreeSet<String> = doc.store.nodes.keys().cloned().collect();

        for (id, record) in doc.store.nodes.iter_mut() {
            let mut dropped_present = 0usize;
            for map in [&mut record.outgoing, &mut record.incoming] {
                map.retain(|peer, slot| {
                    if live.contains(peer) {
                        return true;
                    }
                    if slot.present() {
                        dropped_present += 1;
                    }
                    false
                });
            }
            report.dangling_halves += dropped_present;

            let bare = record.outgoing.values().all(|s| !s.present())
                && record.incoming.values().all(|s| !s.present());
            if dropped_present > 0 && bare && live.len() > 1 {
                orphans.push(id.clone());
            }
        }

        if orphans.is_empty() {
            break;
        }
        for id in orphans {
            let stamp = doc.next_stamp();
            warn!(node = %id, "collecting node stripped bare by dangling references");
            doc.store.merge_removal(&id, &stamp);
            report.orphan_nodes.push(id);
        }
        // Removing orphans can strand further references; sweep again.
    }

    selection.prune(&doc.store);

    if !report.is_empty() {
        debug!(
            dangling_halves = report.dangling_halves,
            orphan_nodes = report.orphan_nodes.len(),
            "garbage collection pass"
        );
    }
    report
}
