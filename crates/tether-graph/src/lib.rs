//! # tether-graph
//!
//! A replicated graph that stays **weakly connected** — every node
//! reachable from every other, ignoring edge direction — even though
//! independent replicas mutate it offline and merge without coordination.
//!
//! Local mutations pass an invariant guard that refuses operations which
//! would disconnect the graph. Removed elements move into a causally-merged
//! tombstone log. Merges are commutative, associative, and idempotent, and
//! every merge is followed by a deterministic repair pass that garbage
//! collects dangling references and replays tombstoned material to
//! reconnect components split apart by concurrent deletions — identically
//! on every replica, because it runs over identical merged inputs.
//!
//! # Examples
//!
//! ```
//! use tether_graph::GraphReplica;
//! use tether_core::models::Position;
//!
//! let mut a = GraphReplica::with_replica_id("a");
//! let mut b = GraphReplica::with_replica_id("b");
//!
//! a.add_node("root", "Root", Position::new(0.0, 0.0)).unwrap();
//! a.add_node_with_edge("n1", "Child", Position::new(1.0, 0.0), "root", "n1", "link")
//!     .unwrap();
//!
//! let delta = a.export_delta(&b.version()).unwrap();
//! b.apply_delta(&delta).unwrap();
//!
//! assert_eq!(b.node_count(), 2);
//! assert!(b.is_weakly_connected());
//! ```

mod connectivity;
mod gc;
mod guard;
mod repair;
mod replica;
mod store;
mod sync;
mod tombstone;

pub use repair::RepairReport;
pub use replica::{GraphReplica, MergeOutcome};
pub use tombstone::{EdgeRef, TombstoneEntry, TombstoneRecord};

// Re-export the foundation types callers need at the API boundary.
pub use tether_core::config::GraphConfig;
pub use tether_core::errors::{GraphResult, GraphWarning, SyncError};
pub use tether_core::models::{Dimension, EdgeView, NodeView, Position};
pub use tether_crdt::VersionVector;
