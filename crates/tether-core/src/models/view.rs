//! Render-ready snapshots of live graph elements.
//!
//! Views are plain values handed to UI collaborators: they carry the
//! element's current replicated fields plus the replica-local selection
//! flag. They serialize in field order, so a sorted `Vec` of views is a
//! canonical dump.

use serde::{Deserialize, Serialize};

use crate::models::geometry::{Dimension, Position};

/// Snapshot of a live node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub id: String,
    pub label: String,
    pub position: Position,
    pub dimension: Dimension,
    pub selected: bool,
}

/// Snapshot of a live directed edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeView {
    pub source: String,
    pub target: String,
    pub label: String,
    pub selected: bool,
}
