//! Configuration for a graph replica.
//!
//! # Examples
//!
//! ```
//! use tether_core::config::GraphConfig;
//!
//! let config = GraphConfig::default();
//! assert!(config.replica_id.is_none());
//! assert_eq!(config.tombstoned_node_capacity, 20);
//! ```

use serde::{Deserialize, Serialize};

use crate::constants;

/// Configuration for a single graph replica.
///
/// All fields have sensible defaults; a replica created from
/// `GraphConfig::default()` generates its own replica id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Stable identifier of this replica. Default: none (a random id is
    /// generated when the replica is created).
    pub replica_id: Option<String>,
    /// Maximum node entries retained in the tombstone log. Default: 20.
    pub tombstoned_node_capacity: usize,
    /// Maximum tombstoned nodes on a single bridge path. Default: 12.
    pub max_bridge_path_len: usize,
    /// Traversal budget for the path bridge search. Default: 10_000.
    pub bridge_search_budget: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            replica_id: None,
            tombstoned_node_capacity: constants::TOMBSTONED_NODE_CAPACITY,
            max_bridge_path_len: constants::MAX_BRIDGE_PATH_LEN,
            bridge_search_budget: constants::BRIDGE_SEARCH_BUDGET,
        }
    }
}
