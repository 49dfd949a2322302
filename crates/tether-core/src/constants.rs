/// Tether system version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum number of node entries retained in the tombstone log. Once
/// exceeded, the oldest node entries are evicted — bounds memory at the cost
/// of eventually losing repair material for very old splits.
pub const TOMBSTONED_NODE_CAPACITY: usize = 20;

/// Maximum number of tombstoned nodes on a single bridge path.
pub const MAX_BRIDGE_PATH_LEN: usize = 12;

/// Upper bound on auxiliary-graph traversal steps during the path bridge
/// search. Exceeding it aborts the current repair attempt (the graph stays
/// split until a later merge supplies more tombstone material).
pub const BRIDGE_SEARCH_BUDGET: usize = 10_000;
