//! # tether-core
//!
//! Foundation crate for the tether replicated graph engine.
//! Defines warnings, models, config, and constants.
//! Every other crate in the workspace depends on this.

pub mod config;
pub mod constants;
pub mod errors;
pub mod models;

// Re-export the most commonly used types at the crate root.
pub use config::GraphConfig;
pub use errors::{GraphResult, GraphWarning, SyncError};
pub use models::{Dimension, EdgeView, NodeView, Position};
