//! Shared model types: geometry and render-ready snapshot views.

pub mod geometry;
pub mod view;

pub use geometry::{Dimension, Position};
pub use view::{EdgeView, NodeView};
