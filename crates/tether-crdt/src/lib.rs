//! Replication primitives underpinning the graph document.
//!
//! Conflict-free building blocks with proven convergence properties
//! (commutativity, associativity, idempotency): Lamport stamps, version
//! vectors, and a last-writer-wins register.

pub mod clock;
pub mod lww_register;

pub use clock::{Stamp, VersionVector};
pub use lww_register::LwwRegister;
