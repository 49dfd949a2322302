//! Lamport stamps and version vectors.
//!
//! A [`Stamp`] is a Lamport dot `(counter, actor)`: totally ordered, with
//! ties broken by the lexicographically greater actor id. Every replicated
//! write carries one. A [`VersionVector`] records, per actor, the highest
//! counter observed and drives delta sync ("send me everything I have not
//! seen").
//!
//! # Examples
//!
//! ```
//! use tether_crdt::{Stamp, VersionVector};
//!
//! let a1 = Stamp::new(1, "replica-a");
//! let b2 = Stamp::new(2, "replica-b");
//! assert!(b2 > a1);
//!
//! let mut seen = VersionVector::new();
//! seen.observe(&a1);
//! assert!(seen.contains(&a1));
//! assert!(!seen.contains(&b2));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A Lamport dot identifying a single replicated write.
///
/// Ordered by `(counter, actor)`; equal counters resolve by the
/// lexicographically greater actor, so any two stamps from distinct writes
/// compare deterministically on every replica.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    /// Lamport counter at write time.
    pub counter: u64,
    /// Id of the replica that performed the write.
    pub actor: String,
}

impl Stamp {
    /// Create a stamp for the given counter and actor.
    pub fn new(counter: u64, actor: impl Into<String>) -> Self {
        Self {
            counter,
            actor: actor.into(),
        }
    }
}

/// Per-actor high-water marks of observed Lamport counters.
///
/// Merge takes the per-actor maximum, which is commutative, associative,
/// and idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector {
    entries: BTreeMap<String, u64>,
}

impl VersionVector {
    /// Create an empty version vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest counter observed for the given actor (0 if never seen).
    pub fn get(&self, actor: &str) -> u64 {
        self.entries.get(actor).copied().unwrap_or(0)
    }

    /// Record a stamp as observed.
    pub fn observe(&mut self, stamp: &Stamp) {
        let entry = self.entries.entry(stamp.actor.clone()).or_insert(0);
        *entry = (*entry).max(stamp.counter);
    }

    /// Whether the stamp has already been observed.
    pub fn contains(&self, stamp: &Stamp) -> bool {
        self.get(&stamp.actor) >= stamp.counter
    }

    /// Merge with another vector: per-actor max.
    pub fn merge(&mut self, other: &Self) {
        for (actor, &counter) in &other.entries {
            let entry = self.entries.entry(actor.clone()).or_insert(0);
            *entry = (*entry).max(counter);
        }
    }

    /// Highest counter across all actors.
    pub fn max_counter(&self) -> u64 {
        self.entries.values().copied().max().unwrap_or(0)
    }

    /// Iterate `(actor, counter)` pairs in actor order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(actor, &c)| (actor.as_str(), c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_order_by_counter_then_actor() {
        assert!(Stamp::new(2, "a") > Stamp::new(1, "z"));
        assert!(Stamp::new(3, "b") > Stamp::new(3, "a"));
        assert_eq!(Stamp::new(3, "a"), Stamp::new(3, "a"));
    }

    #[test]
    fn vector_merge_is_idempotent_and_commutative() {
        let mut a = VersionVector::new();
        a.observe(&Stamp::new(4, "a"));
        let mut b = VersionVector::new();
        b.observe(&Stamp::new(7, "b"));

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);
        assert_eq!(ab, ba);

        let snapshot = ab.clone();
        ab.merge(&b);
        assert_eq!(ab, snapshot);
    }

    #[test]
    fn contains_tracks_per_actor_high_water() {
        let mut vv = VersionVector::new();
        vv.observe(&Stamp::new(5, "a"));
        assert!(vv.contains(&Stamp::new(3, "a")));
        assert!(!vv.contains(&Stamp::new(6, "a")));
        assert!(!vv.contains(&Stamp::new(1, "b")));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn vector(stamps: Vec<(u8, u64)>) -> VersionVector {
            let mut vv = VersionVector::new();
            for (actor, counter) in stamps {
                vv.observe(&Stamp::new(counter, format!("r{actor}")));
            }
            vv
        }

        proptest! {
            #[test]
            fn merge_commutes_and_converges(
                a in proptest::collection::vec((0u8..4, 1u64..50), 0..12),
                b in proptest::collection::vec((0u8..4, 1u64..50), 0..12),
            ) {
                let (va, vb) = (vector(a), vector(b));

                let mut ab = va.clone();
                ab.merge(&vb);
                let mut ba = vb.clone();
                ba.merge(&va);
                prop_assert_eq!(&ab, &ba);

                // Idempotent: merging again changes nothing.
                let snapshot = ab.clone();
                ab.merge(&vb);
                ab.merge(&va);
                prop_assert_eq!(&ab, &snapshot);
            }
        }
    }
}
