//! Identifiers for in-match entities.
//!
//! Assigned when the entity is constructed, from process-wide counters,
//! so nothing needs a storage layer to get a stable id.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Allocates a fresh id.
            pub fn next() -> Self {
                static COUNTER: AtomicU64 = AtomicU64::new(1);
                Self(COUNTER.fetch_add(1, Ordering::Relaxed))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// A general deployed in a match.
    GeneralId,
    "G"
);
entity_id!(
    /// A card dealt into a hand.
    CardId,
    "C"
);
entity_id!(
    /// A terrain tile placed on the board.
    TerrainId,
    "T"
);
entity_id!(BuffId, "B");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_per_kind() {
        let a = GeneralId::next();
        let b = GeneralId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(TerrainId(3).to_string(), "T-3");
        assert_eq!(CardId(12).to_string(), "C-12");
    }
}
