//! Typed identifiers for Domain objects.
//!
//! Each kind gets its own newtype so a node id cannot be passed where an
//! element id is expected. Ids are dense 0-based indices stored as `index + 1`
//! in a `NonZeroU32`, which keeps `Option<Id>` the size of the id.

use core::fmt;
use core::num::NonZeroU32;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Id for a 0-based index. Saturates at `u32::MAX - 1`.
            pub fn from_index(index: u32) -> Self {
                Self(NonZeroU32::MIN.saturating_add(index))
            }

            pub fn index(self) -> u32 {
                self.0.get() - 1
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "({})"), self.index())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.index())
            }
        }
    };
}

define_id!(
    /// A Domain node.
    NodeId,
    "Node"
);
define_id!(
    /// A Domain element.
    ElemId,
    "Elem"
);
define_id!(
    /// A load pattern registered with the Domain.
    PatternId,
    "Pattern"
);

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn option_id_is_small() {
        assert_eq!(
            core::mem::size_of::<NodeId>(),
            core::mem::size_of::<Option<NodeId>>()
        );
    }

    #[test]
    fn debug_names_the_kind() {
        assert_eq!(format!("{:?}", ElemId::from_index(3)), "Elem(3)");
        assert_eq!(NodeId::from_index(7).to_string(), "7");
    }

    proptest! {
        #[test]
        fn index_round_trip(i in 0u32..u32::MAX) {
            prop_assert_eq!(NodeId::from_index(i).index(), i);
        }

        #[test]
        fn ordering_follows_index(a in 0u32..1_000_000, b in 0u32..1_000_000) {
            prop_assert_eq!(PatternId::from_index(a) < PatternId::from_index(b), a < b);
        }
    }
}
