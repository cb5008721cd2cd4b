//! Operator and plan-node identifiers.
//!
//! Ids are handed out sequentially by the container that owns them,
//! so later ids always compare greater than earlier ones; the circuit
//! relies on this to make insertion order a topological order.

use serde::{Deserialize, Serialize};
use std::{
    cell::Cell,
    fmt::{self, Debug, Display},
};

/// Declares an identifier newtype together with the sequential
/// generator its owning container uses to assign it.
macro_rules! identifiers {
    ($($(#[$meta:meta])* $name:ident / $generator:ident = $prefix:literal),+ $(,)?) => {$(
        $(#[$meta])*
        #[derive(
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Deserialize,
            Serialize,
        )]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub(crate) const fn new(value: u32) -> Self {
                Self(value)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                Display::fmt(self, f)
            }
        }

        #[doc = concat!("Hands out [`", stringify!($name), "`]s in ascending order, starting at 1.")]
        #[derive(Debug)]
        pub struct $generator {
            next: Cell<u32>,
        }

        impl $generator {
            pub const fn new() -> Self {
                Self {
                    next: Cell::new(1),
                }
            }

            /// The next unused id.
            ///
            /// ## Panics
            ///
            /// Panics when the id space is exhausted; a circuit with
            /// `u32::MAX` operators has gone wrong long before this.
            pub fn next(&self) -> $name {
                let id = self.next.get();
                let Some(following) = id.checked_add(1) else {
                    exhausted(stringify!($name));
                };
                self.next.set(following);
                $name(id)
            }
        }

        impl Default for $generator {
            fn default() -> Self {
                Self::new()
            }
        }
    )+};
}

#[cold]
fn exhausted(name: &'static str) -> ! {
    panic!("{name} space exhausted")
}

identifiers! {
    /// Identifies an operator within one circuit
    NodeId / NodeIdGen = "n",
    /// Identifies a node of the incoming relational plan
    RelNodeId / RelNodeIdGen = "rel",
}

#[cfg(test)]
mod tests {
    use super::{NodeId, NodeIdGen};

    #[test]
    fn ids_are_sequential() {
        let generator = NodeIdGen::new();
        assert_eq!(generator.next(), NodeId::new(1));
        assert_eq!(generator.next(), NodeId::new(2));
        assert_eq!(generator.next(), NodeId::new(3));
    }

    #[test]
    fn later_ids_compare_greater() {
        let generator = NodeIdGen::new();
        let first = generator.next();
        let second = generator.next();
        assert!(first < second);
    }

    #[test]
    fn display_uses_prefix() {
        assert_eq!(NodeId::new(7).to_string(), "n7");
    }
}
