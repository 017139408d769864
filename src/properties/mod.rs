//! Properties of relation operators.

use std::fmt::Debug;
use std::hash::Hash;

mod logical;
pub use logical::*;
mod physical;
pub use physical::*;

pub trait PhysicalProp: Debug + Hash {
    /// Whether a node delivering `self` can be used where `other` is required.
    fn satisfies(&self, other: &Self) -> bool;
}
