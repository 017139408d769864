use enumset::{EnumSet, EnumSetType};

use crate::properties::PhysicalProp;

/// Calling convention: the physical execution model of a relational expression.
///
/// `None` is the convention of logical expressions, which cannot be executed and must be
/// converted into some other convention before a plan is complete.
#[derive(EnumSetType, Debug, Hash, strum_macros::Display, strum_macros::EnumIter)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Convention {
    None,
    /// In-memory iterator over rows.
    Iterator,
    /// Result set of a query evaluated by a remote JDBC source.
    ResultSet,
}

pub type ConventionSet = EnumSet<Convention>;

impl Convention {
    pub fn is_physical(self) -> bool {
        self != Convention::None
    }
}

impl Default for Convention {
    fn default() -> Self {
        Convention::None
    }
}

impl PhysicalProp for Convention {
    fn satisfies(&self, other: &Self) -> bool {
        self == other
    }
}

/// Physical properties delivered by a plan node.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Default)]
pub struct PhysicalPropertySet {
    convention: Convention,
}

impl PhysicalPropertySet {
    pub fn new(convention: Convention) -> Self {
        Self { convention }
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }
}

impl PhysicalProp for PhysicalPropertySet {
    fn satisfies(&self, other: &Self) -> bool {
        self.convention.satisfies(&other.convention)
    }
}
