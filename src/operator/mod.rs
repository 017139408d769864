//! Relational operators.
//!
//! An [`Operator`] is the payload of one relational expression. Which calling convention the
//! expression runs in is not part of the operator: the same `Filter` may exist as a logical node
//! and as an iterator node, the convention is carried next to it by plans and optimizers.

use std::fmt::{Display, Formatter};

use enum_as_inner::EnumAsInner;
use enum_dispatch::enum_dispatch;
use enumset::EnumSetType;

use crate::cost::CostEstimate;
use crate::error::OptResult;
use crate::optimizer::OptimizerContext;
use crate::properties::{Convention, LogicalProperty};
use crate::stat::Statistics;

mod aggregate;
pub use aggregate::*;
mod converter;
pub use converter::*;
mod filter;
pub use filter::*;
mod jdbc_query;
pub use jdbc_query::*;
mod projection;
pub use projection::*;
mod table_scan;
pub use table_scan::*;
mod union;
pub use union::*;
mod values;
pub use values::*;

/// Shape of an operator's input list, used by the pattern matcher.
#[derive(EnumSetType, Debug, Hash, strum_macros::Display)]
pub enum OperatorCategory {
    /// No inputs.
    Leaf,
    /// Exactly one input.
    SingleInput,
    /// One or more inputs with the same row type.
    SetOp,
    /// Changes the calling convention of its single input.
    Converter,
}

impl OperatorCategory {
    pub fn is_leaf(self) -> bool {
        self == OperatorCategory::Leaf
    }

    pub fn is_single_input(self) -> bool {
        matches!(
            self,
            OperatorCategory::SingleInput | OperatorCategory::Converter
        )
    }
}

#[enum_dispatch]
pub trait OperatorTrait {
    fn category(&self) -> OperatorCategory;

    /// Derives the row type and unique keys from the inputs' properties.
    fn derive_logical_prop(
        &self,
        inputs: &[&LogicalProperty],
        ctx: &OptimizerContext,
    ) -> OptResult<LogicalProperty>;

    fn derive_statistics(
        &self,
        prop: &LogicalProperty,
        inputs: &[&Statistics],
        ctx: &OptimizerContext,
    ) -> OptResult<Statistics>;

    /// Resources consumed by this operator alone, given its output and input statistics.
    fn self_cost(&self, stat: &Statistics, inputs: &[&Statistics]) -> CostEstimate;

    /// Convention required of input `idx` when this operator runs in `convention`.
    fn input_convention(&self, convention: Convention, _idx: usize) -> Convention {
        convention
    }
}

/// Relational operator.
#[enum_dispatch(OperatorTrait)]
#[derive(Clone, Debug, Hash, Eq, PartialEq, EnumAsInner, strum_macros::EnumDiscriminants)]
#[strum_discriminants(name(OperatorKind), derive(Hash, strum_macros::Display))]
pub enum Operator {
    TableScan(TableScan),
    Values(Values),
    Filter(Filter),
    Projection(Projection),
    Aggregate(Aggregate),
    Union(Union),
    JdbcQuery(JdbcQuery),
    Converter(Converter),
}

impl Operator {
    pub fn kind(&self) -> OperatorKind {
        OperatorKind::from(self)
    }
}

impl OperatorKind {
    pub fn category(self) -> OperatorCategory {
        match self {
            OperatorKind::TableScan | OperatorKind::Values | OperatorKind::JdbcQuery => {
                OperatorCategory::Leaf
            }
            OperatorKind::Filter | OperatorKind::Projection | OperatorKind::Aggregate => {
                OperatorCategory::SingleInput
            }
            OperatorKind::Union => OperatorCategory::SetOp,
            OperatorKind::Converter => OperatorCategory::Converter,
        }
    }
}

/// Digest form of an operator, also used by explain output.
impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Operator::TableScan(op) => write!(f, "{}", op),
            Operator::Values(op) => write!(f, "{}", op),
            Operator::Filter(op) => write!(f, "{}", op),
            Operator::Projection(op) => write!(f, "{}", op),
            Operator::Aggregate(op) => write!(f, "{}", op),
            Operator::Union(op) => write!(f, "{}", op),
            Operator::JdbcQuery(op) => write!(f, "{}", op),
            Operator::Converter(op) => write!(f, "{}", op),
        }
    }
}

/// Checks the input count of an operator before deriving properties.
pub(crate) fn check_arity(op: &dyn OperatorTrait, inputs: usize) -> OptResult<()> {
    let ok = match op.category() {
        OperatorCategory::Leaf => inputs == 0,
        OperatorCategory::SingleInput | OperatorCategory::Converter => inputs == 1,
        OperatorCategory::SetOp => inputs >= 1,
    };
    anyhow::ensure!(
        ok,
        "{} operator can't have {} inputs",
        op.category(),
        inputs
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit};

    #[test]
    fn test_kind_and_category() {
        let filter = Operator::Filter(Filter::new(col(0).eq(lit(1))));
        assert_eq!(filter.kind(), OperatorKind::Filter);
        assert_eq!(filter.category(), OperatorCategory::SingleInput);
        assert_eq!(OperatorKind::Filter.category(), filter.category());

        let union = Operator::Union(Union::new(true));
        assert_eq!(union.kind().category(), OperatorCategory::SetOp);
        assert!(union.as_union().unwrap().all());
    }

    #[test]
    fn test_converter_input_convention() {
        let conv = Operator::Converter(Converter::new(Convention::ResultSet, Convention::Iterator));
        assert_eq!(
            conv.input_convention(Convention::Iterator, 0),
            Convention::ResultSet
        );

        let filter = Operator::Filter(Filter::new(col(0).eq(lit(1))));
        assert_eq!(
            filter.input_convention(Convention::Iterator, 0),
            Convention::Iterator
        );
    }
}
