use std::fmt::{Display, Formatter};

use crate::cost::CostEstimate;
use crate::error::OptResult;
use crate::operator::{check_arity, OperatorCategory, OperatorTrait};
use crate::optimizer::OptimizerContext;
use crate::properties::{Convention, LogicalProperty};
use crate::stat::Statistics;

const CONVERSION_COST_PER_ROW: f64 = 0.1;

/// Changes the calling convention of its input without changing its rows.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Converter {
    from: Convention,
    to: Convention,
}

impl Converter {
    pub fn new(from: Convention, to: Convention) -> Self {
        Self { from, to }
    }

    pub fn from_convention(&self) -> Convention {
        self.from
    }

    pub fn to_convention(&self) -> Convention {
        self.to
    }
}

impl OperatorTrait for Converter {
    fn category(&self) -> OperatorCategory {
        OperatorCategory::Converter
    }

    fn derive_logical_prop(
        &self,
        inputs: &[&LogicalProperty],
        _ctx: &OptimizerContext,
    ) -> OptResult<LogicalProperty> {
        check_arity(self, inputs.len())?;
        Ok(inputs[0].clone())
    }

    fn derive_statistics(
        &self,
        _prop: &LogicalProperty,
        inputs: &[&Statistics],
        _ctx: &OptimizerContext,
    ) -> OptResult<Statistics> {
        Ok(*inputs[0])
    }

    fn self_cost(&self, stat: &Statistics, _inputs: &[&Statistics]) -> CostEstimate {
        CostEstimate::new(
            stat.row_count(),
            stat.row_count() * CONVERSION_COST_PER_ROW,
            0.0,
        )
    }

    fn input_convention(&self, _convention: Convention, _idx: usize) -> Convention {
        self.from
    }
}

impl Display for Converter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Converter(from={}, to={})", self.from, self.to)
    }
}
