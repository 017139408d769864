use std::fmt::{Display, Formatter};

use crate::cost::CostEstimate;
use crate::error::OptResult;
use crate::expr::Expr;
use crate::operator::{check_arity, OperatorCategory, OperatorTrait};
use crate::optimizer::OptimizerContext;
use crate::properties::{DataType, LogicalProperty};
use crate::stat::Statistics;

const FILTER_SELECTIVITY: f64 = 0.25;

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Filter {
    predicate: Expr,
}

impl Filter {
    pub fn new(predicate: Expr) -> Self {
        Self { predicate }
    }

    pub fn predicate(&self) -> &Expr {
        &self.predicate
    }
}

impl OperatorTrait for Filter {
    fn category(&self) -> OperatorCategory {
        OperatorCategory::SingleInput
    }

    fn derive_logical_prop(
        &self,
        inputs: &[&LogicalProperty],
        _ctx: &OptimizerContext,
    ) -> OptResult<LogicalProperty> {
        check_arity(self, inputs.len())?;
        let input = inputs[0];
        let data_type = self.predicate.data_type(input.schema())?;
        anyhow::ensure!(
            data_type == DataType::Boolean,
            "Filter predicate {} must be boolean, got {}",
            self.predicate,
            data_type
        );
        Ok(input.clone())
    }

    fn derive_statistics(
        &self,
        _prop: &LogicalProperty,
        inputs: &[&Statistics],
        _ctx: &OptimizerContext,
    ) -> OptResult<Statistics> {
        Ok(Statistics::new(inputs[0].row_count() * FILTER_SELECTIVITY))
    }

    fn self_cost(&self, stat: &Statistics, inputs: &[&Statistics]) -> CostEstimate {
        CostEstimate::new(stat.row_count(), inputs[0].row_count(), 0.0)
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Filter(condition={})", self.predicate)
    }
}
