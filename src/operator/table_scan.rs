use std::fmt::{Display, Formatter};

use crate::cost::CostEstimate;
use crate::error::{OptError, OptResult};
use crate::operator::{check_arity, OperatorCategory, OperatorTrait};
use crate::optimizer::OptimizerContext;
use crate::properties::LogicalProperty;
use crate::stat::Statistics;

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct TableScan {
    table_name: String,
}

impl TableScan {
    pub fn new<S: Into<String>>(table_name: S) -> Self {
        Self {
            table_name: table_name.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

impl OperatorTrait for TableScan {
    fn category(&self) -> OperatorCategory {
        OperatorCategory::Leaf
    }

    fn derive_logical_prop(
        &self,
        inputs: &[&LogicalProperty],
        ctx: &OptimizerContext,
    ) -> OptResult<LogicalProperty> {
        check_arity(self, inputs.len())?;
        let table = ctx
            .catalog()
            .table(&self.table_name)
            .ok_or_else(|| OptError::UnknownTable(self.table_name.clone()))?;

        Ok(LogicalProperty::new(table.schema().clone())
            .with_unique_keys(table.unique_keys().to_vec()))
    }

    fn derive_statistics(
        &self,
        _prop: &LogicalProperty,
        _inputs: &[&Statistics],
        ctx: &OptimizerContext,
    ) -> OptResult<Statistics> {
        let table = ctx
            .catalog()
            .table(&self.table_name)
            .ok_or_else(|| OptError::UnknownTable(self.table_name.clone()))?;
        Ok(Statistics::new(table.row_count()))
    }

    fn self_cost(&self, stat: &Statistics, _inputs: &[&Statistics]) -> CostEstimate {
        CostEstimate::new(stat.row_count(), 0.0, stat.row_count())
    }
}

impl Display for TableScan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TableScan(table={})", self.table_name)
    }
}
