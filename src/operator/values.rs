use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::cost::CostEstimate;
use crate::error::OptResult;
use crate::expr::ScalarValue;
use crate::operator::{check_arity, OperatorCategory, OperatorTrait};
use crate::optimizer::OptimizerContext;
use crate::properties::{column_set, ColumnSet, LogicalProperty, Schema};
use crate::stat::Statistics;

/// Literal rows.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Values {
    schema: Schema,
    rows: Vec<Vec<ScalarValue>>,
}

impl Values {
    pub fn new(schema: Schema, rows: Vec<Vec<ScalarValue>>) -> Self {
        Self { schema, rows }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Vec<ScalarValue>] {
        &self.rows
    }

    fn unique_keys(&self) -> Vec<ColumnSet> {
        if self.rows.len() <= 1 {
            return vec![ColumnSet::new()];
        }

        let mut keys: Vec<ColumnSet> = (0..self.schema.len())
            .filter(|c| {
                let distinct: HashSet<&ScalarValue> = self.rows.iter().map(|r| &r[*c]).collect();
                distinct.len() == self.rows.len()
            })
            .map(|c| column_set([c]))
            .collect();

        if keys.is_empty() && self.rows.iter().all_unique() {
            keys.push(column_set(0..self.schema.len()));
        }
        keys
    }
}

impl OperatorTrait for Values {
    fn category(&self) -> OperatorCategory {
        OperatorCategory::Leaf
    }

    fn derive_logical_prop(
        &self,
        inputs: &[&LogicalProperty],
        _ctx: &OptimizerContext,
    ) -> OptResult<LogicalProperty> {
        check_arity(self, inputs.len())?;
        anyhow::ensure!(
            self.rows.iter().all(|r| r.len() == self.schema.len()),
            "Values rows must have {} columns",
            self.schema.len()
        );
        Ok(LogicalProperty::new(self.schema.clone()).with_unique_keys(self.unique_keys()))
    }

    fn derive_statistics(
        &self,
        _prop: &LogicalProperty,
        _inputs: &[&Statistics],
        _ctx: &OptimizerContext,
    ) -> OptResult<Statistics> {
        Ok(Statistics::new(self.rows.len() as f64))
    }

    fn self_cost(&self, stat: &Statistics, _inputs: &[&Statistics]) -> CostEstimate {
        CostEstimate::new(stat.row_count(), 0.0, 0.0)
    }
}

impl Display for Values {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Values(type={}, rows=[{}])",
            self.schema,
            self.rows
                .iter()
                .map(|r| format!("({})", r.iter().join(", ")))
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{DataType, Field};

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("v", DataType::Int64),
            Field::new("g", DataType::Int64),
        ])
    }

    fn row(values: &[i64]) -> Vec<ScalarValue> {
        values.iter().map(|v| ScalarValue::Int64(*v)).collect()
    }

    #[test]
    fn test_unique_keys() {
        let values = Values::new(schema(), vec![row(&[1, 1]), row(&[2, 1])]);
        assert_eq!(values.unique_keys(), vec![column_set([0])]);

        let values = Values::new(
            schema(),
            vec![row(&[1, 1]), row(&[1, 2]), row(&[2, 1])],
        );
        assert_eq!(values.unique_keys(), vec![column_set([0, 1])]);

        let values = Values::new(schema(), vec![row(&[1, 1])]);
        let prop = values
            .derive_logical_prop(&[], &OptimizerContext::default())
            .unwrap();
        assert!(prop.are_columns_unique(&[]));
    }

    #[test]
    fn test_display_includes_row_type() {
        let values = Values::new(schema(), vec![row(&[1, 1])]);
        let renamed = Values::new(
            Schema::new(vec![
                Field::new("x", DataType::Int64),
                Field::new("y", DataType::Int64),
            ]),
            vec![row(&[1, 1])],
        );

        assert_eq!(values.to_string(), "Values(type=(v Int64, g Int64), rows=[(1, 1)])");
        assert_ne!(values.to_string(), renamed.to_string());
    }
}
