use std::fmt::{Display, Formatter};

use crate::cost::CostEstimate;
use crate::error::{OptError, OptResult};
use crate::operator::{check_arity, OperatorCategory, OperatorTrait};
use crate::optimizer::OptimizerContext;
use crate::properties::{column_set, LogicalProperty};
use crate::stat::Statistics;

/// `UNION ALL` when `all` is set, otherwise `UNION` (duplicate eliminating).
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Union {
    all: bool,
}

impl Union {
    pub fn new(all: bool) -> Self {
        Self { all }
    }

    pub fn all(&self) -> bool {
        self.all
    }

    pub fn is_distinct(&self) -> bool {
        !self.all
    }
}

impl OperatorTrait for Union {
    fn category(&self) -> OperatorCategory {
        OperatorCategory::SetOp
    }

    /// The row type is the first input's, every other input must have the same column types.
    fn derive_logical_prop(
        &self,
        inputs: &[&LogicalProperty],
        _ctx: &OptimizerContext,
    ) -> OptResult<LogicalProperty> {
        check_arity(self, inputs.len())?;
        let schema = inputs[0].schema().clone();
        for input in &inputs[1..] {
            if !input.schema().type_eq(&schema) {
                return Err(OptError::RowTypeMismatch {
                    expected: schema.to_string(),
                    actual: input.schema().to_string(),
                }
                .into());
            }
        }
        let unique_keys = if self.all {
            vec![]
        } else {
            vec![column_set(0..schema.len())]
        };
        Ok(LogicalProperty::new(schema).with_unique_keys(unique_keys))
    }

    fn derive_statistics(
        &self,
        _prop: &LogicalProperty,
        inputs: &[&Statistics],
        _ctx: &OptimizerContext,
    ) -> OptResult<Statistics> {
        Ok(Statistics::new(inputs.iter().map(|s| s.row_count()).sum()))
    }

    fn self_cost(&self, stat: &Statistics, _inputs: &[&Statistics]) -> CostEstimate {
        let cpu = if self.all { 0.0 } else { stat.row_count() };
        CostEstimate::new(stat.row_count(), cpu, 0.0)
    }
}

impl Display for Union {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Union(all={})", self.all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{DataType, Field, Schema};

    fn prop(types: &[DataType]) -> LogicalProperty {
        LogicalProperty::new(Schema::new(
            types
                .iter()
                .enumerate()
                .map(|(i, t)| Field::new(format!("c{}", i), *t))
                .collect(),
        ))
    }

    #[test]
    fn test_inputs_must_share_row_type() {
        let ctx = OptimizerContext::default();
        let union = Union::new(true);
        let ints = prop(&[DataType::Int64]);
        let other_names = LogicalProperty::new(Schema::new(vec![Field::new(
            "x",
            DataType::Int64,
        )]));
        assert!(union.derive_logical_prop(&[&ints, &other_names], &ctx).is_ok());

        let strings = prop(&[DataType::Utf8]);
        let err = union
            .derive_logical_prop(&[&ints, &strings], &ctx)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<OptError>(),
            Some(&OptError::RowTypeMismatch {
                expected: "(c0 Int64)".to_string(),
                actual: "(c0 Utf8)".to_string(),
            })
        );

        let wider = prop(&[DataType::Int64, DataType::Int64]);
        assert!(union.derive_logical_prop(&[&ints, &wider], &ctx).is_err());
    }
}
