use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::cost::CostEstimate;
use crate::error::OptResult;
use crate::operator::{check_arity, OperatorCategory, OperatorTrait};
use crate::optimizer::OptimizerContext;
use crate::properties::{column_set, DataType, Field, LogicalProperty, Schema};
use crate::stat::Statistics;

const GROUPING_REDUCTION: f64 = 0.1;

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, strum_macros::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
}

impl AggregateFunction {
    /// Function that combines partial results of `self`.
    pub fn rollup(self) -> AggregateFunction {
        match self {
            AggregateFunction::Count => AggregateFunction::Sum,
            f => f,
        }
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct AggregateCall {
    func: AggregateFunction,
    /// Input column, `None` for `COUNT(*)`.
    arg: Option<usize>,
    distinct: bool,
    name: String,
}

impl AggregateCall {
    pub fn new<S: Into<String>>(func: AggregateFunction, arg: Option<usize>, name: S) -> Self {
        Self {
            func,
            arg,
            distinct: false,
            name: name.into(),
        }
    }

    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn func(&self) -> AggregateFunction {
        self.func
    }

    pub fn arg(&self) -> Option<usize> {
        self.arg
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call combining partial results of `self` found at column `arg`.
    pub fn rollup(&self, arg: usize) -> AggregateCall {
        AggregateCall::new(self.func.rollup(), Some(arg), self.name.clone())
    }

    pub fn data_type(&self, input: &Schema) -> OptResult<DataType> {
        match (self.func, self.arg) {
            (AggregateFunction::Count, _) => Ok(DataType::Int64),
            (_, Some(arg)) => input
                .field(arg)
                .map(|f| f.data_type())
                .ok_or_else(|| anyhow::anyhow!("Aggregate argument ${} out of range", arg)),
            (f, None) => anyhow::bail!("{} requires an argument", f),
        }
    }
}

impl Display for AggregateCall {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        match self.arg {
            Some(arg) => write!(f, "{}({}${}) AS {}", self.func, distinct, arg, self.name),
            None => write!(f, "{}({}*) AS {}", self.func, distinct, self.name),
        }
    }
}

/// Grouped aggregation. Output columns are the group keys followed by one column per call.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Aggregate {
    group_keys: Vec<usize>,
    calls: Vec<AggregateCall>,
}

impl Aggregate {
    pub fn new(group_keys: Vec<usize>, calls: Vec<AggregateCall>) -> Self {
        Self { group_keys, calls }
    }

    pub fn group_keys(&self) -> &[usize] {
        &self.group_keys
    }

    pub fn calls(&self) -> &[AggregateCall] {
        &self.calls
    }

    pub fn has_distinct_call(&self) -> bool {
        self.calls.iter().any(|c| c.is_distinct())
    }
}

impl OperatorTrait for Aggregate {
    fn category(&self) -> OperatorCategory {
        OperatorCategory::SingleInput
    }

    fn derive_logical_prop(
        &self,
        inputs: &[&LogicalProperty],
        _ctx: &OptimizerContext,
    ) -> OptResult<LogicalProperty> {
        check_arity(self, inputs.len())?;
        let input = inputs[0].schema();

        let mut fields = Vec::with_capacity(self.group_keys.len() + self.calls.len());
        for key in &self.group_keys {
            let field = input
                .field(*key)
                .ok_or_else(|| anyhow::anyhow!("Group key ${} out of range for {}", key, input))?;
            fields.push(field.clone());
        }
        for call in &self.calls {
            fields.push(Field::new(call.name(), call.data_type(input)?));
        }

        Ok(LogicalProperty::new(Schema::new(fields))
            .with_unique_keys(vec![column_set(0..self.group_keys.len())]))
    }

    fn derive_statistics(
        &self,
        _prop: &LogicalProperty,
        inputs: &[&Statistics],
        _ctx: &OptimizerContext,
    ) -> OptResult<Statistics> {
        if self.group_keys.is_empty() {
            return Ok(Statistics::new(1.0));
        }
        Ok(Statistics::new(
            (inputs[0].row_count() * GROUPING_REDUCTION).max(1.0),
        ))
    }

    fn self_cost(&self, stat: &Statistics, inputs: &[&Statistics]) -> CostEstimate {
        CostEstimate::new(stat.row_count(), inputs[0].row_count() * 2.0, 0.0)
    }
}

impl Display for Aggregate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Aggregate(group=[{}], calls=[{}])",
            self.group_keys.iter().map(|k| format!("${}", k)).join(", "),
            self.calls.iter().join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_logical_prop() {
        let input = LogicalProperty::new(Schema::new(vec![
            Field::new("v", DataType::Int64),
            Field::new("g", DataType::Utf8),
        ]));
        let agg = Aggregate::new(
            vec![1],
            vec![
                AggregateCall::new(AggregateFunction::Sum, Some(0), "s"),
                AggregateCall::new(AggregateFunction::Count, None, "c"),
            ],
        );

        let prop = agg
            .derive_logical_prop(&[&input], &OptimizerContext::default())
            .unwrap();
        assert_eq!(prop.schema().len(), 3);
        assert_eq!(prop.schema().field(0).unwrap().name(), "g");
        assert_eq!(prop.schema().field(2).unwrap().data_type(), DataType::Int64);
        assert!(prop.are_columns_unique(&[0]));
        assert_eq!(
            agg.to_string(),
            "Aggregate(group=[$1], calls=[SUM($0) AS s, COUNT(*) AS c])"
        );
    }

    #[test]
    fn test_count_rolls_up_to_sum() {
        let call = AggregateCall::new(AggregateFunction::Count, None, "c");
        let rolled = call.rollup(3);
        assert_eq!(rolled.func(), AggregateFunction::Sum);
        assert_eq!(rolled.arg(), Some(3));
        assert_eq!(rolled.name(), "c");
    }
}
