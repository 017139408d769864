use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::cost::CostEstimate;
use crate::error::OptResult;
use crate::expr::Expr;
use crate::operator::{check_arity, OperatorCategory, OperatorTrait};
use crate::optimizer::OptimizerContext;
use crate::properties::{column_set, ColumnSet, Field, LogicalProperty, Schema};
use crate::stat::Statistics;

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Projection {
    exprs: Vec<Expr>,
    names: Vec<String>,
}

impl Projection {
    pub fn new(exprs: Vec<Expr>, names: Vec<String>) -> Self {
        Self { exprs, names }
    }

    /// Projects input columns by ordinal, naming outputs after the input fields.
    pub fn columns(columns: &[usize], input: &Schema) -> Self {
        let exprs = columns.iter().map(|c| Expr::Column(*c)).collect();
        let names = columns
            .iter()
            .map(|c| {
                input
                    .field(*c)
                    .map(|f| f.name().to_string())
                    .unwrap_or_else(|| format!("${}", c))
            })
            .collect();
        Self { exprs, names }
    }

    pub fn exprs(&self) -> &[Expr] {
        &self.exprs
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether this projection reproduces `input` field by field, in order.
    ///
    /// Names are ignored: a trivial projection may rename columns.
    pub fn is_identity(&self, input: &Schema) -> bool {
        self.exprs.len() == input.len()
            && self
                .exprs
                .iter()
                .enumerate()
                .all(|(i, e)| e.as_column() == Some(i))
    }

    /// Maps a key of the input to the output positions projecting it, if all its columns survive.
    fn map_key(&self, key: &ColumnSet) -> Option<ColumnSet> {
        key.iter()
            .map(|c| self.exprs.iter().position(|e| e.as_column() == Some(*c)))
            .collect::<Option<Vec<usize>>>()
            .map(column_set)
    }
}

impl OperatorTrait for Projection {
    fn category(&self) -> OperatorCategory {
        OperatorCategory::SingleInput
    }

    fn derive_logical_prop(
        &self,
        inputs: &[&LogicalProperty],
        _ctx: &OptimizerContext,
    ) -> OptResult<LogicalProperty> {
        check_arity(self, inputs.len())?;
        anyhow::ensure!(
            self.exprs.len() == self.names.len(),
            "Projection has {} expressions but {} names",
            self.exprs.len(),
            self.names.len()
        );

        let input = inputs[0];
        let fields = self
            .exprs
            .iter()
            .zip(self.names.iter())
            .map(|(e, name)| Ok(Field::new(name.clone(), e.data_type(input.schema())?)))
            .collect::<OptResult<Vec<Field>>>()?;

        let unique_keys = input
            .unique_keys()
            .iter()
            .filter_map(|key| self.map_key(key))
            .collect();

        Ok(LogicalProperty::new(Schema::new(fields)).with_unique_keys(unique_keys))
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
        CostEstimate::new(stat.row_count(), stat.row_count(), 0.0)
    }
}

impl Display for Projection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Projection({})",
            self.exprs
                .iter()
                .zip(self.names.iter())
                .map(|(e, name)| format!("{} AS {}", e, name))
                .join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit};
    use crate::properties::DataType;

    fn input() -> LogicalProperty {
        LogicalProperty::new(Schema::new(vec![
            Field::new("a", DataType::Int64),
            Field::new("b", DataType::Utf8),
        ]))
        .with_unique_keys(vec![column_set([0])])
    }

    #[test]
    fn test_identity() {
        let input = input();
        assert!(Projection::columns(&[0, 1], input.schema()).is_identity(input.schema()));
        assert!(!Projection::columns(&[1, 0], input.schema()).is_identity(input.schema()));
        assert!(!Projection::columns(&[0], input.schema()).is_identity(input.schema()));
    }

    #[test]
    fn test_derive_unique_keys() {
        let input = input();
        let ctx = OptimizerContext::default();

        let swapped = Projection::columns(&[1, 0], input.schema());
        let prop = swapped.derive_logical_prop(&[&input], &ctx).unwrap();
        assert_eq!(prop.unique_keys(), &[column_set([1])]);
        assert_eq!(prop.schema().field(0).unwrap().data_type(), DataType::Utf8);

        let computed = Projection::new(vec![col(0).plus(lit(1))], vec!["a1".to_string()]);
        let prop = computed.derive_logical_prop(&[&input], &ctx).unwrap();
        assert!(prop.unique_keys().is_empty());
    }
}
