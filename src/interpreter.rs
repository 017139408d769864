//! Reference interpreter.
//!
//! Runs a plan over in-memory tables, row at a time. It exists to check that two plans compute
//! the same rows, so it favours obviousness over speed, and ignores conventions: converters pass
//! their input through.

use std::collections::HashMap;

use itertools::Itertools;

use crate::error::{OptError, OptResult};
use crate::expr::ScalarValue;
use crate::operator::{Aggregate, AggregateCall, AggregateFunction, Operator};
use crate::plan::{Plan, PlanNode};

pub type Row = Vec<ScalarValue>;

#[derive(Clone, Debug, Default)]
pub struct Interpreter {
    tables: HashMap<String, Vec<Row>>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table<S: Into<String>>(mut self, name: S, rows: Vec<Row>) -> Self {
        self.tables.insert(name.into(), rows);
        self
    }

    pub fn execute(&self, plan: &Plan) -> OptResult<Vec<Row>> {
        self.execute_node(&plan.root())
    }

    fn execute_node(&self, node: &PlanNode) -> OptResult<Vec<Row>> {
        let mut inputs = node
            .inputs()
            .iter()
            .map(|input| self.execute_node(input))
            .collect::<OptResult<Vec<_>>>()?;

        match node.operator() {
            Operator::TableScan(scan) => self
                .tables
                .get(scan.table_name())
                .cloned()
                .ok_or_else(|| OptError::UnknownTable(scan.table_name().to_string()).into()),
            Operator::Values(values) => Ok(values.rows().to_vec()),
            Operator::Filter(filter) => {
                let mut rows = vec![];
                for row in single_input(&mut inputs)? {
                    if filter.predicate().evaluate(&row)? == ScalarValue::Boolean(true) {
                        rows.push(row);
                    }
                }
                Ok(rows)
            }
            Operator::Projection(projection) => single_input(&mut inputs)?
                .iter()
                .map(|row| {
                    projection
                        .exprs()
                        .iter()
                        .map(|e| e.evaluate(row))
                        .collect::<OptResult<Row>>()
                })
                .collect(),
            Operator::Aggregate(aggregate) => aggregate_rows(aggregate, single_input(&mut inputs)?),
            Operator::Union(union) => {
                let rows = inputs.into_iter().flatten();
                if union.all() {
                    Ok(rows.collect())
                } else {
                    Ok(rows.unique().collect())
                }
            }
            Operator::Converter(_) => single_input(&mut inputs),
            Operator::JdbcQuery(query) => Err(OptError::Execution(format!(
                "remote query can't be run locally: {}",
                query.sql()
            ))
            .into()),
        }
    }
}

fn single_input(inputs: &mut Vec<Vec<Row>>) -> OptResult<Vec<Row>> {
    if inputs.len() != 1 {
        return Err(OptError::Execution(format!("expected 1 input, got {}", inputs.len())).into());
    }
    Ok(inputs.remove(0))
}

fn aggregate_rows(aggregate: &Aggregate, rows: Vec<Row>) -> OptResult<Vec<Row>> {
    let mut groups: Vec<(Row, Vec<Row>)> = vec![];
    let mut index: HashMap<Row, usize> = HashMap::new();
    for row in rows {
        let key = aggregate
            .group_keys()
            .iter()
            .map(|k| {
                row.get(*k).cloned().ok_or_else(|| {
                    OptError::Execution(format!("group key ${} out of range", k)).into()
                })
            })
            .collect::<OptResult<Row>>()?;
        match index.get(&key) {
            Some(idx) => groups[*idx].1.push(row),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![row]));
            }
        }
    }

    // Without group keys there is always exactly one output row.
    if groups.is_empty() && aggregate.group_keys().is_empty() {
        groups.push((vec![], vec![]));
    }

    groups
        .into_iter()
        .map(|(mut key, rows)| {
            for call in aggregate.calls() {
                key.push(evaluate_call(call, &rows)?);
            }
            Ok(key)
        })
        .collect()
}

fn evaluate_call(call: &AggregateCall, rows: &[Row]) -> OptResult<ScalarValue> {
    let arg = match call.arg() {
        Some(arg) => arg,
        None => return Ok(ScalarValue::Int64(rows.len() as i64)),
    };

    let mut values = rows
        .iter()
        .map(|row| {
            row.get(arg).cloned().ok_or_else(|| {
                OptError::Execution(format!("aggregate argument ${} out of range", arg)).into()
            })
        })
        .filter(|v: &OptResult<ScalarValue>| !matches!(v, Ok(ScalarValue::Null)))
        .collect::<OptResult<Vec<_>>>()?;
    if call.is_distinct() {
        values = values.into_iter().unique().collect();
    }

    match call.func() {
        AggregateFunction::Count => Ok(ScalarValue::Int64(values.len() as i64)),
        AggregateFunction::Sum => {
            let mut sum: Option<i64> = None;
            for value in values {
                let v = match value {
                    ScalarValue::Int64(v) => v,
                    v => {
                        return Err(OptError::Execution(format!("SUM applied to {}", v)).into())
                    }
                };
                sum = Some(
                    sum.unwrap_or(0)
                        .checked_add(v)
                        .ok_or_else(|| OptError::Execution("overflow in SUM".to_string()))?,
                );
            }
            Ok(sum.map(ScalarValue::Int64).unwrap_or(ScalarValue::Null))
        }
        AggregateFunction::Min => Ok(values.into_iter().min().unwrap_or(ScalarValue::Null)),
        AggregateFunction::Max => Ok(values.into_iter().max().unwrap_or(ScalarValue::Null)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit};
    use crate::operator::AggregateFunction::{Count, Sum};
    use crate::plan::LogicalPlanBuilder;

    fn row(values: &[i64]) -> Row {
        values.iter().map(|v| ScalarValue::Int64(*v)).collect()
    }

    fn interpreter() -> Interpreter {
        Interpreter::new()
            .with_table("t", vec![row(&[1, 1]), row(&[2, 1]), row(&[3, 2])])
            .with_table("u", vec![row(&[3, 2]), row(&[4, 3])])
    }

    #[test]
    fn test_filter_and_aggregate() {
        let plan = LogicalPlanBuilder::new()
            .scan("t")
            .filter(col(0).gt(lit(1)))
            .unwrap()
            .aggregate(
                vec![1],
                vec![
                    AggregateCall::new(Sum, Some(0), "s"),
                    AggregateCall::new(Count, None, "c"),
                ],
            )
            .unwrap()
            .build()
            .unwrap();

        let rows = interpreter().execute(&plan).unwrap();
        assert_eq!(rows, vec![row(&[1, 2, 1]), row(&[2, 3, 1])]);
    }

    #[test]
    fn test_global_aggregate_over_empty_input() {
        let plan = LogicalPlanBuilder::new()
            .scan("t")
            .filter(col(0).gt(lit(10)))
            .unwrap()
            .aggregate(
                vec![],
                vec![
                    AggregateCall::new(Sum, Some(0), "s"),
                    AggregateCall::new(Count, None, "c"),
                ],
            )
            .unwrap()
            .build()
            .unwrap();

        let rows = interpreter().execute(&plan).unwrap();
        assert_eq!(rows, vec![vec![ScalarValue::Null, ScalarValue::Int64(0)]]);
    }

    #[test]
    fn test_union_distinct() {
        let mut builder = LogicalPlanBuilder::new();
        let u = builder.scan("u").build().unwrap();
        let plan = builder
            .scan("t")
            .union(false, vec![u.root()])
            .unwrap()
            .build()
            .unwrap();

        let rows = interpreter().execute(&plan).unwrap();
        assert_eq!(
            rows,
            vec![row(&[1, 1]), row(&[2, 1]), row(&[3, 2]), row(&[4, 3])]
        );
    }

    #[test]
    fn test_unknown_table() {
        let plan = LogicalPlanBuilder::new().scan("missing").build().unwrap();
        let err = interpreter().execute(&plan).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::UnknownTable(_))
        ));
    }
}
