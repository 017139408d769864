//! Converter rules implementing logical operators.

use std::rc::Rc;

use crate::operator::{Converter, JdbcQuery, Operator, OperatorKind};
use crate::properties::Convention;
use crate::rules::{ConverterRule, OptExpression, RelRef, RuleRef};

/// Same operator over the same input groups, in `convention`.
fn reimplement(rel: &RelRef, convention: Convention) -> OptExpression {
    OptExpression::with_input_groups(rel.operator().clone(), convention, rel.inputs())
}

fn to_iterator(description: &str, kind: OperatorKind) -> ConverterRule {
    ConverterRule::new(
        description,
        kind,
        Convention::None,
        Convention::Iterator,
        |rel, _call| Ok(Some(reimplement(rel, Convention::Iterator))),
    )
}

/// Scans of local tables as iterators. Remote tables are left to [`jdbc_table_scan_rule`].
pub fn table_scan_to_iterator_rule() -> RuleRef {
    Rc::new(ConverterRule::new(
        "TableScanToIteratorRule",
        OperatorKind::TableScan,
        Convention::None,
        Convention::Iterator,
        |rel, call| {
            let local = rel
                .operator()
                .as_table_scan()
                .and_then(|scan| call.context().catalog().table(scan.table_name()))
                .map_or(false, |table| table.remote().is_none());
            Ok(local.then(|| reimplement(rel, Convention::Iterator)))
        },
    ))
}

pub fn values_to_iterator_rule() -> RuleRef {
    Rc::new(to_iterator("ValuesToIteratorRule", OperatorKind::Values))
}

pub fn filter_to_iterator_rule() -> RuleRef {
    Rc::new(to_iterator("FilterToIteratorRule", OperatorKind::Filter))
}

pub fn projection_to_iterator_rule() -> RuleRef {
    Rc::new(to_iterator(
        "ProjectionToIteratorRule",
        OperatorKind::Projection,
    ))
}

pub fn aggregate_to_iterator_rule() -> RuleRef {
    Rc::new(to_iterator("AggregateToIteratorRule", OperatorKind::Aggregate))
}

/// Only `UNION ALL` has an iterator implementation; a distinct union must be rewritten first.
pub fn union_to_iterator_rule() -> RuleRef {
    Rc::new(ConverterRule::new(
        "UnionToIteratorRule",
        OperatorKind::Union,
        Convention::None,
        Convention::Iterator,
        |rel, _call| {
            let all = rel.operator().as_union().map_or(false, |u| u.all());
            Ok(all.then(|| reimplement(rel, Convention::Iterator)))
        },
    ))
}

/// Turns a scan of a remote table into a `SELECT *` query evaluated by its source.
pub fn jdbc_table_scan_rule() -> RuleRef {
    Rc::new(ConverterRule::new(
        "JdbcTableScanRule",
        OperatorKind::TableScan,
        Convention::None,
        Convention::ResultSet,
        |rel, call| {
            let table = match rel
                .operator()
                .as_table_scan()
                .and_then(|scan| call.context().catalog().table(scan.table_name()))
            {
                Some(table) if table.remote().is_some() => table,
                _ => return Ok(None),
            };
            let query = JdbcQuery::new(&table)?;
            Ok(Some(OptExpression::new(
                Operator::JdbcQuery(query),
                Convention::ResultSet,
                vec![],
            )))
        },
    ))
}

/// Reads a remote result set as an iterator.
pub fn result_set_to_iterator_rule() -> RuleRef {
    Rc::new(ConverterRule::guaranteed(
        "ResultSetToIteratorRule",
        Convention::ResultSet,
        Convention::Iterator,
        |rel, _call| {
            Ok(Some(OptExpression::new(
                Operator::Converter(Converter::new(Convention::ResultSet, Convention::Iterator)),
                Convention::Iterator,
                vec![OptExpression::group(rel.group())],
            )))
        },
    ))
}

/// Rules implementing every logical operator in the iterator convention, remote tables through
/// JDBC queries.
pub fn implementation_rules() -> Vec<RuleRef> {
    vec![
        jdbc_table_scan_rule(),
        table_scan_to_iterator_rule(),
        values_to_iterator_rule(),
        filter_to_iterator_rule(),
        projection_to_iterator_rule(),
        aggregate_to_iterator_rule(),
        union_to_iterator_rule(),
        result_set_to_iterator_rule(),
    ]
}
