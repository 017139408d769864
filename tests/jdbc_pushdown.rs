use std::rc::Rc;

use relopt::catalog::{MemoryCatalog, TableMeta};
use relopt::error::OptError;
use relopt::expr::{col, lit};
use relopt::heuristic::{HepOptimizer, HepProgram};
use relopt::listener::RecordingListener;
use relopt::operator::{JdbcQuery, OperatorKind, Projection, SqlDialect};
use relopt::optimizer::{Optimizer, OptimizerContext};
use relopt::plan::{LogicalPlanBuilder, Plan};
use relopt::properties::{Convention, DataType, Field, Schema};
use relopt::rules::{
    jdbc_table_scan_rule, result_set_to_iterator_rule, AddFilterToQueryRule,
    AddProjectToQueryRule,
};

fn schema() -> Schema {
    Schema::new(vec![
        Field::new("a", DataType::Int64),
        Field::new("b", DataType::Utf8),
    ])
}

fn remote_table() -> TableMeta {
    TableMeta::new("t", schema(), 100.0).with_remote(SqlDialect::Generic)
}

fn context() -> OptimizerContext {
    OptimizerContext::new(Rc::new(MemoryCatalog::new().with_table(remote_table())))
}

/// Fuses filters then projections into remote queries, then reads the result as an iterator.
fn pushdown_program() -> HepProgram {
    HepProgram::builder()
        .add_rule_instance(jdbc_table_scan_rule())
        .add_rule_instance(Rc::new(AddFilterToQueryRule::new()))
        .add_rule_instance(Rc::new(AddProjectToQueryRule::new()))
        .add_conversion(Convention::Iterator)
        .build()
        .unwrap()
}

fn optimize(plan: Plan, context: OptimizerContext) -> Plan {
    let mut optimizer = HepOptimizer::new(pushdown_program(), plan, context).unwrap();
    optimizer.add_rule(result_set_to_iterator_rule()).unwrap();
    optimizer.find_best_plan().unwrap()
}

#[test]
fn test_filter_pushed_into_query() {
    let plan = LogicalPlanBuilder::new()
        .scan("t")
        .filter(col(0).eq(lit(5)))
        .unwrap()
        .build()
        .unwrap();

    let listener = Rc::new(RecordingListener::new());
    let optimized = optimize(plan, context().with_listener(listener.clone()));
    assert_eq!(
        optimized.explain(),
        "Converter(from=RESULT_SET, to=ITERATOR) [ITERATOR]\n  JdbcQuery(sql=SELECT * FROM t WHERE a = 5) [RESULT_SET]\n"
    );
    assert!(optimized
        .bfs_iterator()
        .all(|n| n.operator().kind() != OperatorKind::Filter));
    assert_eq!(listener.rule_productions("AddFilterToQueryRule"), 1);
}

#[test]
fn test_filter_and_projection_pushed_into_query() {
    let plan = LogicalPlanBuilder::new()
        .scan("t")
        .filter(col(0).eq(lit(5)))
        .unwrap()
        .projection(vec![col(1)], vec!["b".into()])
        .unwrap()
        .build()
        .unwrap();

    let optimized = optimize(plan, context());
    assert_eq!(
        optimized.explain(),
        "Converter(from=RESULT_SET, to=ITERATOR) [ITERATOR]\n  JdbcQuery(sql=SELECT b FROM t WHERE a = 5) [RESULT_SET]\n"
    );
}

#[test]
fn test_select_list_is_shaped_once() {
    let reordered = Projection::columns(&[1, 0], &schema());
    let plan = LogicalPlanBuilder::new()
        .jdbc_query(JdbcQuery::new(&remote_table()).unwrap())
        .projection(reordered.exprs().to_vec(), reordered.names().to_vec())
        .unwrap()
        .projection(vec![col(0)], vec!["b".into()])
        .unwrap()
        .build()
        .unwrap();
    let program = HepProgram::builder()
        .add_rule_instance(Rc::new(AddProjectToQueryRule::new()))
        .build()
        .unwrap();

    let listener = Rc::new(RecordingListener::new());
    let optimized = HepOptimizer::new(program, plan, context().with_listener(listener.clone()))
        .unwrap()
        .find_best_plan()
        .unwrap();

    // The outer projection can't be fused into a query whose select list is already shaped.
    assert_eq!(
        optimized.explain(),
        "Projection($0 AS b)\n  JdbcQuery(sql=SELECT b, a FROM t) [RESULT_SET]\n"
    );
    assert_eq!(listener.rule_productions("AddProjectToQueryRule"), 1);
}

#[test]
fn test_local_table_is_not_pushed() {
    let catalog = MemoryCatalog::new().with_table(TableMeta::new("local", schema(), 100.0));
    let plan = LogicalPlanBuilder::new()
        .scan("local")
        .filter(col(0).eq(lit(5)))
        .unwrap()
        .build()
        .unwrap();
    let program = HepProgram::builder()
        .add_rule_instance(jdbc_table_scan_rule())
        .add_rule_instance(Rc::new(AddFilterToQueryRule::new()))
        .build()
        .unwrap();

    let optimized = HepOptimizer::new(program, plan, OptimizerContext::new(Rc::new(catalog)))
        .unwrap()
        .find_best_plan()
        .unwrap();
    assert_eq!(
        optimized.explain(),
        "Filter(condition=$0 = 5)\n  TableScan(table=local)\n"
    );
}

#[test]
fn test_duplicate_rule_description() {
    let mut optimizer = HepOptimizer::new(
        pushdown_program(),
        LogicalPlanBuilder::new().scan("t").build().unwrap(),
        context(),
    )
    .unwrap();

    let err = optimizer.add_rule(jdbc_table_scan_rule()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<OptError>(),
        Some(&OptError::DuplicateRule {
            description: "JdbcTableScanRule".to_string(),
        })
    );
}
