use std::rc::Rc;

use relopt::catalog::{MemoryCatalog, TableMeta};
use relopt::error::OptError;
use relopt::expr::{col, lit};
use relopt::heuristic::{HepOptimizer, HepProgram};
use relopt::listener::RecordingListener;
use relopt::operator::Projection;
use relopt::optimizer::{Optimizer, OptimizerConfig, OptimizerContext};
use relopt::plan::{LogicalPlanBuilder, Plan};
use relopt::properties::{Convention, DataType, Field, Schema};
use relopt::rules::{
    implementation_rules, RemoveTrivialProjectRule, RuleRef, UnionToDistinctRule,
};

fn schema() -> Schema {
    Schema::new(vec![
        Field::new("a", DataType::Int64),
        Field::new("b", DataType::Int64),
    ])
}

fn catalog() -> MemoryCatalog {
    MemoryCatalog::new()
        .with_table(TableMeta::new("t", schema(), 100.0))
        .with_table(TableMeta::new("t1", schema(), 10.0))
        .with_table(TableMeta::new("t2", schema(), 10.0))
}

fn context() -> OptimizerContext {
    OptimizerContext::new(Rc::new(catalog()))
}

fn remove_trivial_project() -> RuleRef {
    Rc::new(RemoveTrivialProjectRule::new())
}

/// `depth` identity projections stacked on a scan of `t`.
fn identity_projections(depth: usize) -> Plan {
    let identity = Projection::columns(&[0, 1], &schema());
    let mut builder = LogicalPlanBuilder::new();
    builder.scan("t");
    for _ in 0..depth {
        builder
            .projection(identity.exprs().to_vec(), identity.names().to_vec())
            .unwrap();
    }
    builder.build().unwrap()
}

fn optimize(program: HepProgram, plan: Plan, context: OptimizerContext) -> Plan {
    HepOptimizer::new(program, plan, context)
        .unwrap()
        .find_best_plan()
        .unwrap()
}

#[test]
fn test_remove_trivial_project_is_idempotent() {
    let program = HepProgram::builder()
        .add_rule_instance(remove_trivial_project())
        .build()
        .unwrap();

    let once = optimize(program.clone(), identity_projections(1), context());
    assert_eq!(once.explain(), "TableScan(table=t)\n");

    let listener = Rc::new(RecordingListener::new());
    let twice = optimize(
        program,
        LogicalPlanBuilder::new().scan("t").build().unwrap(),
        context().with_listener(listener.clone()),
    );
    assert_eq!(once, twice);
    assert_eq!(listener.rule_calls("RemoveTrivialProjectRule"), 0);
}

#[test]
fn test_non_identity_projection_is_kept() {
    let program = HepProgram::builder()
        .add_rule_instance(remove_trivial_project())
        .build()
        .unwrap();
    let plan = LogicalPlanBuilder::new()
        .scan("t")
        .projection(vec![col(1), col(0)], vec!["b".into(), "a".into()])
        .unwrap()
        .build()
        .unwrap();

    let listener = Rc::new(RecordingListener::new());
    let optimized = optimize(program, plan, context().with_listener(listener.clone()));
    assert_eq!(
        optimized.explain(),
        "Projection($1 AS b, $0 AS a)\n  TableScan(table=t)\n"
    );
    assert_eq!(listener.rule_calls("RemoveTrivialProjectRule"), 1);
    assert_eq!(listener.rule_productions("RemoveTrivialProjectRule"), 0);
}

#[test]
fn test_rule_group() {
    let mut builder = LogicalPlanBuilder::new();
    let t2 = builder.scan("t2").build().unwrap();
    let identity = Projection::columns(&[0, 1], &schema());
    let plan = builder
        .scan("t1")
        .union(false, vec![t2.root()])
        .unwrap()
        .projection(identity.exprs().to_vec(), identity.names().to_vec())
        .unwrap()
        .build()
        .unwrap();

    let program = HepProgram::builder()
        .add_group_begin()
        .add_rule_instance(remove_trivial_project())
        .add_rule_instance(Rc::new(UnionToDistinctRule::new()))
        .add_group_end()
        .build()
        .unwrap();

    let optimized = optimize(program, plan, context());
    assert_eq!(
        optimized.explain(),
        "Aggregate(group=[$0, $1], calls=[])\n  Union(all=true)\n    TableScan(table=t1)\n    TableScan(table=t2)\n"
    );
}

#[test]
fn test_subprogram_runs_to_fixpoint() {
    let subprogram = HepProgram::builder()
        .add_match_limit(1)
        .add_rule_instance(remove_trivial_project())
        .build()
        .unwrap();
    let program = HepProgram::builder()
        .add_subprogram(subprogram)
        .build()
        .unwrap();

    let listener = Rc::new(RecordingListener::new());
    let optimized = optimize(
        program,
        identity_projections(3),
        context().with_listener(listener.clone()),
    );
    assert_eq!(optimized.explain(), "TableScan(table=t)\n");
    assert_eq!(listener.rule_productions("RemoveTrivialProjectRule"), 3);
}

#[test]
fn test_rule_by_description() {
    let program = HepProgram::builder()
        .add_rule_by_description("RemoveTrivialProjectRule")
        .build()
        .unwrap();
    let mut optimizer = HepOptimizer::new(program, identity_projections(2), context()).unwrap();
    assert!(optimizer.add_rule(remove_trivial_project()).unwrap());

    let optimized = optimizer.find_best_plan().unwrap();
    assert_eq!(optimized.explain(), "TableScan(table=t)\n");
}

#[test]
fn test_unknown_rule() {
    let program = HepProgram::builder()
        .add_rule_by_description("NoSuchRule")
        .build()
        .unwrap();
    let err = HepOptimizer::new(program, identity_projections(1), context())
        .unwrap()
        .find_best_plan()
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<OptError>(),
        Some(&OptError::UnknownRule("NoSuchRule".to_string()))
    );
}

#[test]
fn test_rule_firing_budget() {
    let program = HepProgram::builder()
        .add_rule_instance(remove_trivial_project())
        .build()
        .unwrap();
    let context = context().with_config(OptimizerConfig::default().with_max_rule_firings(1));

    let err = HepOptimizer::new(program, identity_projections(2), context)
        .unwrap()
        .find_best_plan()
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<OptError>(),
        Some(&OptError::RuleFiringBudgetExceeded { limit: 1 })
    );
}

#[test]
fn test_conversion_to_iterator() {
    let plan = LogicalPlanBuilder::new()
        .scan("t")
        .filter(col(0).eq(lit(1)))
        .unwrap()
        .build()
        .unwrap();
    let program = HepProgram::builder()
        .add_conversion(Convention::Iterator)
        .build()
        .unwrap();

    let mut optimizer = HepOptimizer::new(program, plan, context()).unwrap();
    for rule in implementation_rules() {
        optimizer.add_rule(rule).unwrap();
    }
    let optimized = optimizer.find_best_plan().unwrap();
    assert_eq!(
        optimized.explain(),
        "Filter(condition=$0 = 1) [ITERATOR]\n  TableScan(table=t) [ITERATOR]\n"
    );
}

#[test]
fn test_plan_incomplete() {
    let plan = LogicalPlanBuilder::new()
        .scan("t")
        .filter(col(0).eq(lit(1)))
        .unwrap()
        .build()
        .unwrap();
    let program = HepProgram::builder()
        .add_conversion(Convention::Iterator)
        .build()
        .unwrap();

    let err = HepOptimizer::new(program, plan, context())
        .unwrap()
        .find_best_plan()
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<OptError>(),
        Some(&OptError::PlanIncomplete {
            convention: Convention::Iterator,
            node: "Filter(condition=$0 = 1)".to_string(),
        })
    );
}
