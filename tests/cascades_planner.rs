use std::rc::Rc;

use relopt::cascades::CascadesOptimizer;
use relopt::catalog::{MemoryCatalog, TableMeta};
use relopt::error::{OptError, OptResult};
use relopt::expr::{col, lit, BinaryOp, Expr};
use relopt::listener::RecordingListener;
use relopt::operator::{Filter, JdbcQuery, Operator, OperatorKind, Projection, SqlDialect};
use relopt::optimizer::{Optimizer, OptimizerConfig, OptimizerContext};
use relopt::plan::{LogicalPlanBuilder, Plan};
use relopt::properties::{Convention, DataType, Field, Schema};
use relopt::rules::{
    filter_to_iterator_rule, implementation_rules, jdbc_table_scan_rule, standard_rules,
    Operand, OptExpression, RemoveTrivialProjectRule, Rule, RuleCall, RuleRef, RuleSet,
};

fn schema() -> Schema {
    Schema::new(vec![
        Field::new("a", DataType::Int64),
        Field::new("b", DataType::Utf8),
    ])
}

fn context() -> OptimizerContext {
    let catalog = MemoryCatalog::new()
        .with_table(TableMeta::new("local", schema(), 100.0))
        .with_table(TableMeta::new("t", schema(), 100.0).with_remote(SqlDialect::Generic));
    OptimizerContext::new(Rc::new(catalog))
}

fn filter_plan(table: &str) -> Plan {
    LogicalPlanBuilder::new()
        .scan(table)
        .filter(col(0).eq(lit(5)))
        .unwrap()
        .build()
        .unwrap()
}

fn all_rules() -> RuleSet {
    let mut rules = standard_rules();
    rules.extend(implementation_rules());
    RuleSet::from_rules(rules).unwrap()
}

fn optimize(rules: RuleSet, plan: Plan, context: OptimizerContext) -> OptResult<Plan> {
    CascadesOptimizer::new(Convention::Iterator, rules, plan, context)?.find_best_plan()
}

/// Proposes the same filter with the operands of its equality swapped.
struct SwapEqualityRule {
    operand: Operand,
}

impl Rule for SwapEqualityRule {
    fn description(&self) -> &str {
        "SwapEqualityRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall) -> OptResult<()> {
        let rel = call.rel(0).clone();
        if let Some(Expr::BinaryExpr {
            left,
            op: BinaryOp::Eq,
            right,
        }) = rel.operator().as_filter().map(|f| f.predicate())
        {
            let swapped = (**right).clone().eq((**left).clone());
            call.transform_to(OptExpression::with_input_groups(
                Operator::Filter(Filter::new(swapped)),
                Convention::None,
                rel.inputs(),
            ));
        }
        Ok(())
    }
}

/// Swaps equality operands and drops identity projections, on top of the implementation rules.
fn merging_rules() -> RuleSet {
    let mut rules: Vec<RuleRef> = vec![
        Rc::new(SwapEqualityRule {
            operand: Operand::exact(OperatorKind::Filter).with_convention(Convention::None),
        }),
        Rc::new(RemoveTrivialProjectRule::new()),
    ];
    rules.extend(implementation_rules());
    RuleSet::from_rules(rules).unwrap()
}

/// `depth` layers of `Filter($0 = i)` under an identity projection, over a scan of `local`.
fn filters_under_identity_projections(depth: i64) -> Plan {
    let identity = Projection::columns(&[0, 1], &schema());
    let mut builder = LogicalPlanBuilder::new();
    builder.scan("local");
    for i in 0..depth {
        builder
            .filter(col(0).eq(lit(i)))
            .unwrap()
            .projection(identity.exprs().to_vec(), identity.names().to_vec())
            .unwrap();
    }
    builder.build().unwrap()
}

#[test]
fn test_filter_fused_into_jdbc_query() {
    let plan = optimize(all_rules(), filter_plan("t"), context()).unwrap();
    assert_eq!(
        plan.explain(),
        "Converter(from=RESULT_SET, to=ITERATOR) [ITERATOR]\n  JdbcQuery(sql=SELECT * FROM t WHERE a = 5) [RESULT_SET]\n"
    );
    assert!(plan
        .bfs_iterator()
        .all(|n| n.operator().kind() != OperatorKind::Filter));
}

#[test]
fn test_deterministic() {
    let run = || {
        let listener = Rc::new(RecordingListener::new());
        let plan = optimize(
            all_rules(),
            filter_plan("t"),
            context().with_listener(listener.clone()),
        )
        .unwrap();
        (plan.explain(), listener.events())
    };

    let (first_plan, first_events) = run();
    let (second_plan, second_events) = run();
    assert_eq!(first_plan, second_plan);
    assert_eq!(first_events, second_events);
}

#[test]
fn test_tie_keeps_first_registered() {
    let mut rules = vec![Rc::new(SwapEqualityRule {
        operand: Operand::exact(OperatorKind::Filter).with_convention(Convention::None),
    }) as Rc<dyn Rule>];
    rules.extend(implementation_rules());
    let rules = RuleSet::from_rules(rules).unwrap();

    let listener = Rc::new(RecordingListener::new());
    let plan = optimize(
        rules,
        filter_plan("local"),
        context().with_listener(listener.clone()),
    )
    .unwrap();

    // Both filters cost the same, the one from the original plan was registered first.
    assert_eq!(listener.rule_productions("SwapEqualityRule"), 2);
    assert_eq!(
        plan.explain(),
        "Filter(condition=$0 = 5) [ITERATOR]\n  TableScan(table=local) [ITERATOR]\n"
    );
}

#[test]
fn test_no_converter_path() {
    let rules = RuleSet::from_rules(vec![jdbc_table_scan_rule()]).unwrap();
    let plan = LogicalPlanBuilder::new().scan("t").build().unwrap();

    let err = optimize(rules, plan, context()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<OptError>(),
        Some(&OptError::NoConverterPath {
            from: Convention::ResultSet,
            to: Convention::Iterator,
        })
    );
}

#[test]
fn test_no_plan() {
    let rules = RuleSet::from_rules(vec![filter_to_iterator_rule()]).unwrap();

    let err = optimize(rules, filter_plan("local"), context()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<OptError>(),
        Some(OptError::NoPlan {
            convention: Convention::Iterator,
            ..
        })
    ));
}

#[test]
fn test_rule_firing_budget() {
    let context = context().with_config(OptimizerConfig::default().with_max_rule_firings(2));

    let err = optimize(all_rules(), filter_plan("t"), context).unwrap_err();
    assert_eq!(
        err.downcast_ref::<OptError>(),
        Some(&OptError::RuleFiringBudgetExceeded { limit: 2 })
    );
}

#[test]
fn test_non_exhaustive_stops_early() {
    let exhaustive = Rc::new(RecordingListener::new());
    optimize(
        all_rules(),
        filter_plan("t"),
        context().with_listener(exhaustive.clone()),
    )
    .unwrap();

    let eager = Rc::new(RecordingListener::new());
    let plan = optimize(
        all_rules(),
        filter_plan("t"),
        context()
            .with_config(OptimizerConfig::default().with_exhaustive(false))
            .with_listener(eager.clone()),
    )
    .unwrap();

    let calls = |listener: &RecordingListener| {
        all_rules()
            .iter()
            .map(|r| listener.rule_calls(r.description()))
            .sum::<usize>()
    };
    assert!(calls(&eager) < calls(&exhaustive));
    assert_eq!(plan.root().convention(), Convention::Iterator);
}

#[test]
fn test_starts_from_physical_leaf() {
    let table = TableMeta::new("t", schema(), 100.0).with_remote(SqlDialect::Generic);
    let plan = LogicalPlanBuilder::new()
        .jdbc_query(JdbcQuery::new(&table).unwrap())
        .projection(vec![col(1)], vec!["b".into()])
        .unwrap()
        .build()
        .unwrap();

    let plan = optimize(all_rules(), plan, context()).unwrap();
    assert_eq!(
        plan.explain(),
        "Converter(from=RESULT_SET, to=ITERATOR) [ITERATOR]\n  JdbcQuery(sql=SELECT b FROM t) [RESULT_SET]\n"
    );
}

#[test]
fn test_dump() {
    let optimizer =
        CascadesOptimizer::new(Convention::Iterator, all_rules(), filter_plan("t"), context())
            .unwrap();
    let dump = optimizer.dump();
    assert!(dump.contains("Digest"));
    assert!(dump.contains("TableScan(table=t):NONE()"));
}

#[test]
fn test_identity_projection_removed() {
    let identity = Projection::columns(&[0, 1], &schema());
    let plan = LogicalPlanBuilder::new()
        .scan("local")
        .projection(identity.exprs().to_vec(), identity.names().to_vec())
        .unwrap()
        .build()
        .unwrap();

    let listener = Rc::new(RecordingListener::new());
    let plan = optimize(
        merging_rules(),
        plan,
        context().with_listener(listener.clone()),
    )
    .unwrap();
    assert_eq!(plan.explain(), "TableScan(table=local) [ITERATOR]\n");
    assert!(listener.rule_productions("RemoveTrivialProjectRule") >= 1);
}

#[test]
fn test_identity_projections_between_filters() {
    let plan = optimize(merging_rules(), filters_under_identity_projections(2), context()).unwrap();
    assert_eq!(
        plan.explain(),
        "Filter(condition=$0 = 1) [ITERATOR]\n  Filter(condition=$0 = 0) [ITERATOR]\n    TableScan(table=local) [ITERATOR]\n"
    );
}

#[test]
fn test_deep_chain_of_merged_sets() {
    let depth = 40;
    let plan = optimize(merging_rules(), filters_under_identity_projections(depth), context()).unwrap();

    let kinds: Vec<OperatorKind> = plan.bfs_iterator().map(|n| n.operator().kind()).collect();
    assert_eq!(
        kinds.iter().filter(|k| **k == OperatorKind::Filter).count(),
        depth as usize
    );
    assert!(!kinds.contains(&OperatorKind::Projection));
    assert!(plan
        .bfs_iterator()
        .all(|n| n.convention() == Convention::Iterator));
}
