use std::collections::HashSet;
use std::fmt::Write;
use std::mem::swap;
use std::rc::Rc;

use anyhow::anyhow;

use crate::error::OptResult;
use crate::expr::{Expr, ScalarValue};
use crate::operator::{
    Aggregate, AggregateCall, Converter, Filter, JdbcQuery, Operator, Projection, TableScan, Union,
    Values,
};
use crate::properties::{Convention, LogicalProperty, PhysicalPropertySet, Schema};
use crate::stat::Statistics;

pub type PlanNodeId = u32;

pub type PlanNodeRef = Rc<PlanNode>;

/// One node in a plan.
///
/// This is used in both input and output of an optimizer. Given that we may have many different
/// phases in query optimization, we use one data structure to represent a plan.
#[derive(Debug)]
pub struct PlanNode {
    id: PlanNodeId,
    operator: Operator,
    inputs: Vec<PlanNodeRef>,
    logical_prop: Option<LogicalProperty>,
    stat: Option<Statistics>,
    physical_props: PhysicalPropertySet,
}

/// The `eq` should ignore `id`.
impl PartialEq for PlanNode {
    fn eq(&self, other: &Self) -> bool {
        self.operator == other.operator
            && self.inputs == other.inputs
            && self.logical_prop == other.logical_prop
            && self.stat == other.stat
            && self.physical_props == other.physical_props
    }
}

/// A query plan.
///
/// A query plan is a single root dag(directed acyclic graph). It can be used in many places, for
/// example, logical plan handed to an optimizer, or the physical plan it produces.
#[derive(PartialEq, Debug)]
pub struct Plan {
    root: PlanNodeRef,
}

/// Breath first iterator of a single root dag plan.
struct BFSPlanNodeIter {
    visited: HashSet<PlanNodeId>,
    cur_level: Vec<PlanNodeRef>,
    next_level: Vec<PlanNodeRef>,
}

impl Iterator for BFSPlanNodeIter {
    type Item = PlanNodeRef;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur_level.is_empty() {
            swap(&mut self.cur_level, &mut self.next_level);
        }

        if let Some(p) = self.cur_level.pop() {
            for input in &p.inputs {
                if !self.visited.contains(&input.id) {
                    self.next_level.push(input.clone());
                    self.visited.insert(input.id);
                }
            }

            Some(p)
        } else {
            None
        }
    }
}

impl Plan {
    pub fn new(root: PlanNodeRef) -> Self {
        Self { root }
    }

    pub fn root(&self) -> PlanNodeRef {
        self.root.clone()
    }

    pub fn bfs_iterator(&self) -> impl Iterator<Item = PlanNodeRef> {
        let mut visited = HashSet::new();
        visited.insert(self.root.id);

        BFSPlanNodeIter {
            cur_level: vec![self.root.clone()],
            next_level: vec![],
            visited,
        }
    }

    /// Renders the plan as an indented tree, one line per node.
    ///
    /// A node shared by several parents is printed under each of them.
    pub fn explain(&self) -> String {
        let mut buf = String::new();
        explain_node(&self.root, 0, &mut buf);
        buf
    }
}

fn explain_node(node: &PlanNode, depth: usize, buf: &mut String) {
    let _ = write!(buf, "{:indent$}{}", "", node.operator, indent = depth * 2);
    if node.convention().is_physical() {
        let _ = write!(buf, " [{}]", node.convention());
    }
    buf.push('\n');
    for input in &node.inputs {
        explain_node(input, depth + 1, buf);
    }
}

impl PlanNode {
    pub fn new(id: PlanNodeId, operator: Operator, inputs: Vec<PlanNodeRef>) -> Self {
        Self {
            id,
            operator,
            inputs,
            logical_prop: None,
            stat: None,
            physical_props: PhysicalPropertySet::default(),
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn id(&self) -> PlanNodeId {
        self.id
    }

    pub fn inputs(&self) -> &[PlanNodeRef] {
        &self.inputs
    }

    pub fn logical_prop(&self) -> Option<&LogicalProperty> {
        self.logical_prop.as_ref()
    }

    pub fn stat(&self) -> Option<&Statistics> {
        self.stat.as_ref()
    }

    pub fn physical_props(&self) -> &PhysicalPropertySet {
        &self.physical_props
    }

    pub fn convention(&self) -> Convention {
        self.physical_props.convention()
    }
}

pub struct PlanNodeBuilder {
    plan_node: PlanNode,
}

impl PlanNodeBuilder {
    pub fn new(id: PlanNodeId, operator: &Operator) -> Self {
        Self {
            plan_node: PlanNode::new(id, operator.clone(), vec![]),
        }
    }

    pub fn add_inputs<I>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = PlanNodeRef>,
    {
        self.plan_node.inputs.extend(inputs);
        self
    }

    pub fn with_logical_prop(mut self, logical_prop: Option<LogicalProperty>) -> Self {
        self.plan_node.logical_prop = logical_prop;
        self
    }

    pub fn with_statistics(mut self, stat: Option<Statistics>) -> Self {
        self.plan_node.stat = stat;
        self
    }

    pub fn with_physical_props(mut self, physical_props: PhysicalPropertySet) -> Self {
        self.plan_node.physical_props = physical_props;
        self
    }

    pub fn build(self) -> PlanNode {
        self.plan_node
    }
}

/// Builds logical plans bottom up.
///
/// Leaf operators start a new root, other operators are stacked on the current root.
#[derive(Default)]
pub struct LogicalPlanBuilder {
    root: Option<PlanNodeRef>,
    next_plan_node_id: PlanNodeId,
}

impl LogicalPlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset_root(&mut self, operator: Operator, inputs: Vec<PlanNodeRef>) -> &mut Self {
        let plan_node = Rc::new(PlanNode::new(self.next_plan_node_id, operator, inputs));
        self.root = Some(plan_node);
        self.next_plan_node_id += 1;
        self
    }

    fn take_root(&mut self, operator: &str) -> OptResult<PlanNodeRef> {
        self.root
            .take()
            .ok_or_else(|| anyhow!("{} requires an input, build one first", operator))
    }

    pub fn scan<S: Into<String>>(&mut self, table_name: S) -> &mut Self {
        self.reset_root(Operator::TableScan(TableScan::new(table_name)), vec![])
    }

    pub fn values(&mut self, schema: Schema, rows: Vec<Vec<ScalarValue>>) -> &mut Self {
        self.reset_root(Operator::Values(Values::new(schema, rows)), vec![])
    }

    /// Starts from a query already evaluated by a remote source, in result set convention.
    pub fn jdbc_query(&mut self, query: JdbcQuery) -> &mut Self {
        let plan_node = PlanNodeBuilder::new(self.next_plan_node_id, &Operator::JdbcQuery(query))
            .with_physical_props(PhysicalPropertySet::new(Convention::ResultSet))
            .build();
        self.root = Some(Rc::new(plan_node));
        self.next_plan_node_id += 1;
        self
    }

    pub fn filter(&mut self, predicate: Expr) -> OptResult<&mut Self> {
        let input = self.take_root("Filter")?;
        Ok(self.reset_root(Operator::Filter(Filter::new(predicate)), vec![input]))
    }

    pub fn projection(&mut self, exprs: Vec<Expr>, names: Vec<String>) -> OptResult<&mut Self> {
        let input = self.take_root("Projection")?;
        Ok(self.reset_root(
            Operator::Projection(Projection::new(exprs, names)),
            vec![input],
        ))
    }

    pub fn aggregate(
        &mut self,
        group_keys: Vec<usize>,
        calls: Vec<AggregateCall>,
    ) -> OptResult<&mut Self> {
        let input = self.take_root("Aggregate")?;
        Ok(self.reset_root(
            Operator::Aggregate(Aggregate::new(group_keys, calls)),
            vec![input],
        ))
    }

    /// Unions the current root with `others`, the current root being the first input.
    pub fn union(&mut self, all: bool, others: Vec<PlanNodeRef>) -> OptResult<&mut Self> {
        let mut inputs = vec![self.take_root("Union")?];
        inputs.extend(others);
        Ok(self.reset_root(Operator::Union(Union::new(all)), inputs))
    }

    pub fn converter(&mut self, from: Convention, to: Convention) -> OptResult<&mut Self> {
        let input = self.take_root("Converter")?;
        Ok(self.reset_root(Operator::Converter(Converter::new(from, to)), vec![input]))
    }

    /// Consume current plan, but not rest state, e.g. plan node id.
    ///
    /// This is useful for building multi child plan, e.g. union.
    pub fn build(&mut self) -> OptResult<Plan> {
        let root = self
            .root
            .take()
            .ok_or_else(|| anyhow!("Can't build an empty plan"))?;
        Ok(Plan { root })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit};

    #[test]
    fn test_build_and_explain() {
        let mut builder = LogicalPlanBuilder::new();
        let right = builder.scan("t2").build().unwrap();
        let plan = builder
            .scan("t1")
            .union(true, vec![right.root()])
            .unwrap()
            .filter(col(0).eq(lit(1)))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(plan.bfs_iterator().count(), 4);
        assert_eq!(
            plan.explain(),
            "Filter(condition=$0 = 1)\n  Union(all=true)\n    TableScan(table=t1)\n    TableScan(table=t2)\n"
        );
    }

    #[test]
    fn test_missing_input() {
        let mut builder = LogicalPlanBuilder::new();
        assert!(builder.filter(col(0).eq(lit(1))).is_err());
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_eq_ignores_id() {
        let a = LogicalPlanBuilder::new().scan("t").build().unwrap();
        let mut builder = LogicalPlanBuilder::new();
        builder.scan("u");
        let b = builder.scan("t").build().unwrap();
        assert_ne!(a.root().id(), b.root().id());
        assert_eq!(a, b);
    }
}
