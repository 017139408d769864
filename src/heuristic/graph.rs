use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use anyhow::anyhow;
use itertools::Itertools;
use petgraph::algo::toposort;
use petgraph::prelude::{NodeIndex, StableGraph};
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::{Directed, Direction};

use crate::error::{OptError, OptResult};
use crate::heuristic::MatchOrder;
use crate::operator::{Operator, OperatorTrait};
use crate::optimizer::{ExprId, GroupId, OptimizerContext};
use crate::plan::{Plan, PlanNodeBuilder, PlanNodeId, PlanNodeRef};
use crate::properties::{
    Convention, ConventionSet, LogicalProperty, PhysicalProp, PhysicalPropertySet,
};
use crate::rules::OptExprNode::{GroupHandleNode, OperatorNode};
use crate::rules::{MatchSource, OptExpression, RelRef};
use crate::stat::Statistics;

/// Edges point from a parent to its input and are weighted by the input ordinal.
type HepGraph = StableGraph<HepVertex, usize, Directed, PlanNodeId>;
pub type HepNodeId = NodeIndex<PlanNodeId>;

pub struct HepVertex {
    operator: Operator,
    convention: Convention,
    inputs: Vec<HepNodeId>,
    logical_prop: LogicalProperty,
    stat: Statistics,
    digest: String,
}

impl HepVertex {
    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    pub fn logical_prop(&self) -> &LogicalProperty {
        &self.logical_prop
    }

    pub fn stat(&self) -> &Statistics {
        &self.stat
    }

    fn required_input(&self, idx: usize) -> Convention {
        self.operator.input_convention(self.convention, idx)
    }
}

fn digest(operator: &Operator, convention: Convention, inputs: &[HepNodeId]) -> String {
    format!(
        "{}:{}({})",
        operator,
        convention,
        inputs.iter().map(|i| i.index()).join(", ")
    )
}

pub fn group_of(node: HepNodeId) -> GroupId {
    GroupId(node.index() as u32)
}

pub fn node_of(group: GroupId) -> HepNodeId {
    HepNodeId::new(group.0 as usize)
}

/// A plan should be a single root dag.
///
/// Vertices are interned by digest, so equal subexpressions are shared. Vertices no longer
/// reachable from the root are garbage collected after every rewrite.
pub(super) struct PlanGraph {
    graph: HepGraph,
    root: HepNodeId,
    digests: HashMap<String, HepNodeId>,
}

impl PlanGraph {
    pub(super) fn new(plan: &Plan, ctx: &OptimizerContext) -> OptResult<Self> {
        let mut graph = Self {
            graph: HepGraph::default(),
            root: HepNodeId::default(),
            digests: HashMap::new(),
        };
        let mut visited = HashMap::new();
        graph.root = graph.add_plan_node(&plan.root(), ctx, &mut visited)?;
        Ok(graph)
    }

    fn add_plan_node(
        &mut self,
        node: &PlanNodeRef,
        ctx: &OptimizerContext,
        visited: &mut HashMap<PlanNodeId, HepNodeId>,
    ) -> OptResult<HepNodeId> {
        if let Some(id) = visited.get(&node.id()) {
            return Ok(*id);
        }
        let inputs = node
            .inputs()
            .iter()
            .map(|input| self.add_plan_node(input, ctx, visited))
            .collect::<OptResult<Vec<_>>>()?;
        let id = self.add_vertex(node.operator().clone(), node.convention(), inputs, ctx)?;
        visited.insert(node.id(), id);
        Ok(id)
    }

    pub(super) fn contains(&self, id: HepNodeId) -> bool {
        self.graph.contains_node(id)
    }

    pub(super) fn vertex(&self, id: HepNodeId) -> Option<&HepVertex> {
        self.graph.node_weight(id)
    }

    pub(super) fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub(super) fn rel_ref(&self, id: HepNodeId) -> Option<RelRef> {
        self.vertex(id).map(|v| {
            RelRef::new(
                ExprId(id.index() as u32),
                group_of(id),
                v.operator.clone(),
                v.convention,
                v.inputs.iter().map(|i| group_of(*i)).collect(),
            )
        })
    }

    /// Adds the vertices of a rule proposal, reusing existing ones with the same digest.
    pub(super) fn insert(
        &mut self,
        expr: &OptExpression,
        ctx: &OptimizerContext,
    ) -> OptResult<HepNodeId> {
        match expr.node() {
            GroupHandleNode(group) => {
                let id = node_of(*group);
                if self.contains(id) {
                    Ok(id)
                } else {
                    Err(anyhow!("Proposal references unknown vertex {}", group))
                }
            }
            OperatorNode(operator, convention) => {
                let inputs = expr
                    .inputs()
                    .iter()
                    .map(|input| self.insert(input, ctx))
                    .collect::<OptResult<Vec<_>>>()?;
                self.add_vertex(operator.clone(), *convention, inputs, ctx)
            }
        }
    }

    fn add_vertex(
        &mut self,
        operator: Operator,
        convention: Convention,
        inputs: Vec<HepNodeId>,
        ctx: &OptimizerContext,
    ) -> OptResult<HepNodeId> {
        let digest = digest(&operator, convention, &inputs);
        if let Some(id) = self.digests.get(&digest) {
            return Ok(*id);
        }

        let (logical_prop, stat) = {
            let input_props: Vec<&LogicalProperty> =
                inputs.iter().map(|i| &self.graph[*i].logical_prop).collect();
            let input_stats: Vec<&Statistics> =
                inputs.iter().map(|i| &self.graph[*i].stat).collect();
            let logical_prop = operator.derive_logical_prop(&input_props, ctx)?;
            let stat = operator.derive_statistics(&logical_prop, &input_stats, ctx)?;
            (logical_prop, stat)
        };

        let id = self.graph.add_node(HepVertex {
            operator,
            convention,
            inputs: inputs.clone(),
            logical_prop,
            stat,
            digest: digest.clone(),
        });
        for (idx, input) in inputs.into_iter().enumerate() {
            self.graph.add_edge(id, input, idx);
        }
        self.digests.insert(digest, id);
        Ok(id)
    }

    /// Parents of a vertex, with the input ordinal under which they reference it.
    pub(super) fn parents(&self, id: HepNodeId) -> Vec<(HepNodeId, usize)> {
        self.graph
            .edges_directed(id, Direction::Incoming)
            .map(|e| (e.source(), *e.weight()))
            .sorted()
            .collect()
    }

    /// Conventions the consumers of a vertex expect it in. The root is expected in `target`.
    pub(super) fn required_conventions(
        &self,
        id: HepNodeId,
        target: Option<Convention>,
    ) -> ConventionSet {
        let mut required: ConventionSet = self
            .parents(id)
            .into_iter()
            .map(|(parent, idx)| self.graph[parent].required_input(idx))
            .collect();
        if id == self.root {
            if let Some(target) = target {
                required.insert(target);
            }
        }
        required
    }

    fn set_input(&mut self, parent: HepNodeId, idx: usize, old: HepNodeId, new: HepNodeId) {
        let edge = self
            .graph
            .edges_directed(parent, Direction::Outgoing)
            .find(|e| e.target() == old && *e.weight() == idx)
            .map(|e| e.id());
        if let Some(edge) = edge {
            self.graph.remove_edge(edge);
        }
        self.graph.add_edge(parent, new, idx);
        self.graph[parent].inputs[idx] = new;
    }

    /// Replaces `old` with `new` in the eyes of its parents.
    ///
    /// With `only_for` set, only parents expecting that convention are redirected and the root
    /// moves only if `target` is that convention. Parents inside `new` itself keep `old`, which
    /// lets a converter wrap the vertex it replaces.
    ///
    /// # Return
    ///
    /// The return value indicates whether graph changed.
    pub(super) fn replace(
        &mut self,
        old: HepNodeId,
        new: HepNodeId,
        only_for: Option<Convention>,
        target: Option<Convention>,
    ) -> OptResult<bool> {
        if old == new {
            return Ok(false);
        }

        let (expected, actual) = (
            self.graph[old].logical_prop.schema(),
            self.graph[new].logical_prop.schema(),
        );
        if !expected.type_eq(actual) {
            return Err(OptError::RowTypeMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            }
            .into());
        }

        let inside = self.descendants(new);
        let mut changed = false;
        let mut touched = vec![];
        for (parent, idx) in self.parents(old) {
            if inside.contains(&parent) {
                continue;
            }
            if let Some(convention) = only_for {
                if !convention.satisfies(&self.graph[parent].required_input(idx)) {
                    continue;
                }
            }
            self.set_input(parent, idx, old, new);
            touched.push(parent);
            changed = true;
        }

        if self.root == old && only_for.map_or(true, |c| target == Some(c)) {
            self.root = new;
            changed = true;
        }

        self.refresh_digests(touched);
        self.collect_garbage();
        Ok(changed)
    }

    fn descendants(&self, id: HepNodeId) -> HashSet<HepNodeId> {
        let mut visited = HashSet::new();
        let mut dfs = Dfs::new(&self.graph, id);
        while let Some(node) = dfs.next(&self.graph) {
            visited.insert(node);
        }
        visited
    }

    /// Re-interns vertices whose inputs changed, merging those that became equal to another.
    fn refresh_digests(&mut self, mut pending: Vec<HepNodeId>) {
        while let Some(id) = pending.pop() {
            let digest = match self.vertex(id) {
                Some(v) => digest(&v.operator, v.convention, &v.inputs),
                None => continue,
            };
            let old = std::mem::replace(&mut self.graph[id].digest, digest.clone());
            if self.digests.get(&old) == Some(&id) {
                self.digests.remove(&old);
            }

            match self.digests.get(&digest).copied() {
                Some(existing) if existing != id && self.contains(existing) => {
                    for (parent, idx) in self.parents(id) {
                        self.set_input(parent, idx, id, existing);
                        pending.push(parent);
                    }
                    if self.root == id {
                        self.root = existing;
                    }
                }
                _ => {
                    self.digests.insert(digest, id);
                }
            }
        }
    }

    fn collect_garbage(&mut self) {
        let live = self.descendants(self.root);
        let dead: Vec<HepNodeId> = self
            .graph
            .node_indices()
            .filter(|id| !live.contains(id))
            .collect();
        for id in dead {
            if let Some(vertex) = self.graph.remove_node(id) {
                if self.digests.get(&vertex.digest) == Some(&id) {
                    self.digests.remove(&vertex.digest);
                }
            }
        }
    }

    /// Vertices in match order. `start` is where an arbitrary order begins.
    pub(super) fn nodes_iter(
        &self,
        match_order: MatchOrder,
        start: Option<HepNodeId>,
    ) -> OptResult<Vec<HepNodeId>> {
        match match_order {
            MatchOrder::TopDown => self.top_down_nodes(),
            MatchOrder::BottomUp => {
                let mut nodes = self.top_down_nodes()?;
                nodes.reverse();
                Ok(nodes)
            }
            MatchOrder::Arbitrary => {
                let mut nodes = vec![];
                let mut dfs = Dfs::empty(&self.graph);
                for from in start.filter(|s| self.contains(*s)).into_iter().chain([self.root]) {
                    dfs.move_to(from);
                    while let Some(node) = dfs.next(&self.graph) {
                        nodes.push(node);
                    }
                }
                Ok(nodes)
            }
        }
    }

    fn top_down_nodes(&self) -> OptResult<Vec<HepNodeId>> {
        toposort(&self.graph, None)
            .map_err(|cycle| anyhow!("Plan graph has a cycle through {:?}", cycle.node_id()))
    }

    /// Checks that the plan is fully implemented in `target`.
    pub(super) fn validate(&self, target: Convention) -> OptResult<()> {
        let incomplete = |convention: Convention, vertex: &HepVertex| -> anyhow::Error {
            OptError::PlanIncomplete {
                convention,
                node: vertex.operator.to_string(),
            }
            .into()
        };

        let root = &self.graph[self.root];
        if !root.convention.satisfies(&target) {
            return Err(incomplete(target, root));
        }

        for id in self.top_down_nodes()? {
            let vertex = &self.graph[id];
            if !vertex.convention.is_physical() {
                return Err(incomplete(target, vertex));
            }
            for (idx, input) in vertex.inputs.iter().enumerate() {
                let required = vertex.required_input(idx);
                let input = &self.graph[*input];
                if !input.convention.satisfies(&required) {
                    return Err(incomplete(required, input));
                }
            }
        }
        Ok(())
    }

    pub(super) fn to_plan(&self) -> OptResult<Plan> {
        let mut plan_nodes = HashMap::<HepNodeId, PlanNodeRef>::new();
        // Traverse nodes in bottom up order, when visiting a node, its children all inserted
        // into map
        for id in self.top_down_nodes()?.into_iter().rev() {
            let vertex = &self.graph[id];
            let inputs = vertex
                .inputs
                .iter()
                .map(|input| {
                    plan_nodes
                        .get(input)
                        .cloned()
                        .ok_or_else(|| anyhow!("Input {:?} of {:?} not built", input, id))
                })
                .collect::<OptResult<Vec<_>>>()?;

            let plan_node = PlanNodeBuilder::new(id.index() as PlanNodeId, &vertex.operator)
                .with_logical_prop(Some(vertex.logical_prop.clone()))
                .with_statistics(Some(vertex.stat))
                .with_physical_props(PhysicalPropertySet::new(vertex.convention))
                .add_inputs(inputs)
                .build();
            plan_nodes.insert(id, Rc::new(plan_node));
        }

        plan_nodes
            .get(&self.root)
            .map(|root| Plan::new(root.clone()))
            .ok_or_else(|| anyhow!("Root vertex missing from plan graph"))
    }
}

/// An input of a vertex is a single vertex.
impl MatchSource for PlanGraph {
    fn members(&self, group: GroupId) -> Vec<RelRef> {
        self.rel_ref(node_of(group)).into_iter().collect()
    }
}
