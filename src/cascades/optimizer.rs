use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use anyhow::{anyhow, bail};
use itertools::Itertools;
use log::{debug, log_enabled, trace, Level};
use prettytable::Table;

use crate::cascades::memo::{Memo, MemoChanges};
use crate::cascades::rule_queue::{RuleMatch, RuleQueue};
use crate::cost::Cost;
use crate::error::{OptError, OptResult};
use crate::listener::PlannerEvent;
use crate::operator::OperatorTrait;
use crate::optimizer::{ExprId, GroupId, Optimizer, OptimizerContext, RelMetadata};
use crate::plan::{Plan, PlanNode, PlanNodeBuilder, PlanNodeId, PlanNodeRef};
use crate::properties::{Convention, LogicalProperty, PhysicalProp, PhysicalPropertySet};
use crate::rules::{ConversionGraph, ConverterRule, OptExpression, RelRef, RuleCall, RuleSet};
use crate::stat::Statistics;

/// Cost based optimizer.
///
/// Every expression a rule proposes is kept in the [`Memo`], grouped with the expressions it is
/// equivalent to. Once no rule has anything left to match, the cheapest tree delivering the
/// required convention is extracted from the memo.
pub struct CascadesOptimizer {
    required_convention: Convention,
    rules: RuleSet,
    conversions: ConversionGraph,
    /// Deepest operand tree among the rules.
    max_depth: usize,
    memo: Memo,
    root: GroupId,
    queue: RuleQueue,
    /// Expressions whose matches have not been looked for yet.
    pending: VecDeque<ExprId>,
    in_pending: HashSet<ExprId>,
    context: OptimizerContext,
    rule_calls: usize,
}

impl Optimizer for CascadesOptimizer {
    fn context(&self) -> &OptimizerContext {
        &self.context
    }

    fn find_best_plan(mut self) -> OptResult<Plan> {
        self.explore()?;
        debug!(
            "Exploration done after {} rule calls, memo has {} sets and {} expressions",
            self.rule_calls,
            self.memo.set_count(),
            self.memo.expr_count()
        );
        if log_enabled!(Level::Trace) {
            trace!("Memo:\n{}", self.dump());
        }

        let mut extractor = PlanExtractor::new(CostSearch::new(&self.memo, &self.context));
        if extractor
            .search
            .best(self.root, self.required_convention)?
            .is_none()
        {
            return Err(self.no_plan_error());
        }
        let root = extractor.extract(self.root, self.required_convention)?;
        debug!(
            "Cost search evaluated {} expressions",
            extractor.search.evaluated
        );
        Ok(Plan::new(root))
    }
}

impl CascadesOptimizer {
    /// Registers `plan` in a fresh memo, requiring its root in `required_convention`.
    pub fn new(
        required_convention: Convention,
        rules: RuleSet,
        plan: Plan,
        context: OptimizerContext,
    ) -> OptResult<Self> {
        let mut conversions = ConversionGraph::new();
        for converter in rules.converters().filter_map(|r| r.as_converter()) {
            conversions.add_rule(converter);
        }
        let max_depth = rules
            .iter()
            .map(|r| r.operand().depth())
            .max()
            .unwrap_or(1);

        let mut memo = Memo::new();
        let mut changes = MemoChanges::default();
        let root = memo.register(&to_opt_expression(&plan.root()), None, &context, &mut changes)?;

        let mut optimizer = Self {
            required_convention,
            rules,
            conversions,
            max_depth,
            memo,
            root,
            queue: RuleQueue::new(),
            pending: VecDeque::new(),
            in_pending: HashSet::new(),
            context,
            rule_calls: 0,
        };
        optimizer.handle_changes(changes);
        optimizer.require(root, required_convention);
        Ok(optimizer)
    }

    pub fn memo(&self) -> &Memo {
        &self.memo
    }

    pub fn root(&self) -> GroupId {
        self.memo.find(self.root)
    }

    pub fn rule_calls(&self) -> usize {
        self.rule_calls
    }

    /// Renders every live expression of the memo with its cheapest cost in its own convention.
    pub fn dump(&self) -> String {
        let mut search = CostSearch::new(&self.memo, &self.context);
        let mut table = Table::new();
        table.set_titles(row!["Set", "Expr", "Convention", "Digest", "Best cost"]);
        for set in self.memo.sets() {
            for id in self.memo.member_ids(set) {
                let expr = self.memo.expr(id);
                let cost = match search.expr_cost(id) {
                    Ok(Some(cost)) => cost.to_string(),
                    Ok(None) => Cost::INFINITE.to_string(),
                    Err(e) => format!("error: {}", e),
                };
                table.add_row(row![
                    set.to_string(),
                    id.to_string(),
                    expr.convention().to_string(),
                    expr.digest(),
                    cost
                ]);
            }
        }
        table.to_string()
    }

    fn explore(&mut self) -> OptResult<()> {
        loop {
            self.drain_pending();

            if !self.context.config().exhaustive() && self.has_plan()? {
                debug!("Root has an implementation, stop exploring");
                return Ok(());
            }

            let rule_match = match self.queue.pop() {
                Some(rule_match) => rule_match,
                None => return Ok(()),
            };
            // Bindings made stale by a merge are matched again through their live duplicates.
            if rule_match
                .rels()
                .iter()
                .any(|r| !self.memo.expr(r.id()).is_live())
            {
                continue;
            }
            self.fire(rule_match)?;
        }
    }

    fn has_plan(&self) -> OptResult<bool> {
        Ok(CostSearch::new(&self.memo, &self.context)
            .best(self.root, self.required_convention)?
            .is_some())
    }

    fn fire(&mut self, rule_match: RuleMatch) -> OptResult<()> {
        let limit = self.context.config().max_rule_firings();
        if self.rule_calls >= limit {
            return Err(OptError::RuleFiringBudgetExceeded { limit }.into());
        }
        self.rule_calls += 1;

        let rule = self
            .rules
            .rules()
            .get(rule_match.rule())
            .cloned()
            .ok_or_else(|| anyhow!("Unknown rule index {}", rule_match.rule()))?;
        let rels = rule_match.into_rels();
        let target = rels
            .first()
            .map(|r| r.group())
            .ok_or_else(|| anyhow!("Empty binding for rule {}", rule.description()))?;

        self.context.notify(PlannerEvent::RuleAttempted {
            rule: rule.description().to_string(),
            rels: rels.iter().map(|r| r.describe()).collect(),
        });
        debug!(
            "Firing rule {} on [{}]",
            rule.description(),
            rels.iter().map(|r| r.describe()).join(", ")
        );

        let results = {
            let mut call = RuleCall::new(rule.description(), rels, &*self);
            rule.on_match(&mut call)?;
            call.into_results()
        };

        for result in &results {
            let mut changes = MemoChanges::default();
            self.memo
                .register(result, Some(target), &self.context, &mut changes)?;
            if changes.new_exprs.is_empty() && changes.merges.is_empty() {
                debug!("Rule {} proposed a known expression", rule.description());
            }
            self.handle_changes(changes);
        }
        Ok(())
    }

    fn handle_changes(&mut self, changes: MemoChanges) {
        for (kept, merged) in changes.merges {
            debug!("Merged set {} into {}", merged, kept);
            self.context.notify(PlannerEvent::SetsMerged {
                kept: kept.0,
                merged: merged.0,
            });
        }
        for id in changes.new_exprs {
            self.require_inputs(id);
            self.enqueue(id);
        }
        for id in changes.touched {
            self.enqueue(id);
        }
    }

    fn enqueue(&mut self, id: ExprId) {
        if self.in_pending.insert(id) {
            self.pending.push_back(id);
        }
    }

    /// A physical expression needs each input in the convention its operator consumes.
    fn require_inputs(&mut self, id: ExprId) {
        let expr = self.memo.expr(id);
        let convention = expr.convention();
        if !convention.is_physical() {
            return;
        }
        let operator = expr.operator().clone();
        for (idx, input) in self.memo.inputs(id).into_iter().enumerate() {
            self.require(input, operator.input_convention(convention, idx));
        }
    }

    fn require(&mut self, group: GroupId, convention: Convention) {
        if convention.is_physical() && self.memo.add_requirement(group, convention) {
            trace!("Set {} is now required in {}", group, convention);
            // Converters on existing members may have become useful.
            for id in self.memo.member_ids(group) {
                self.enqueue(id);
            }
        }
    }

    fn drain_pending(&mut self) {
        while let Some(id) = self.pending.pop_front() {
            self.in_pending.remove(&id);
            self.queue_matches(id);
        }
    }

    /// Queues every match involving `id`: rooted at it, or at an ancestor close enough for a
    /// pattern to reach down to it.
    fn queue_matches(&mut self, id: ExprId) {
        if !self.memo.expr(id).is_live() {
            return;
        }

        let mut roots = vec![id];
        let mut visited = HashSet::from([id]);
        let mut frontier = vec![id];
        for _ in 1..self.max_depth {
            let mut next = vec![];
            for expr in frontier {
                for parent in self.memo.parents(self.memo.set_of(expr)) {
                    if visited.insert(parent) {
                        next.push(parent);
                    }
                }
            }
            roots.extend(next.iter().copied());
            frontier = next;
        }

        for root in roots {
            let rel = self.memo.rel_ref(root);
            for (idx, rule) in self.rules.iter().enumerate() {
                if !rule
                    .operand()
                    .matches(rel.operator().kind(), rel.convention())
                {
                    continue;
                }
                if let Some(converter) = rule.as_converter() {
                    if converter.is_guaranteed() && !self.is_conversion_needed(converter, &rel) {
                        continue;
                    }
                }
                for binding in rule.operand().bind(&rel, &self.memo) {
                    if self.queue.push(RuleMatch::new(idx, binding)) {
                        trace!("Queued rule {} on {}", rule.description(), rel.describe());
                    }
                }
            }
        }
    }

    fn is_conversion_needed(&self, converter: &ConverterRule, rel: &RelRef) -> bool {
        let out = converter.out_convention();
        !rel.convention().satisfies(&out)
            && !self
                .conversions
                .reachable_from(out)
                .is_disjoint(self.memo.set(rel.group()).required())
    }

    fn no_plan_error(&self) -> anyhow::Error {
        let target = self.required_convention;
        let conventions: Vec<Convention> = self
            .memo
            .member_ids(self.root)
            .into_iter()
            .map(|id| self.memo.expr(id).convention())
            .unique()
            .collect();

        if conventions
            .iter()
            .any(|c| c.is_physical() && self.conversions.can_convert(*c, target))
        {
            OptError::NoPlan {
                convention: target,
                reason: format!(
                    "root set {} has no member whose inputs can all be implemented",
                    self.root()
                ),
            }
            .into()
        } else {
            let from = conventions
                .into_iter()
                .find(|c| c.is_physical())
                .unwrap_or(Convention::None);
            OptError::NoConverterPath { from, to: target }.into()
        }
    }
}

impl RelMetadata for CascadesOptimizer {
    fn context(&self) -> &OptimizerContext {
        &self.context
    }

    fn logical_prop(&self, group: GroupId) -> OptResult<&LogicalProperty> {
        if !self.memo.contains_set(group) {
            bail!("Unknown set {}", group);
        }
        Ok(self.memo.set(group).logical_prop())
    }

    fn statistics(&self, group: GroupId) -> OptResult<&Statistics> {
        if !self.memo.contains_set(group) {
            bail!("Unknown set {}", group);
        }
        Ok(self.memo.set(group).stat())
    }
}

fn to_opt_expression(node: &PlanNode) -> OptExpression {
    OptExpression::new(
        node.operator().clone(),
        node.convention(),
        node.inputs().iter().map(|i| to_opt_expression(i)).collect(),
    )
}

#[derive(Clone, Copy, Debug)]
struct Winner {
    cost: Cost,
    expr: ExprId,
}

/// Cheapest implementation of each (set, convention), computed on demand.
struct CostSearch<'a> {
    memo: &'a Memo,
    context: &'a OptimizerContext,
    best: HashMap<(GroupId, Convention), Option<Winner>>,
    /// Keys on the current search path with their depth, a key seen again closes a cycle.
    active: HashMap<(GroupId, Convention), usize>,
    /// Shallowest active key a cycle was cut at since the innermost open key started.
    lowest_cut: usize,
    evaluated: usize,
}

impl<'a> CostSearch<'a> {
    fn new(memo: &'a Memo, context: &'a OptimizerContext) -> Self {
        Self {
            memo,
            context,
            best: HashMap::new(),
            active: HashMap::new(),
            lowest_cut: usize::MAX,
            evaluated: 0,
        }
    }

    fn best(&mut self, group: GroupId, convention: Convention) -> OptResult<Option<Winner>> {
        let key = (self.memo.find(group), convention);
        if let Some(winner) = self.best.get(&key) {
            return Ok(*winner);
        }
        if !convention.is_physical() {
            return Ok(None);
        }
        if let Some(depth) = self.active.get(&key) {
            self.lowest_cut = self.lowest_cut.min(*depth);
            return Ok(None);
        }

        let depth = self.active.len();
        self.active.insert(key, depth);
        let outer_cut = std::mem::replace(&mut self.lowest_cut, usize::MAX);

        let mut winner: Option<Winner> = None;
        for id in self.memo.member_ids(key.0) {
            if !self.memo.expr(id).convention().satisfies(&convention) || self.is_self_loop(id) {
                continue;
            }
            if let Some(cost) = self.expr_cost(id)? {
                // Strictly cheaper, so the first registered member wins a tie.
                if winner.map_or(true, |w| cost < w.cost) {
                    winner = Some(Winner { cost, expr: id });
                }
            }
        }
        self.active.remove(&key);

        // Cuts at this key only drop plans containing the key twice, which are never cheaper
        // than the inner occurrence alone. Cuts above it make the result depend on the path.
        let cut = self.lowest_cut;
        if cut >= depth {
            self.best.insert(key, winner);
            self.lowest_cut = outer_cut;
        } else {
            self.lowest_cut = outer_cut.min(cut);
        }
        Ok(winner)
    }

    /// Whether `id` consumes its own set in its own convention.
    fn is_self_loop(&self, id: ExprId) -> bool {
        let expr = self.memo.expr(id);
        let set = self.memo.set_of(id);
        self.memo
            .inputs(id)
            .into_iter()
            .enumerate()
            .any(|(idx, input)| {
                input == set
                    && expr
                        .operator()
                        .input_convention(expr.convention(), idx)
                        .satisfies(&expr.convention())
            })
    }

    /// Cost of `id` plus the cheapest inputs it can consume, `None` when not implementable.
    fn expr_cost(&mut self, id: ExprId) -> OptResult<Option<Cost>> {
        let memo = self.memo;
        let expr = memo.expr(id);
        let convention = expr.convention();
        if !convention.is_physical() {
            return Ok(None);
        }
        self.evaluated += 1;

        let inputs = memo.inputs(id);
        let input_stats: Vec<&Statistics> = inputs.iter().map(|g| memo.set(*g).stat()).collect();
        let estimate = expr
            .operator()
            .self_cost(memo.set(memo.set_of(id)).stat(), &input_stats);
        let mut cost = self.context.cost_model().cost(&estimate)?;
        if cost.is_infinite() {
            return Ok(None);
        }

        for (idx, input) in inputs.into_iter().enumerate() {
            match self.best(input, expr.operator().input_convention(convention, idx))? {
                Some(w) => cost = cost + w.cost,
                None => return Ok(None),
            }
        }
        Ok(Some(cost))
    }
}

/// Builds the winning tree, sharing the node of a (set, convention) used more than once.
struct PlanExtractor<'a> {
    search: CostSearch<'a>,
    nodes: HashMap<(GroupId, Convention), PlanNodeRef>,
    building: HashSet<(GroupId, Convention)>,
    next_id: PlanNodeId,
}

impl<'a> PlanExtractor<'a> {
    fn new(search: CostSearch<'a>) -> Self {
        Self {
            search,
            nodes: HashMap::new(),
            building: HashSet::new(),
            next_id: 0,
        }
    }

    fn extract(&mut self, group: GroupId, convention: Convention) -> OptResult<PlanNodeRef> {
        let memo = self.search.memo;
        let key = (memo.find(group), convention);
        if let Some(node) = self.nodes.get(&key) {
            return Ok(node.clone());
        }
        if !self.building.insert(key) {
            bail!("Chosen plan loops back to set {} in {}", key.0, convention);
        }

        let winner = self
            .search
            .best(key.0, convention)?
            .ok_or_else(|| OptError::NoPlan {
                convention,
                reason: format!("set {} has no implementation", key.0),
            })?;
        let expr = memo.expr(winner.expr);
        let mut inputs = vec![];
        for (idx, input) in memo.inputs(winner.expr).into_iter().enumerate() {
            inputs.push(self.extract(input, expr.operator().input_convention(convention, idx))?);
        }

        let set = memo.set(key.0);
        let node = PlanNodeBuilder::new(self.next_id, expr.operator())
            .add_inputs(inputs)
            .with_logical_prop(Some(set.logical_prop().clone()))
            .with_statistics(Some(*set.stat()))
            .with_physical_props(PhysicalPropertySet::new(convention))
            .build();
        self.next_id += 1;
        self.search.context.notify(PlannerEvent::RelChosen {
            rel: memo.rel_ref(winner.expr).describe(),
            convention,
        });
        debug!(
            "Chose {} for set {} in {} at cost {}",
            winner.expr, key.0, convention, winner.cost
        );

        self.building.remove(&key);
        let node = Rc::new(node);
        self.nodes.insert(key, node.clone());
        Ok(node)
    }
}
