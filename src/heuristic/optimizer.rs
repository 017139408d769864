use anyhow::anyhow;
use log::{debug, log_enabled, trace, Level};

use crate::error::{OptError, OptResult};
use crate::heuristic::graph::{node_of, PlanGraph};
use crate::heuristic::{HepInstruction, HepNodeId, HepProgram, MatchOrder};
use crate::listener::PlannerEvent;
use crate::optimizer::{GroupId, Optimizer, OptimizerContext, RelMetadata};
use crate::plan::Plan;
use crate::properties::{Convention, LogicalProperty, PhysicalProp};
use crate::rules::{RuleCall, RuleRef, RuleSet};
use crate::stat::Statistics;

/// Mutable state of one program while it runs.
struct ProgramState {
    match_order: MatchOrder,
    match_limit: usize,
    /// Rules collected since the last group begin.
    group: Option<Vec<RuleRef>>,
}

impl Default for ProgramState {
    fn default() -> Self {
        Self {
            match_order: MatchOrder::default(),
            match_limit: usize::MAX,
            group: None,
        }
    }
}

/// Rewrites a plan by replaying a [`HepProgram`].
///
/// There is no costing: the first alternative a rule proposes replaces the matched expression.
pub struct HepOptimizer {
    program: HepProgram,
    rules: RuleSet,
    pub(super) graph: PlanGraph,
    context: OptimizerContext,
    rule_calls: usize,
    transformations: usize,
}

impl Optimizer for HepOptimizer {
    fn context(&self) -> &OptimizerContext {
        &self.context
    }

    fn find_best_plan(mut self) -> OptResult<Plan> {
        let program = std::mem::take(&mut self.program);
        self.execute(&program)?;
        debug!(
            "Heuristic optimization done after {} rule calls and {} transformations",
            self.rule_calls, self.transformations
        );
        self.graph.to_plan()
    }
}

impl HepOptimizer {
    /// Creates an optimizer for `plan`, registering every rule the program references.
    pub fn new(program: HepProgram, plan: Plan, context: OptimizerContext) -> OptResult<Self> {
        let rules = RuleSet::from_rules(program.rules())?;
        let graph = PlanGraph::new(&plan, &context)?;
        Ok(Self {
            program,
            rules,
            graph,
            context,
            rule_calls: 0,
            transformations: 0,
        })
    }

    /// Registers a rule for description lookups and conversion.
    pub fn add_rule(&mut self, rule: RuleRef) -> OptResult<bool> {
        self.rules.add(rule)
    }

    pub fn rule_calls(&self) -> usize {
        self.rule_calls
    }

    fn execute(&mut self, program: &HepProgram) -> OptResult<()> {
        let mut state = ProgramState::default();
        for instruction in program.instructions() {
            match instruction {
                HepInstruction::RuleInstance(rule) => {
                    self.apply_or_collect(vec![rule.clone()], &mut state)?
                }
                HepInstruction::RuleByDescription(description) => {
                    let rule = self
                        .rules
                        .get(description)
                        .cloned()
                        .ok_or_else(|| OptError::UnknownRule(description.clone()))?;
                    self.apply_or_collect(vec![rule], &mut state)?
                }
                HepInstruction::RuleCollection(rules) => {
                    self.apply_or_collect(rules.clone(), &mut state)?
                }
                HepInstruction::BeginGroup => state.group = Some(vec![]),
                HepInstruction::EndGroup => {
                    if let Some(rules) = state.group.take() {
                        self.apply_rules(&rules, &state, None)?;
                    }
                }
                HepInstruction::MatchOrder(order) => state.match_order = *order,
                HepInstruction::MatchLimit(limit) => state.match_limit = *limit,
                HepInstruction::Subprogram(subprogram) => loop {
                    let before = self.transformations;
                    self.execute(subprogram)?;
                    if self.transformations == before {
                        break;
                    }
                },
                HepInstruction::Convert(target) => {
                    let converters: Vec<RuleRef> = self.rules.converters().cloned().collect();
                    self.apply_rules(&converters, &state, Some(*target))?;
                    self.graph.validate(*target)?;
                }
            }
        }
        Ok(())
    }

    fn apply_or_collect(&mut self, rules: Vec<RuleRef>, state: &mut ProgramState) -> OptResult<()> {
        match state.group.as_mut() {
            Some(group) => {
                group.extend(rules);
                Ok(())
            }
            None => self.apply_rules(&rules, state, None),
        }
    }

    /// Fires `rules` until a full scan finds nothing to rewrite or the match limit is reached.
    fn apply_rules(
        &mut self,
        rules: &[RuleRef],
        state: &ProgramState,
        target: Option<Convention>,
    ) -> OptResult<()> {
        let mut matches = 0usize;
        let mut start = None;

        'scan: loop {
            for node in self.graph.nodes_iter(state.match_order, start)? {
                if !self.graph.contains(node) {
                    continue;
                }
                for rule in rules {
                    if let Some(new_node) = self.apply_rule(rule, node, target)? {
                        matches += 1;
                        if matches >= state.match_limit {
                            return Ok(());
                        }
                        start = Some(new_node);
                        continue 'scan;
                    }
                }
            }
            return Ok(());
        }
    }

    /// Fires `rule` on `node`, returning the vertex that replaced it.
    fn apply_rule(
        &mut self,
        rule: &RuleRef,
        node: HepNodeId,
        target: Option<Convention>,
    ) -> OptResult<Option<HepNodeId>> {
        let rel = match self.graph.rel_ref(node) {
            Some(rel) => rel,
            None => return Ok(None),
        };

        // A guaranteed converter only fires below a consumer needing its output convention, and
        // only that consumer sees the converted vertex.
        let only_for = match rule.as_converter() {
            Some(converter) if converter.is_guaranteed() => {
                let out = converter.out_convention();
                if rel.convention().satisfies(&out)
                    || !self.graph.required_conventions(node, target).contains(out)
                {
                    return Ok(None);
                }
                Some(out)
            }
            _ => None,
        };

        let binding = match rule.operand().bind(&rel, &self.graph).into_iter().next() {
            Some(binding) => binding,
            None => return Ok(None),
        };

        let limit = self.context.config().max_rule_firings();
        if self.rule_calls >= limit {
            return Err(OptError::RuleFiringBudgetExceeded { limit }.into());
        }
        self.rule_calls += 1;
        self.context.notify(PlannerEvent::RuleAttempted {
            rule: rule.description().to_string(),
            rels: binding.iter().map(|r| r.describe()).collect(),
        });
        debug!("Trying rule {} on {}", rule.description(), rel.describe());

        let results = {
            let mut call = RuleCall::new(rule.description(), binding, &*self);
            rule.on_match(&mut call)?;
            call.into_results()
        };
        let result = match results.into_iter().next() {
            Some(result) => result,
            None => return Ok(None),
        };

        let new_node = self.graph.insert(&result, &self.context)?;
        if !self.graph.replace(node, new_node, only_for, target)? {
            return Ok(None);
        }

        self.transformations += 1;
        self.context.notify(PlannerEvent::Transformed {
            rule: rule.description().to_string(),
            result: result.to_string(),
        });
        if log_enabled!(Level::Trace) {
            trace!(
                "Plan after applying rule {}:\n{}",
                rule.description(),
                self.graph.to_plan()?.explain()
            );
        }
        debug!(
            "Rule {} rewrote {}, graph has {} vertices",
            rule.description(),
            rel.describe(),
            self.graph.len()
        );
        Ok(Some(new_node))
    }
}

impl RelMetadata for HepOptimizer {
    fn context(&self) -> &OptimizerContext {
        &self.context
    }

    fn logical_prop(&self, group: GroupId) -> OptResult<&LogicalProperty> {
        self.graph
            .vertex(node_of(group))
            .map(|v| v.logical_prop())
            .ok_or_else(|| anyhow!("Unknown vertex {}", group))
    }

    fn statistics(&self, group: GroupId) -> OptResult<&Statistics> {
        self.graph
            .vertex(node_of(group))
            .map(|v| v.stat())
            .ok_or_else(|| anyhow!("Unknown vertex {}", group))
    }
}
