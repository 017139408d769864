//! Optimization rules.
//!
//! A rule pairs an [`Operand`] pattern with an `on_match` callback. Optimizers bind the pattern
//! against their expressions and hand each binding to the rule as a [`RuleCall`]; the rule
//! proposes logically equivalent alternatives to the matched root with
//! [`RuleCall::transform_to`].
//!
//! Rules are registered by the caller, there is no compiled in rule list. [`standard_rules`] and
//! [`implementation_rules`] return the rules shipped with this crate.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use crate::error::{OptError, OptResult};
use crate::listener::PlannerEvent;
use crate::operator::Operator;
use crate::optimizer::{ExprId, GroupId, OptimizerContext, RelMetadata};
use crate::properties::{Convention, LogicalProperty};
use crate::stat::Statistics;

mod pattern;
pub use pattern::*;
mod converter;
pub use converter::*;
mod implementation;
pub use implementation::*;
mod jdbc;
pub use jdbc::*;
mod push_agg_through_union_all;
pub use push_agg_through_union_all::*;
mod remove_trivial_project;
pub use remove_trivial_project::*;
mod union_to_distinct;
pub use union_to_distinct::*;

/// An expression bound by the pattern matcher.
///
/// Inputs are referenced by group, never by expression, so a rule rewriting the matched root can
/// keep any input it didn't look at.
#[derive(Clone, Debug, PartialEq)]
pub struct RelRef {
    id: ExprId,
    group: GroupId,
    operator: Operator,
    convention: Convention,
    inputs: Vec<GroupId>,
}

impl RelRef {
    pub fn new(
        id: ExprId,
        group: GroupId,
        operator: Operator,
        convention: Convention,
        inputs: Vec<GroupId>,
    ) -> Self {
        Self {
            id,
            group,
            operator,
            convention,
            inputs,
        }
    }

    pub fn id(&self) -> ExprId {
        self.id
    }

    pub fn group(&self) -> GroupId {
        self.group
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    pub fn inputs(&self) -> &[GroupId] {
        &self.inputs
    }

    /// Digest-like description used in traces.
    pub fn describe(&self) -> String {
        format!("{}:{}", self.id, self.operator)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OptExprNode {
    OperatorNode(Operator, Convention),
    /// Reference to an existing group.
    GroupHandleNode(GroupId),
}

/// Expression proposed by a rule: new operators whose leaves may reference existing groups.
#[derive(Clone, Debug, PartialEq)]
pub struct OptExpression {
    node: OptExprNode,
    inputs: Vec<OptExpression>,
}

impl OptExpression {
    pub fn new(operator: Operator, convention: Convention, inputs: Vec<OptExpression>) -> Self {
        Self {
            node: OptExprNode::OperatorNode(operator, convention),
            inputs,
        }
    }

    pub fn group(group: GroupId) -> Self {
        Self {
            node: OptExprNode::GroupHandleNode(group),
            inputs: vec![],
        }
    }

    /// New operator over existing groups.
    pub fn with_input_groups(operator: Operator, convention: Convention, inputs: &[GroupId]) -> Self {
        Self::new(
            operator,
            convention,
            inputs.iter().map(|g| OptExpression::group(*g)).collect(),
        )
    }

    pub fn node(&self) -> &OptExprNode {
        &self.node
    }

    pub fn inputs(&self) -> &[OptExpression] {
        &self.inputs
    }
}

impl std::fmt::Display for OptExpression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.node {
            OptExprNode::GroupHandleNode(group) => write!(f, "{}", group),
            OptExprNode::OperatorNode(operator, convention) => {
                write!(f, "{}:{}", operator, convention)?;
                if !self.inputs.is_empty() {
                    write!(f, "(")?;
                    for (idx, input) in self.inputs.iter().enumerate() {
                        if idx > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", input)?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}

/// A successful match handed to [`Rule::on_match`].
pub struct RuleCall<'a> {
    rule: &'a str,
    rels: Vec<RelRef>,
    metadata: &'a dyn RelMetadata,
    results: Vec<OptExpression>,
}

impl<'a> RuleCall<'a> {
    pub fn new(rule: &'a str, rels: Vec<RelRef>, metadata: &'a dyn RelMetadata) -> Self {
        Self {
            rule,
            rels,
            metadata,
            results: vec![],
        }
    }

    /// Bound expressions, index 0 is the match root.
    pub fn rels(&self) -> &[RelRef] {
        &self.rels
    }

    pub fn rel(&self, idx: usize) -> &RelRef {
        &self.rels[idx]
    }

    /// Registers `expr` as equivalent to the match root. May be called any number of times.
    pub fn transform_to(&mut self, expr: OptExpression) {
        self.metadata.context().notify(PlannerEvent::RuleProduction {
            rule: self.rule.to_string(),
            result: expr.to_string(),
        });
        self.results.push(expr);
    }

    pub fn logical_prop(&self, group: GroupId) -> OptResult<&LogicalProperty> {
        self.metadata.logical_prop(group)
    }

    pub fn statistics(&self, group: GroupId) -> OptResult<&Statistics> {
        self.metadata.statistics(group)
    }

    pub fn are_columns_unique(&self, group: GroupId, columns: &[usize]) -> OptResult<bool> {
        Ok(self.logical_prop(group)?.are_columns_unique(columns))
    }

    pub fn context(&self) -> &OptimizerContext {
        self.metadata.context()
    }

    pub fn results(&self) -> &[OptExpression] {
        &self.results
    }

    pub fn into_results(self) -> Vec<OptExpression> {
        self.results
    }
}

pub trait Rule {
    /// Identifies the rule. Must be unique among the rules given to one optimizer.
    fn description(&self) -> &str;

    fn operand(&self) -> &Operand;

    fn on_match(&self, call: &mut RuleCall) -> OptResult<()>;

    fn as_converter(&self) -> Option<&ConverterRule> {
        None
    }
}

pub type RuleRef = Rc<dyn Rule>;

impl Debug for dyn Rule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Logical rewrite rules shipped with this crate.
pub fn standard_rules() -> Vec<RuleRef> {
    vec![
        Rc::new(RemoveTrivialProjectRule::new()),
        Rc::new(PushAggThroughUnionAllRule::new()),
        Rc::new(UnionToDistinctRule::new()),
        Rc::new(AddFilterToQueryRule::new()),
        Rc::new(AddProjectToQueryRule::new()),
    ]
}

fn same_rule(a: &RuleRef, b: &RuleRef) -> bool {
    Rc::as_ptr(a) as *const u8 == Rc::as_ptr(b) as *const u8
}

/// Rules registered with one optimizer, in registration order.
#[derive(Clone, Default, Debug)]
pub struct RuleSet {
    rules: Vec<RuleRef>,
    by_description: HashMap<String, usize>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules<I: IntoIterator<Item = RuleRef>>(rules: I) -> OptResult<Self> {
        let mut set = Self::new();
        for rule in rules {
            set.add(rule)?;
        }
        Ok(set)
    }

    /// Registers `rule`, returning `false` if this very rule was already registered.
    pub fn add(&mut self, rule: RuleRef) -> OptResult<bool> {
        rule.operand()
            .validate()
            .map_err(|reason| OptError::InvalidOperand {
                rule: rule.description().to_string(),
                reason,
            })?;

        if let Some(idx) = self.by_description.get(rule.description()) {
            if same_rule(&self.rules[*idx], &rule) {
                return Ok(false);
            }
            return Err(OptError::DuplicateRule {
                description: rule.description().to_string(),
            }
            .into());
        }

        self.by_description
            .insert(rule.description().to_string(), self.rules.len());
        self.rules.push(rule);
        Ok(true)
    }

    pub fn get(&self, description: &str) -> Option<&RuleRef> {
        self.by_description.get(description).map(|idx| &self.rules[*idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuleRef> {
        self.rules.iter()
    }

    pub fn rules(&self) -> &[RuleRef] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn converters(&self) -> impl Iterator<Item = &RuleRef> {
        self.rules.iter().filter(|r| r.as_converter().is_some())
    }
}
