use std::collections::HashMap;

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use strum::IntoEnumIterator;

use crate::error::OptResult;
use crate::operator::OperatorKind;
use crate::properties::{Convention, ConventionSet};
use crate::rules::{Operand, OptExpression, RelRef, Rule, RuleCall};

pub type ConvertFn = Box<dyn Fn(&RelRef, &RuleCall) -> OptResult<Option<OptExpression>>>;

/// Rule changing the calling convention of an expression without changing its rows.
///
/// A guaranteed converter can convert every expression in its input convention, typically by
/// wrapping it in a [`crate::operator::Converter`]. Optimizers only fire it where some consumer
/// needs the output convention.
pub struct ConverterRule {
    description: String,
    operand: Operand,
    in_convention: Convention,
    out_convention: Convention,
    guaranteed: bool,
    convert: ConvertFn,
}

impl ConverterRule {
    /// Converter for operators of `kind`.
    pub fn new<S, F>(
        description: S,
        kind: OperatorKind,
        in_convention: Convention,
        out_convention: Convention,
        convert: F,
    ) -> Self
    where
        S: Into<String>,
        F: Fn(&RelRef, &RuleCall) -> OptResult<Option<OptExpression>> + 'static,
    {
        Self {
            description: description.into(),
            operand: Operand::exact(kind).with_convention(in_convention),
            in_convention,
            out_convention,
            guaranteed: false,
            convert: Box::new(convert),
        }
    }

    /// Converter applying to any expression in `in_convention`.
    pub fn guaranteed<S, F>(
        description: S,
        in_convention: Convention,
        out_convention: Convention,
        convert: F,
    ) -> Self
    where
        S: Into<String>,
        F: Fn(&RelRef, &RuleCall) -> OptResult<Option<OptExpression>> + 'static,
    {
        Self {
            description: description.into(),
            operand: Operand::any().with_convention(in_convention),
            in_convention,
            out_convention,
            guaranteed: true,
            convert: Box::new(convert),
        }
    }

    pub fn in_convention(&self) -> Convention {
        self.in_convention
    }

    pub fn out_convention(&self) -> Convention {
        self.out_convention
    }

    pub fn is_guaranteed(&self) -> bool {
        self.guaranteed
    }

    /// Converts `rel`, or returns `None` when this rule doesn't apply to it.
    pub fn convert(&self, rel: &RelRef, call: &RuleCall) -> OptResult<Option<OptExpression>> {
        (self.convert)(rel, call)
    }
}

impl Rule for ConverterRule {
    fn description(&self) -> &str {
        &self.description
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall) -> OptResult<()> {
        if let Some(converted) = self.convert(call.rel(0), call)? {
            call.transform_to(converted);
        }
        Ok(())
    }

    fn as_converter(&self) -> Option<&ConverterRule> {
        Some(self)
    }
}

/// Conventions reachable from one another through guaranteed converters.
#[derive(Debug)]
pub struct ConversionGraph {
    graph: DiGraph<Convention, ()>,
    nodes: HashMap<Convention, NodeIndex>,
}

impl Default for ConversionGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionGraph {
    /// A graph over every convention, without conversions.
    pub fn new() -> Self {
        let mut graph = DiGraph::new();
        let nodes = Convention::iter()
            .map(|convention| (convention, graph.add_node(convention)))
            .collect();
        Self { graph, nodes }
    }

    pub fn add_conversion(&mut self, from: Convention, to: Convention) {
        if let (Some(from), Some(to)) = (self.nodes.get(&from), self.nodes.get(&to)) {
            self.graph.update_edge(*from, *to, ());
        }
    }

    pub fn add_rule(&mut self, rule: &ConverterRule) {
        if rule.is_guaranteed() {
            self.add_conversion(rule.in_convention(), rule.out_convention());
        }
    }

    /// Whether an expression in `from` can always be converted to `to`.
    pub fn can_convert(&self, from: Convention, to: Convention) -> bool {
        if from == to {
            return true;
        }
        match (self.nodes.get(&from), self.nodes.get(&to)) {
            (Some(from), Some(to)) => has_path_connecting(&self.graph, *from, *to, None),
            _ => false,
        }
    }

    /// Conventions `from` can be converted to, `from` included.
    pub fn reachable_from(&self, from: Convention) -> ConventionSet {
        let mut reachable = ConventionSet::only(from);
        if let Some(start) = self.nodes.get(&from) {
            let mut dfs = Dfs::new(&self.graph, *start);
            while let Some(idx) = dfs.next(&self.graph) {
                reachable.insert(self.graph[idx]);
            }
        }
        reachable
    }
}
