//! Tree patterns rules are matched against.
//!
//! An [`Operand`] constrains one expression (its operator and convention) and, through its
//! children, the expressions bound below it. Binding walks a [`MatchSource`], so the same matcher
//! serves the heuristic graph, where an input is a single vertex, and the memo, where an input is
//! an equivalence set whose every member is a candidate.

use enumset::EnumSet;
use itertools::Itertools;

use crate::operator::{OperatorCategory, OperatorKind};
use crate::optimizer::GroupId;
use crate::properties::Convention;
use crate::rules::RelRef;

#[derive(Clone, Debug, PartialEq)]
pub enum OperandKind {
    /// Matches any operator.
    Any,
    Exact(OperatorKind),
    Category(OperatorCategory),
}

#[derive(Clone, Debug, PartialEq)]
pub enum OperandChildren {
    /// Any number of inputs, none of them bound.
    Any,
    /// Positional child operands; the input count must match.
    Exact(Vec<Operand>),
    /// Every input independently matches the same operand.
    Each(Box<Operand>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Operand {
    kind: OperandKind,
    convention: Option<Convention>,
    excluded: EnumSet<OperatorCategory>,
    children: OperandChildren,
}

/// Where the matcher finds candidates for an input.
pub trait MatchSource {
    fn members(&self, group: GroupId) -> Vec<RelRef>;
}

impl Operand {
    fn new(kind: OperandKind) -> Self {
        Self {
            kind,
            convention: None,
            excluded: EnumSet::empty(),
            children: OperandChildren::Any,
        }
    }

    pub fn any() -> Self {
        Self::new(OperandKind::Any)
    }

    pub fn exact(kind: OperatorKind) -> Self {
        Self::new(OperandKind::Exact(kind))
    }

    pub fn category(category: OperatorCategory) -> Self {
        Self::new(OperandKind::Category(category))
    }

    /// Only matches expressions currently in `convention`.
    pub fn with_convention(mut self, convention: Convention) -> Self {
        self.convention = Some(convention);
        self
    }

    /// Refuses operators of `category`, e.g. converters under a generic operand.
    pub fn excluding(mut self, category: OperatorCategory) -> Self {
        self.excluded.insert(category);
        self
    }

    pub fn with_children(mut self, children: Vec<Operand>) -> Self {
        self.children = OperandChildren::Exact(children);
        self
    }

    pub fn with_each_child(mut self, child: Operand) -> Self {
        self.children = OperandChildren::Each(Box::new(child));
        self
    }

    /// Requires the matched expression to have no inputs.
    pub fn leaf(self) -> Self {
        self.with_children(vec![])
    }

    pub fn kind(&self) -> &OperandKind {
        &self.kind
    }

    pub fn convention(&self) -> Option<Convention> {
        self.convention
    }

    pub fn children(&self) -> &OperandChildren {
        &self.children
    }

    /// Number of expression levels a binding of this operand spans.
    pub fn depth(&self) -> usize {
        1 + match &self.children {
            OperandChildren::Any => 0,
            OperandChildren::Exact(children) => {
                children.iter().map(|c| c.depth()).max().unwrap_or(0)
            }
            OperandChildren::Each(child) => child.depth(),
        }
    }

    /// Tests the operand against one expression, ignoring children.
    pub fn matches(&self, kind: OperatorKind, convention: Convention) -> bool {
        let kind_matches = match &self.kind {
            OperandKind::Any => true,
            OperandKind::Exact(k) => *k == kind,
            OperandKind::Category(c) => *c == kind.category(),
        };

        kind_matches
            && !self.excluded.contains(kind.category())
            && self.convention.map_or(true, |c| c == convention)
    }

    /// Rejects patterns no expression could match.
    pub fn validate(&self) -> Result<(), String> {
        let category = match &self.kind {
            OperandKind::Exact(kind) => Some(kind.category()),
            OperandKind::Category(c) => Some(*c),
            OperandKind::Any => None,
        };

        if let Some(category) = category {
            if self.excluded.contains(category) {
                return Err(format!("operand matches excluded category {}", category));
            }
            let positional = match &self.children {
                OperandChildren::Exact(children) => Some(children.len()),
                OperandChildren::Each(_) => None,
                OperandChildren::Any => Some(0),
            };
            if category.is_leaf() {
                if !matches!(&self.children, OperandChildren::Any) && positional != Some(0) {
                    return Err(format!("{} operand can't have children", category));
                }
            } else if category.is_single_input() {
                if let Some(n) = positional {
                    if n > 1 {
                        return Err(format!("{} operand can't have {} children", category, n));
                    }
                }
            }
        }

        match &self.children {
            OperandChildren::Any => Ok(()),
            OperandChildren::Exact(children) => children.iter().try_for_each(|c| c.validate()),
            OperandChildren::Each(child) => child.validate(),
        }
    }

    /// Returns every binding of this operand rooted at `rel`.
    ///
    /// A binding lists the matched expressions in operand order: root first, then children depth
    /// first, left to right.
    pub fn bind(&self, rel: &RelRef, source: &dyn MatchSource) -> Vec<Vec<RelRef>> {
        if !self.matches(rel.operator().kind(), rel.convention()) {
            return vec![];
        }

        let children: Vec<&Operand> = match &self.children {
            OperandChildren::Any => return vec![vec![rel.clone()]],
            OperandChildren::Exact(children) => {
                if children.len() != rel.inputs().len() {
                    return vec![];
                }
                children.iter().collect()
            }
            OperandChildren::Each(child) => rel.inputs().iter().map(|_| child.as_ref()).collect(),
        };

        let mut bindings = vec![vec![rel.clone()]];
        for (child, input) in children.into_iter().zip(rel.inputs()) {
            let candidates: Vec<Vec<RelRef>> = source
                .members(*input)
                .iter()
                .flat_map(|member| child.bind(member, source))
                .collect();
            if candidates.is_empty() {
                return vec![];
            }

            bindings = bindings
                .iter()
                .cartesian_product(candidates.iter())
                .map(|(prefix, suffix)| prefix.iter().chain(suffix.iter()).cloned().collect())
                .collect();
        }
        bindings
    }
}
