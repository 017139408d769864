use std::collections::{HashSet, VecDeque};

use crate::optimizer::ExprId;
use crate::rules::RelRef;

/// A rule bound to the expressions its operand tree matched, root first.
#[derive(Debug, Clone)]
pub struct RuleMatch {
    rule: usize,
    rels: Vec<RelRef>,
}

impl RuleMatch {
    pub fn new(rule: usize, rels: Vec<RelRef>) -> Self {
        Self { rule, rels }
    }

    /// Index of the rule in the optimizer's rule set.
    pub fn rule(&self) -> usize {
        self.rule
    }

    pub fn rels(&self) -> &[RelRef] {
        &self.rels
    }

    pub fn into_rels(self) -> Vec<RelRef> {
        self.rels
    }

    fn key(&self) -> (usize, Vec<ExprId>) {
        (self.rule, self.rels.iter().map(|r| r.id()).collect())
    }
}

/// FIFO of pending matches. A match is only ever queued once, even after it fired.
#[derive(Default, Debug)]
pub struct RuleQueue {
    queue: VecDeque<RuleMatch>,
    seen: HashSet<(usize, Vec<ExprId>)>,
}

impl RuleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the same rule already matched the same expressions.
    pub fn push(&mut self, rule_match: RuleMatch) -> bool {
        if self.seen.insert(rule_match.key()) {
            self.queue.push_back(rule_match);
            true
        } else {
            false
        }
    }

    pub fn pop(&mut self) -> Option<RuleMatch> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
