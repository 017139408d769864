//! Planner event notifications.
//!
//! A listener sees what the optimizers do: which rules were attempted, what they produced, which
//! equivalence sets were merged and which expressions ended up in the final plan. It is the hook
//! for tracing and visualization tools.

use std::cell::RefCell;

use crate::properties::Convention;

#[derive(Clone, Debug, PartialEq)]
pub enum PlannerEvent {
    /// A rule is about to be called on a binding. `rels` are the digests of the bound expressions.
    RuleAttempted { rule: String, rels: Vec<String> },
    /// A rule proposed an equivalent expression.
    RuleProduction { rule: String, result: String },
    /// The heuristic optimizer replaced a vertex with the proposal.
    Transformed { rule: String, result: String },
    /// Two equivalence sets were proven equal.
    SetsMerged { kept: u32, merged: u32 },
    /// An expression was picked for the final plan.
    RelChosen { rel: String, convention: Convention },
}

pub trait PlannerListener {
    fn on_event(&self, event: &PlannerEvent);
}

/// Listener that keeps every event, mostly useful in tests.
#[derive(Default, Debug)]
pub struct RecordingListener {
    events: RefCell<Vec<PlannerEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PlannerEvent> {
        self.events.borrow().clone()
    }

    /// Number of times the rule with `description` was called.
    pub fn rule_calls(&self, description: &str) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, PlannerEvent::RuleAttempted { rule, .. } if rule == description))
            .count()
    }

    /// Number of equivalent expressions the rule with `description` proposed.
    pub fn rule_productions(&self, description: &str) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| matches!(e, PlannerEvent::RuleProduction { rule, .. } if rule == description))
            .count()
    }
}

impl PlannerListener for RecordingListener {
    fn on_event(&self, event: &PlannerEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
