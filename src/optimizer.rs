use std::rc::Rc;

use crate::catalog::{Catalog, MemoryCatalog};
use crate::cost::{CostModel, DefaultCostModel};
use crate::error::OptResult;
use crate::listener::{PlannerEvent, PlannerListener};
use crate::plan::Plan;
use crate::properties::LogicalProperty;
use crate::stat::Statistics;

/// Handle of a group of equivalent expressions inside an optimizer.
///
/// In the heuristic optimizer a group is a single graph vertex, in the cascades optimizer it is a
/// `RelSet`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display(fmt = "#{}", _0)]
pub struct GroupId(pub u32);

/// Handle of a single registered expression.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display(fmt = "rel#{}", _0)]
pub struct ExprId(pub u32);

pub trait Optimizer {
    fn context(&self) -> &OptimizerContext;

    fn find_best_plan(self) -> OptResult<Plan>;
}

/// Metadata queries rules may issue about the groups they matched.
pub trait RelMetadata {
    fn context(&self) -> &OptimizerContext;

    fn logical_prop(&self, group: GroupId) -> OptResult<&LogicalProperty>;

    fn statistics(&self, group: GroupId) -> OptResult<&Statistics>;
}

#[derive(Clone, Debug)]
pub struct OptimizerConfig {
    /// Upper bound on the number of rule calls in one optimization.
    max_rule_firings: usize,
    /// When false, the cost based optimizer stops exploring once the root has an implementation.
    exhaustive: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_rule_firings: 10_000,
            exhaustive: true,
        }
    }
}

impl OptimizerConfig {
    pub fn with_max_rule_firings(mut self, max_rule_firings: usize) -> Self {
        self.max_rule_firings = max_rule_firings;
        self
    }

    pub fn with_exhaustive(mut self, exhaustive: bool) -> Self {
        self.exhaustive = exhaustive;
        self
    }

    pub fn max_rule_firings(&self) -> usize {
        self.max_rule_firings
    }

    pub fn exhaustive(&self) -> bool {
        self.exhaustive
    }
}

/// Read only context shared by an optimizer and the rules it fires.
#[derive(Clone)]
pub struct OptimizerContext {
    catalog: Rc<dyn Catalog>,
    cost_model: Rc<dyn CostModel>,
    config: OptimizerConfig,
    listener: Option<Rc<dyn PlannerListener>>,
}

impl OptimizerContext {
    pub fn new(catalog: Rc<dyn Catalog>) -> Self {
        Self {
            catalog,
            cost_model: Rc::new(DefaultCostModel::default()),
            config: OptimizerConfig::default(),
            listener: None,
        }
    }

    pub fn with_cost_model(mut self, cost_model: Rc<dyn CostModel>) -> Self {
        self.cost_model = cost_model;
        self
    }

    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_listener(mut self, listener: Rc<dyn PlannerListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn catalog(&self) -> &dyn Catalog {
        &*self.catalog
    }

    pub fn cost_model(&self) -> &dyn CostModel {
        &*self.cost_model
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub(crate) fn notify(&self, event: PlannerEvent) {
        if let Some(listener) = &self.listener {
            listener.on_event(&event);
        }
    }
}

impl Default for OptimizerContext {
    fn default() -> Self {
        Self::new(Rc::new(MemoryCatalog::new()))
    }
}
