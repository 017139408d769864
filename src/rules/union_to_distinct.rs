use crate::error::OptResult;
use crate::operator::{Aggregate, Operator, OperatorKind, Union};
use crate::properties::Convention;
use crate::rules::{Operand, OptExpression, Rule, RuleCall};

/// Rewrites a distinct union as `Aggregate(all columns)` over a `UNION ALL`.
pub struct UnionToDistinctRule {
    operand: Operand,
}

impl UnionToDistinctRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::exact(OperatorKind::Union).with_convention(Convention::None),
        }
    }
}

impl Default for UnionToDistinctRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for UnionToDistinctRule {
    fn description(&self) -> &str {
        "UnionToDistinctRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall) -> OptResult<()> {
        let rel = call.rel(0);
        if rel.operator().as_union().map_or(true, |u| u.all()) {
            return Ok(());
        }

        let columns = call.logical_prop(rel.group())?.schema().len();
        let union_all = OptExpression::with_input_groups(
            Operator::Union(Union::new(true)),
            Convention::None,
            rel.inputs(),
        );
        let distinct = OptExpression::new(
            Operator::Aggregate(Aggregate::new((0..columns).collect(), vec![])),
            Convention::None,
            vec![union_all],
        );
        call.transform_to(distinct);
        Ok(())
    }
}
