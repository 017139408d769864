use log::debug;

use crate::error::OptResult;
use crate::operator::{Aggregate, Operator, OperatorKind, Union};
use crate::properties::Convention;
use crate::rules::{Operand, OptExpression, Rule, RuleCall};

/// Pushes an aggregate below a `UNION ALL`, rolling the partial results up above it.
///
/// ```text
/// Aggregate(keys, calls)            Aggregate(0..k, rollup(calls))
///   Union(all)                 =>     Union(all)
///     a                                 Aggregate(keys, calls)
///     b                                   a
///                                       b   (already unique on keys)
/// ```
///
/// Inputs already unique on the group keys are kept as they are. This is a known bug: such an
/// input still has its original row shape, not the `keys ++ calls` shape of the partial
/// aggregates, so the rolled up aggregate reads the wrong columns from it. The behavior is kept
/// on purpose and pinned by a regression test.
///
/// The rule gives up on a distinct union, where aggregating before duplicate elimination changes
/// the result, on distinct aggregate calls, and when no input needs a partial aggregate, which
/// would otherwise rewrite the same tree forever.
pub struct PushAggThroughUnionAllRule {
    operand: Operand,
}

impl PushAggThroughUnionAllRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::exact(OperatorKind::Aggregate)
                .with_convention(Convention::None)
                .with_children(vec![Operand::exact(OperatorKind::Union)
                    .with_convention(Convention::None)]),
        }
    }
}

impl Default for PushAggThroughUnionAllRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for PushAggThroughUnionAllRule {
    fn description(&self) -> &str {
        "PushAggThroughUnionAllRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall) -> OptResult<()> {
        let (aggregate, union) = match (
            call.rel(0).operator().as_aggregate(),
            call.rel(1).operator().as_union(),
        ) {
            (Some(aggregate), Some(union)) => (aggregate.clone(), union.clone()),
            _ => return Ok(()),
        };

        if union.is_distinct() {
            debug!("Not pushing {} through a distinct union", aggregate);
            return Ok(());
        }
        if aggregate.has_distinct_call() {
            return Ok(());
        }

        let keys = aggregate.group_keys();
        let mut pushed = false;
        let mut new_inputs = Vec::with_capacity(call.rel(1).inputs().len());
        for input in call.rel(1).inputs() {
            if call.are_columns_unique(*input, keys)? {
                new_inputs.push(OptExpression::group(*input));
            } else {
                pushed = true;
                new_inputs.push(OptExpression::new(
                    Operator::Aggregate(aggregate.clone()),
                    Convention::None,
                    vec![OptExpression::group(*input)],
                ));
            }
        }

        if !pushed {
            debug!("Every union input is unique on {:?}, nothing to push", keys);
            return Ok(());
        }

        let key_count = keys.len();
        let rolled_up = aggregate
            .calls()
            .iter()
            .enumerate()
            .map(|(idx, c)| c.rollup(key_count + idx))
            .collect();
        let new_union = OptExpression::new(
            Operator::Union(Union::new(true)),
            Convention::None,
            new_inputs,
        );
        call.transform_to(OptExpression::new(
            Operator::Aggregate(Aggregate::new((0..key_count).collect(), rolled_up)),
            Convention::None,
            vec![new_union],
        ));
        Ok(())
    }
}
