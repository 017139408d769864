use log::debug;

use crate::error::OptResult;
use crate::operator::OperatorKind;
use crate::rules::{Operand, OptExpression, Rule, RuleCall};

/// Removes a projection that reproduces its input column by column.
///
/// Matches projections in any convention.
pub struct RemoveTrivialProjectRule {
    operand: Operand,
}

impl RemoveTrivialProjectRule {
    pub fn new() -> Self {
        Self {
            operand: Operand::exact(OperatorKind::Projection),
        }
    }
}

impl Default for RemoveTrivialProjectRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for RemoveTrivialProjectRule {
    fn description(&self) -> &str {
        "RemoveTrivialProjectRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall) -> OptResult<()> {
        let rel = call.rel(0);
        let (projection, input) = match (rel.operator().as_projection(), rel.inputs()) {
            (Some(projection), [input]) => (projection, *input),
            _ => return Ok(()),
        };

        let input_schema = call.logical_prop(input)?.schema();
        let output_schema = call.logical_prop(rel.group())?.schema();
        if projection.is_identity(input_schema) && output_schema.type_eq(input_schema) {
            debug!("Removing trivial {}", projection);
            call.transform_to(OptExpression::group(input));
        }
        Ok(())
    }
}
