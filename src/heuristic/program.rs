use crate::error::{OptError, OptResult};
use crate::properties::Convention;
use crate::rules::RuleRef;

/// Order in which vertices are visited when looking for a match.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum MatchOrder {
    /// Depth first from the root, resuming from the last rewritten vertex.
    #[default]
    Arbitrary,
    /// Parents before their inputs.
    TopDown,
    /// Inputs before their parents.
    BottomUp,
}

#[derive(Clone, Debug)]
pub enum HepInstruction {
    RuleInstance(RuleRef),
    /// Rule registered with the optimizer, looked up when the instruction runs.
    RuleByDescription(String),
    /// Rules fired in any order until none matches.
    RuleCollection(Vec<RuleRef>),
    BeginGroup,
    EndGroup,
    MatchOrder(MatchOrder),
    /// Maximum number of transformations per instruction.
    MatchLimit(usize),
    /// Program repeated until it stops transforming the plan.
    Subprogram(HepProgram),
    /// Applies every registered converter rule until the plan is in the given convention.
    Convert(Convention),
}

/// Ordered list of rule applications replayed by [`crate::heuristic::HepOptimizer`].
#[derive(Clone, Debug, Default)]
pub struct HepProgram {
    instructions: Vec<HepInstruction>,
}

impl HepProgram {
    pub fn builder() -> HepProgramBuilder {
        HepProgramBuilder::default()
    }

    pub fn instructions(&self) -> &[HepInstruction] {
        &self.instructions
    }

    /// Rules referenced directly by this program and its subprograms.
    pub fn rules(&self) -> Vec<RuleRef> {
        let mut rules = vec![];
        for instruction in &self.instructions {
            match instruction {
                HepInstruction::RuleInstance(rule) => rules.push(rule.clone()),
                HepInstruction::RuleCollection(collection) => {
                    rules.extend(collection.iter().cloned())
                }
                HepInstruction::Subprogram(program) => rules.extend(program.rules()),
                _ => {}
            }
        }
        rules
    }
}

#[derive(Default)]
pub struct HepProgramBuilder {
    instructions: Vec<HepInstruction>,
}

impl HepProgramBuilder {
    pub fn add_rule_instance(mut self, rule: RuleRef) -> Self {
        self.instructions.push(HepInstruction::RuleInstance(rule));
        self
    }

    pub fn add_rule_by_description<S: Into<String>>(mut self, description: S) -> Self {
        self.instructions
            .push(HepInstruction::RuleByDescription(description.into()));
        self
    }

    pub fn add_rule_collection<I>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = RuleRef>,
    {
        self.instructions
            .push(HepInstruction::RuleCollection(rules.into_iter().collect()));
        self
    }

    pub fn add_group_begin(mut self) -> Self {
        self.instructions.push(HepInstruction::BeginGroup);
        self
    }

    pub fn add_group_end(mut self) -> Self {
        self.instructions.push(HepInstruction::EndGroup);
        self
    }

    pub fn add_match_order(mut self, order: MatchOrder) -> Self {
        self.instructions.push(HepInstruction::MatchOrder(order));
        self
    }

    pub fn add_match_limit(mut self, limit: usize) -> Self {
        self.instructions.push(HepInstruction::MatchLimit(limit));
        self
    }

    pub fn add_subprogram(mut self, program: HepProgram) -> Self {
        self.instructions.push(HepInstruction::Subprogram(program));
        self
    }

    pub fn add_conversion(mut self, convention: Convention) -> Self {
        self.instructions.push(HepInstruction::Convert(convention));
        self
    }

    pub fn build(self) -> OptResult<HepProgram> {
        let mut in_group = false;
        for instruction in &self.instructions {
            match instruction {
                HepInstruction::BeginGroup if in_group => {
                    return Err(OptError::InvalidProgram("groups can't be nested".into()).into())
                }
                HepInstruction::BeginGroup => in_group = true,
                HepInstruction::EndGroup if !in_group => {
                    return Err(
                        OptError::InvalidProgram("group end without group begin".into()).into(),
                    )
                }
                HepInstruction::EndGroup => in_group = false,
                HepInstruction::Subprogram(_) | HepInstruction::Convert(_) if in_group => {
                    return Err(OptError::InvalidProgram(
                        "only rules can be placed inside a group".into(),
                    )
                    .into())
                }
                _ => {}
            }
        }

        if in_group {
            return Err(OptError::InvalidProgram("group is never ended".into()).into());
        }

        Ok(HepProgram {
            instructions: self.instructions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::standard_rules;

    fn assert_invalid(builder: HepProgramBuilder) {
        let err = builder.build().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::InvalidProgram(_))
        ));
    }

    #[test]
    fn test_group_nesting() {
        assert_invalid(HepProgram::builder().add_group_begin().add_group_begin());
        assert_invalid(HepProgram::builder().add_group_end());
        assert_invalid(HepProgram::builder().add_group_begin());
        assert_invalid(
            HepProgram::builder()
                .add_group_begin()
                .add_conversion(Convention::Iterator)
                .add_group_end(),
        );

        let program = HepProgram::builder()
            .add_group_begin()
            .add_rule_collection(standard_rules())
            .add_group_end()
            .build()
            .unwrap();
        assert_eq!(program.instructions().len(), 3);
        assert_eq!(program.rules().len(), standard_rules().len());
    }
}
