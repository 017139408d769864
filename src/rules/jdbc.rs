//! Rules fusing relational operators into remote JDBC queries.
//!
//! Both rules leave the matched query alone and propose a modified copy. They only fire while the
//! query still selects `*`: once the select list is shaped, the column names a predicate or
//! projection would be translated against are no longer the table's.

use log::debug;

use crate::error::OptResult;
use crate::operator::{Operator, OperatorKind};
use crate::properties::Convention;
use crate::rules::{Operand, OptExpression, Rule, RuleCall};

fn filter_or_project_over_query(kind: OperatorKind) -> Operand {
    Operand::exact(kind)
        .with_convention(Convention::None)
        .with_children(vec![Operand::exact(OperatorKind::JdbcQuery)
            .with_convention(Convention::ResultSet)])
}

/// `Filter(JdbcQuery)` to a `JdbcQuery` with the predicate in its WHERE clause.
pub struct AddFilterToQueryRule {
    operand: Operand,
}

impl AddFilterToQueryRule {
    pub fn new() -> Self {
        Self {
            operand: filter_or_project_over_query(OperatorKind::Filter),
        }
    }
}

impl Default for AddFilterToQueryRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for AddFilterToQueryRule {
    fn description(&self) -> &str {
        "AddFilterToQueryRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall) -> OptResult<()> {
        let (filter, query) = match (
            call.rel(0).operator().as_filter(),
            call.rel(1).operator().as_jdbc_query(),
        ) {
            (Some(filter), Some(query)) => (filter, query),
            _ => return Ok(()),
        };

        match query.with_filter(filter.predicate())? {
            Some(fused) => {
                debug!("Fused {} into {}", filter, fused.sql());
                call.transform_to(OptExpression::new(
                    Operator::JdbcQuery(fused),
                    Convention::ResultSet,
                    vec![],
                ));
            }
            None => debug!("Can't fuse {} into {}", filter, query),
        }
        Ok(())
    }
}

/// `Projection(JdbcQuery)` to a `JdbcQuery` computing the projection in its select list.
pub struct AddProjectToQueryRule {
    operand: Operand,
}

impl AddProjectToQueryRule {
    pub fn new() -> Self {
        Self {
            operand: filter_or_project_over_query(OperatorKind::Projection),
        }
    }
}

impl Default for AddProjectToQueryRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for AddProjectToQueryRule {
    fn description(&self) -> &str {
        "AddProjectToQueryRule"
    }

    fn operand(&self) -> &Operand {
        &self.operand
    }

    fn on_match(&self, call: &mut RuleCall) -> OptResult<()> {
        let (projection, query) = match (
            call.rel(0).operator().as_projection(),
            call.rel(1).operator().as_jdbc_query(),
        ) {
            (Some(projection), Some(query)) => (projection, query),
            _ => return Ok(()),
        };

        let output = call.logical_prop(call.rel(0).group())?.schema();
        if let Some(fused) = query.with_projection(projection, output)? {
            debug!("Fused {} into {}", projection, fused.sql());
            call.transform_to(OptExpression::new(
                Operator::JdbcQuery(fused),
                Convention::ResultSet,
                vec![],
            ));
        }
        Ok(())
    }
}
