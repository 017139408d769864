use std::collections::HashMap;

use anyhow::anyhow;
use itertools::Itertools;

use crate::error::{OptError, OptResult};
use crate::operator::{Operator, OperatorTrait};
use crate::optimizer::{ExprId, GroupId, OptimizerContext};
use crate::properties::{Convention, ConventionSet, LogicalProperty};
use crate::rules::OptExprNode::{GroupHandleNode, OperatorNode};
use crate::rules::{MatchSource, OptExpression, RelRef};
use crate::stat::Statistics;

/// One registered expression. Inputs are sets, canonicalized on read.
#[derive(Debug)]
pub struct MemoExpr {
    id: ExprId,
    set: GroupId,
    operator: Operator,
    convention: Convention,
    inputs: Vec<GroupId>,
    digest: String,
    /// Cleared when the expression turned out to duplicate an earlier one.
    live: bool,
}

impl MemoExpr {
    pub fn id(&self) -> ExprId {
        self.id
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn is_live(&self) -> bool {
        self.live
    }
}

/// Equivalence set: expressions known to produce the same rows.
#[derive(Debug)]
pub struct RelSet {
    id: GroupId,
    exprs: Vec<ExprId>,
    /// Expressions using this set as an input.
    parents: Vec<ExprId>,
    logical_prop: LogicalProperty,
    stat: Statistics,
    /// Conventions consumers need this set in.
    required: ConventionSet,
}

impl RelSet {
    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn logical_prop(&self) -> &LogicalProperty {
        &self.logical_prop
    }

    pub fn stat(&self) -> &Statistics {
        &self.stat
    }

    pub fn required(&self) -> ConventionSet {
        self.required
    }
}

/// What a registration changed, for the optimizer to react to.
#[derive(Default, Debug)]
pub struct MemoChanges {
    pub new_exprs: Vec<ExprId>,
    /// Expressions whose bindings may have changed because sets merged.
    pub touched: Vec<ExprId>,
    /// `(kept, merged)` set pairs.
    pub merges: Vec<(GroupId, GroupId)>,
}

/// Arena of expressions and equivalence sets.
///
/// Sets are merged with union-find, the lower id surviving. Expressions are interned by digest
/// (operator, convention and canonical input sets); after a merge the digests of the affected
/// parents are recomputed, which may prove further sets equal.
#[derive(Default, Debug)]
pub struct Memo {
    exprs: Vec<MemoExpr>,
    sets: Vec<RelSet>,
    forward: Vec<GroupId>,
    digests: HashMap<String, ExprId>,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical id of a set.
    pub fn find(&self, group: GroupId) -> GroupId {
        let mut group = group;
        while self.forward[group.0 as usize] != group {
            group = self.forward[group.0 as usize];
        }
        group
    }

    pub fn contains_set(&self, group: GroupId) -> bool {
        (group.0 as usize) < self.sets.len()
    }

    pub fn set(&self, group: GroupId) -> &RelSet {
        &self.sets[self.find(group).0 as usize]
    }

    fn set_mut(&mut self, group: GroupId) -> &mut RelSet {
        let idx = self.find(group).0 as usize;
        &mut self.sets[idx]
    }

    pub fn expr(&self, id: ExprId) -> &MemoExpr {
        &self.exprs[id.0 as usize]
    }

    pub fn set_of(&self, id: ExprId) -> GroupId {
        self.find(self.expr(id).set)
    }

    pub fn set_count(&self) -> usize {
        self.forward
            .iter()
            .enumerate()
            .filter(|(idx, g)| *idx == g.0 as usize)
            .count()
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.iter().filter(|e| e.live).count()
    }

    /// Canonical sets, in creation order.
    pub fn sets(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.forward
            .iter()
            .enumerate()
            .filter(|(idx, g)| *idx == g.0 as usize)
            .map(|(_, g)| *g)
    }

    /// Live members of a set in registration order.
    pub fn member_ids(&self, group: GroupId) -> Vec<ExprId> {
        self.set(group)
            .exprs
            .iter()
            .copied()
            .filter(|id| self.expr(*id).live)
            .sorted()
            .collect()
    }

    /// Live expressions using the set as an input.
    pub fn parents(&self, group: GroupId) -> Vec<ExprId> {
        self.set(group)
            .parents
            .iter()
            .copied()
            .filter(|id| self.expr(*id).live)
            .unique()
            .collect()
    }

    pub fn inputs(&self, id: ExprId) -> Vec<GroupId> {
        self.expr(id).inputs.iter().map(|g| self.find(*g)).collect()
    }

    pub fn rel_ref(&self, id: ExprId) -> RelRef {
        let expr = self.expr(id);
        RelRef::new(
            id,
            self.find(expr.set),
            expr.operator.clone(),
            expr.convention,
            self.inputs(id),
        )
    }

    /// Records that a consumer needs `group` in `convention`. Returns whether this is new.
    pub fn add_requirement(&mut self, group: GroupId, convention: Convention) -> bool {
        self.set_mut(group).required.insert(convention)
    }

    fn digest(&self, operator: &Operator, convention: Convention, inputs: &[GroupId]) -> String {
        format!(
            "{}:{}({})",
            operator,
            convention,
            inputs.iter().map(|g| self.find(*g)).join(", ")
        )
    }

    fn check_row_type(&self, expected: GroupId, actual: &LogicalProperty) -> OptResult<()> {
        let expected = self.set(expected).logical_prop.schema();
        if expected.type_eq(actual.schema()) {
            Ok(())
        } else {
            Err(OptError::RowTypeMismatch {
                expected: expected.to_string(),
                actual: actual.schema().to_string(),
            }
            .into())
        }
    }

    /// Registers `expr`, in set `target` when given, returning the set it ended up in.
    pub fn register(
        &mut self,
        expr: &OptExpression,
        target: Option<GroupId>,
        ctx: &OptimizerContext,
        changes: &mut MemoChanges,
    ) -> OptResult<GroupId> {
        match expr.node() {
            GroupHandleNode(group) => {
                if !self.contains_set(*group) {
                    return Err(anyhow!("Proposal references unknown set {}", group));
                }
                if let Some(target) = target {
                    let prop = self.set(*group).logical_prop.clone();
                    self.check_row_type(target, &prop)?;
                    self.merge(target, *group, changes);
                }
                Ok(self.find(*group))
            }
            OperatorNode(operator, convention) => {
                let mut inputs = Vec::with_capacity(expr.inputs().len());
                for input in expr.inputs() {
                    inputs.push(self.register(input, None, ctx, changes)?);
                }
                // Registering a later input may have merged an earlier one.
                let inputs: Vec<GroupId> = inputs.into_iter().map(|g| self.find(g)).collect();

                let digest = self.digest(operator, *convention, &inputs);
                if let Some(existing) = self.digests.get(&digest).copied() {
                    let set = self.set_of(existing);
                    if let Some(target) = target {
                        let prop = self.set(set).logical_prop.clone();
                        self.check_row_type(target, &prop)?;
                        self.merge(target, set, changes);
                    }
                    return Ok(self.set_of(existing));
                }

                let (prop, stat) = {
                    let input_props: Vec<&LogicalProperty> =
                        inputs.iter().map(|g| &self.set(*g).logical_prop).collect();
                    let input_stats: Vec<&Statistics> =
                        inputs.iter().map(|g| &self.set(*g).stat).collect();
                    let prop = operator.derive_logical_prop(&input_props, ctx)?;
                    let stat = operator.derive_statistics(&prop, &input_stats, ctx)?;
                    (prop, stat)
                };

                let set = match target {
                    Some(target) => {
                        self.check_row_type(target, &prop)?;
                        self.set_mut(target).logical_prop.merge_unique_keys(&prop);
                        self.find(target)
                    }
                    None => self.new_set(prop, stat),
                };

                let id = ExprId(self.exprs.len() as u32);
                self.exprs.push(MemoExpr {
                    id,
                    set,
                    operator: operator.clone(),
                    convention: *convention,
                    inputs: inputs.clone(),
                    digest: digest.clone(),
                    live: true,
                });
                self.set_mut(set).exprs.push(id);
                for input in inputs.into_iter().unique() {
                    self.set_mut(input).parents.push(id);
                }
                self.digests.insert(digest, id);
                changes.new_exprs.push(id);
                Ok(set)
            }
        }
    }

    fn new_set(&mut self, logical_prop: LogicalProperty, stat: Statistics) -> GroupId {
        let id = GroupId(self.sets.len() as u32);
        self.sets.push(RelSet {
            id,
            exprs: vec![],
            parents: vec![],
            logical_prop,
            stat,
            required: ConventionSet::empty(),
        });
        self.forward.push(id);
        id
    }

    /// Merges two sets proven equivalent, and every pair of sets this proves equivalent in turn.
    fn merge(&mut self, a: GroupId, b: GroupId, changes: &mut MemoChanges) {
        let mut pending = vec![(a, b)];
        while let Some((a, b)) = pending.pop() {
            let (a, b) = (self.find(a), self.find(b));
            if a == b {
                continue;
            }
            let (kept, merged) = if a < b { (a, b) } else { (b, a) };
            self.forward[merged.0 as usize] = kept;

            let (exprs, parents, required, prop) = {
                let set = &mut self.sets[merged.0 as usize];
                (
                    std::mem::take(&mut set.exprs),
                    std::mem::take(&mut set.parents),
                    set.required,
                    set.logical_prop.clone(),
                )
            };
            let set = &mut self.sets[kept.0 as usize];
            set.exprs.extend(exprs);
            set.parents.extend(parents);
            set.required |= required;
            set.logical_prop.merge_unique_keys(&prop);
            changes.merges.push((kept, merged));

            for parent in self.parents(kept) {
                let expr = self.expr(parent);
                let digest = self.digest(&expr.operator, expr.convention, &expr.inputs);
                if digest == expr.digest {
                    continue;
                }
                let old = std::mem::replace(&mut self.exprs[parent.0 as usize].digest, digest.clone());
                if self.digests.get(&old) == Some(&parent) {
                    self.digests.remove(&old);
                }

                match self.digests.get(&digest).copied() {
                    Some(other) if other != parent && self.expr(other).live => {
                        let (s1, s2) = (self.set_of(parent), self.set_of(other));
                        if s1 != s2 {
                            pending.push((s1, s2));
                        }
                        let (keep, drop) = if other < parent {
                            (other, parent)
                        } else {
                            (parent, other)
                        };
                        self.exprs[drop.0 as usize].live = false;
                        self.digests.insert(digest, keep);
                    }
                    _ => {
                        self.digests.insert(digest, parent);
                    }
                }
            }

            changes.touched.extend(self.member_ids(kept));
            changes.touched.extend(self.parents(kept));
        }
    }
}

impl MatchSource for Memo {
    fn members(&self, group: GroupId) -> Vec<RelRef> {
        self.member_ids(group)
            .into_iter()
            .map(|id| self.rel_ref(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::catalog::{MemoryCatalog, TableMeta};
    use crate::expr::{col, lit};
    use crate::expr::ScalarValue;
    use crate::operator::{Filter, Projection, TableScan, Values};
    use crate::properties::{DataType, Field, Schema};

    fn context() -> OptimizerContext {
        let schema = Schema::new(vec![Field::new("a", DataType::Int64)]);
        let catalog = MemoryCatalog::new()
            .with_table(TableMeta::new("t", schema.clone(), 10.0))
            .with_table(TableMeta::new("u", schema, 10.0));
        OptimizerContext::new(Rc::new(catalog))
    }

    fn scan(table: &str) -> OptExpression {
        OptExpression::new(
            Operator::TableScan(TableScan::new(table)),
            Convention::None,
            vec![],
        )
    }

    fn filter(input: OptExpression) -> OptExpression {
        OptExpression::new(
            Operator::Filter(Filter::new(col(0).eq(lit(1)))),
            Convention::None,
            vec![input],
        )
    }

    #[test]
    fn test_register_interns_digests() {
        let ctx = context();
        let mut memo = Memo::new();
        let mut changes = MemoChanges::default();

        let a = memo.register(&filter(scan("t")), None, &ctx, &mut changes).unwrap();
        let b = memo.register(&filter(scan("t")), None, &ctx, &mut changes).unwrap();
        assert_eq!(a, b);
        assert_eq!(memo.expr_count(), 2);
        assert_eq!(changes.new_exprs.len(), 2);
    }

    #[test]
    fn test_merge_cascades_to_parents() {
        let ctx = context();
        let mut memo = Memo::new();
        let mut changes = MemoChanges::default();

        let ft = memo.register(&filter(scan("t")), None, &ctx, &mut changes).unwrap();
        let fu = memo.register(&filter(scan("u")), None, &ctx, &mut changes).unwrap();
        assert_ne!(ft, fu);

        // Proving t = u makes both filters identical, merging their sets too.
        let t = memo.register(&scan("t"), None, &ctx, &mut changes).unwrap();
        memo.register(&scan("u"), Some(t), &ctx, &mut changes).unwrap();
        assert_eq!(memo.find(ft), memo.find(fu));
        assert_eq!(memo.member_ids(ft).len(), 1);
        assert_eq!(memo.set_count(), 2);
    }

    #[test]
    fn test_row_type_mismatch() {
        let ctx = context();
        let mut memo = Memo::new();
        let mut changes = MemoChanges::default();

        let t = memo.register(&scan("t"), None, &ctx, &mut changes).unwrap();
        let widen = OptExpression::new(
            Operator::Projection(Projection::new(
                vec![col(0), col(0)],
                vec!["a".to_string(), "b".to_string()],
            )),
            Convention::None,
            vec![OptExpression::group(t)],
        );
        let err = memo.register(&widen, Some(t), &ctx, &mut changes).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::RowTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_values_with_other_row_type_not_interned() {
        let ctx = context();
        let mut memo = Memo::new();
        let mut changes = MemoChanges::default();
        let values = |name: &str| {
            OptExpression::new(
                Operator::Values(Values::new(
                    Schema::new(vec![Field::new(name, DataType::Int64)]),
                    vec![vec![ScalarValue::Int64(1)]],
                )),
                Convention::None,
                vec![],
            )
        };

        let a = memo.register(&values("a"), None, &ctx, &mut changes).unwrap();
        let b = memo.register(&values("b"), None, &ctx, &mut changes).unwrap();
        assert_ne!(memo.find(a), memo.find(b));
        assert_eq!(memo.set_count(), 2);
    }
}
