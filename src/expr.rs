//! Scalar expressions referenced by relational operators.
//!
//! Columns are referenced positionally (`$0`, `$1`, ...) against the row type of the operator's
//! input, so an expression never depends on how the input was produced.

use std::fmt::{Display, Formatter};

use anyhow::bail;

use crate::error::{OptError, OptResult};
use crate::properties::{DataType, Schema};

#[derive(Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Int64(i64),
    Utf8(String),
}

impl ScalarValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    pub fn data_type(&self) -> DataType {
        match self {
            // An untyped null defaults to a bigint.
            ScalarValue::Null | ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Boolean(_) => DataType::Boolean,
            ScalarValue::Utf8(_) => DataType::Utf8,
        }
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::Int64(v)
    }
}

impl From<bool> for ScalarValue {
    fn from(v: bool) -> Self {
        ScalarValue::Boolean(v)
    }
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Utf8(v.to_string())
    }
}

impl Display for ScalarValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Boolean(v) => write!(f, "{}", v),
            ScalarValue::Int64(v) => write!(f, "{}", v),
            ScalarValue::Utf8(v) => write!(f, "'{}'", v),
        }
    }
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, strum_macros::Display)]
pub enum BinaryOp {
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "<>")]
    NotEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    LtEq,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    GtEq,
    #[strum(serialize = "AND")]
    And,
    #[strum(serialize = "OR")]
    Or,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Multiply,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub enum Expr {
    /// Reference to an input column by ordinal.
    Column(usize),
    Literal(ScalarValue),
    BinaryExpr {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull(Box<Expr>),
}

pub fn col(idx: usize) -> Expr {
    Expr::Column(idx)
}

pub fn lit<V: Into<ScalarValue>>(value: V) -> Expr {
    Expr::Literal(value.into())
}

impl Expr {
    fn binary(self, op: BinaryOp, other: Expr) -> Expr {
        Expr::BinaryExpr {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    pub fn eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Eq, other)
    }

    pub fn not_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::NotEq, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Lt, other)
    }

    pub fn lt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::LtEq, other)
    }

    pub fn gt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Gt, other)
    }

    pub fn gt_eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::GtEq, other)
    }

    pub fn and(self, other: Expr) -> Expr {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Or, other)
    }

    pub fn plus(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Plus, other)
    }

    pub fn minus(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Minus, other)
    }

    pub fn multiply(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Multiply, other)
    }

    pub fn as_column(&self) -> Option<usize> {
        match self {
            Expr::Column(idx) => Some(*idx),
            _ => None,
        }
    }

    pub fn data_type(&self, input: &Schema) -> OptResult<DataType> {
        match self {
            Expr::Column(idx) => input
                .field(*idx)
                .map(|f| f.data_type())
                .ok_or_else(|| anyhow::anyhow!("Column ${} out of range for {}", idx, input)),
            Expr::Literal(v) => Ok(v.data_type()),
            Expr::BinaryExpr { left, op, .. } => {
                if op.is_comparison() || op.is_logical() {
                    Ok(DataType::Boolean)
                } else {
                    left.data_type(input)
                }
            }
            Expr::Not(_) | Expr::IsNull(_) => Ok(DataType::Boolean),
        }
    }

    pub fn evaluate(&self, row: &[ScalarValue]) -> OptResult<ScalarValue> {
        match self {
            Expr::Column(idx) => row.get(*idx).cloned().ok_or_else(|| {
                OptError::Execution(format!("Column ${} out of range", idx)).into()
            }),
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Not(e) => match e.evaluate(row)? {
                ScalarValue::Null => Ok(ScalarValue::Null),
                ScalarValue::Boolean(b) => Ok(ScalarValue::Boolean(!b)),
                v => Err(OptError::Execution(format!("NOT applied to {}", v)).into()),
            },
            Expr::IsNull(e) => Ok(ScalarValue::Boolean(e.evaluate(row)?.is_null())),
            Expr::BinaryExpr { left, op, right } => {
                let l = left.evaluate(row)?;
                let r = right.evaluate(row)?;
                eval_binary(&l, *op, &r)
            }
        }
    }
}

fn eval_binary(l: &ScalarValue, op: BinaryOp, r: &ScalarValue) -> OptResult<ScalarValue> {
    use ScalarValue::*;

    if op.is_logical() {
        let (a, b) = match (l, r) {
            (Boolean(a), Boolean(b)) => (Some(*a), Some(*b)),
            (Null, Boolean(b)) => (None, Some(*b)),
            (Boolean(a), Null) => (Some(*a), None),
            (Null, Null) => (None, None),
            _ => bail!(OptError::Execution(format!("{} {} {}", l, op, r))),
        };
        let result = match op {
            BinaryOp::And => match (a, b) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            _ => match (a, b) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
        };
        return Ok(result.map(Boolean).unwrap_or(Null));
    }

    if l.is_null() || r.is_null() {
        return Ok(Null);
    }

    if op.is_comparison() {
        if std::mem::discriminant(l) != std::mem::discriminant(r) {
            bail!(OptError::Execution(format!("cannot compare {} and {}", l, r)));
        }
        let ord = l.cmp(r);
        let result = match op {
            BinaryOp::Eq => ord.is_eq(),
            BinaryOp::NotEq => ord.is_ne(),
            BinaryOp::Lt => ord.is_lt(),
            BinaryOp::LtEq => ord.is_le(),
            BinaryOp::Gt => ord.is_gt(),
            _ => ord.is_ge(),
        };
        return Ok(Boolean(result));
    }

    match (l, r) {
        (Int64(a), Int64(b)) => {
            let v = match op {
                BinaryOp::Plus => a.checked_add(*b),
                BinaryOp::Minus => a.checked_sub(*b),
                _ => a.checked_mul(*b),
            };
            v.map(Int64)
                .ok_or_else(|| OptError::Execution(format!("overflow in {} {} {}", a, op, b)).into())
        }
        _ => bail!(OptError::Execution(format!("{} {} {}", l, op, r))),
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Column(idx) => write!(f, "${}", idx),
            Expr::Literal(v) => write!(f, "{}", v),
            Expr::BinaryExpr { left, op, right } => {
                write_operand(f, left)?;
                write!(f, " {} ", op)?;
                write_operand(f, right)
            }
            Expr::Not(e) => {
                write!(f, "NOT ")?;
                write_operand(f, e)
            }
            Expr::IsNull(e) => {
                write_operand(f, e)?;
                write!(f, " IS NULL")
            }
        }
    }
}

fn write_operand(f: &mut Formatter<'_>, e: &Expr) -> std::fmt::Result {
    match e {
        Expr::BinaryExpr { .. } => write!(f, "({})", e),
        _ => write!(f, "{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = col(0).eq(lit(5)).and(col(1).gt(lit(2)));
        assert_eq!(e.to_string(), "($0 = 5) AND ($1 > 2)");
    }

    #[test]
    fn test_evaluate_three_valued_logic() {
        let row = vec![ScalarValue::Int64(5), ScalarValue::Null];
        let e = col(0).eq(lit(5)).and(col(1).gt(lit(2)));
        assert_eq!(e.evaluate(&row).unwrap(), ScalarValue::Null);

        let e = col(0).eq(lit(4)).and(col(1).gt(lit(2)));
        assert_eq!(e.evaluate(&row).unwrap(), ScalarValue::Boolean(false));

        let e = col(0).plus(lit(1)).multiply(lit(2));
        assert_eq!(e.evaluate(&row).unwrap(), ScalarValue::Int64(12));
    }
}
