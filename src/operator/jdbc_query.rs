use std::fmt::{Display, Formatter};

use anyhow::{anyhow, bail};
use sqlparser::ast::{
    BinaryOperator, Expr as SqlExpr, Ident, Select, SelectItem, SetExpr, Statement,
    UnaryOperator, Value,
};
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

use crate::catalog::TableMeta;
use crate::cost::CostEstimate;
use crate::error::{OptError, OptResult};
use crate::expr::{BinaryOp, Expr, ScalarValue};
use crate::operator::{check_arity, OperatorCategory, OperatorTrait, Projection};
use crate::optimizer::OptimizerContext;
use crate::properties::{LogicalProperty, Schema};
use crate::stat::Statistics;

const PUSHED_FILTER_SELECTIVITY: f64 = 0.25;

/// SQL dialect spoken by a remote JDBC source.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, strum_macros::Display)]
pub enum SqlDialect {
    Generic,
    Postgres,
    MySql,
}

impl SqlDialect {
    pub fn quote_style(self) -> Option<char> {
        match self {
            SqlDialect::Generic => None,
            SqlDialect::Postgres => Some('"'),
            SqlDialect::MySql => Some('`'),
        }
    }

    pub fn ident(self, name: &str) -> Ident {
        match self.quote_style() {
            Some(quote) => Ident::with_quote(quote, name),
            None => Ident::new(name),
        }
    }

    fn parser_dialect(self) -> Box<dyn Dialect> {
        match self {
            SqlDialect::Generic => Box::new(GenericDialect {}),
            SqlDialect::Postgres => Box::new(PostgreSqlDialect {}),
            SqlDialect::MySql => Box::new(MySqlDialect {}),
        }
    }
}

/// A query evaluated by a remote JDBC source, producing a result set.
///
/// The query starts as `SELECT * FROM <table>`. Filters and projections fused into it are
/// translated into the source's dialect and grafted onto a copy of the SQL tree; a registered
/// query is never edited in place.
#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct JdbcQuery {
    table: String,
    dialect: SqlDialect,
    statement: Statement,
    schema: Schema,
}

impl JdbcQuery {
    pub fn new(table: &TableMeta) -> OptResult<Self> {
        let dialect = table
            .remote()
            .ok_or_else(|| anyhow!("Table '{}' is not in a JDBC source", table.name()))?;
        let sql = format!("SELECT * FROM {}", dialect.ident(table.name()));
        let mut statements = Parser::parse_sql(&*dialect.parser_dialect(), &sql)?;
        anyhow::ensure!(statements.len() == 1, "Expected one statement in '{}'", sql);

        Ok(Self {
            table: table.name().to_string(),
            dialect,
            statement: statements.remove(0),
            schema: table.schema().clone(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn sql(&self) -> String {
        self.statement.to_string()
    }

    pub fn select(&self) -> Option<&Select> {
        match &self.statement {
            Statement::Query(query) => match query.body.as_ref() {
                SetExpr::Select(select) => Some(select.as_ref()),
                _ => None,
            },
            _ => None,
        }
    }

    fn select_mut(&mut self) -> OptResult<&mut Select> {
        match &mut self.statement {
            Statement::Query(query) => match query.body.as_mut() {
                SetExpr::Select(select) => Ok(select.as_mut()),
                body => bail!("Expected a SELECT body, got {}", body),
            },
            stmt => bail!("Expected a query, got {}", stmt),
        }
    }

    /// Whether the select list is still the `*` placeholder.
    pub fn is_select_star(&self) -> bool {
        self.select()
            .map(|s| matches!(s.projection.as_slice(), [SelectItem::Wildcard(_)]))
            .unwrap_or(false)
    }

    /// Copy of this query with `predicate` AND-ed into its WHERE clause.
    ///
    /// Returns `None` when the select list is already shaped or the predicate can't be
    /// expressed in the dialect.
    pub fn with_filter(&self, predicate: &Expr) -> OptResult<Option<JdbcQuery>> {
        if !self.is_select_star() {
            return Ok(None);
        }
        let condition = match self.translate(predicate) {
            Some(c) => c,
            None => return Ok(None),
        };

        let mut query = self.clone();
        let select = query.select_mut()?;
        select.selection = Some(match select.selection.take() {
            Some(existing) => SqlExpr::BinaryOp {
                left: Box::new(nested(existing)),
                op: BinaryOperator::And,
                right: Box::new(nested(condition)),
            },
            None => condition,
        });
        Ok(Some(query))
    }

    /// Copy of this query whose select list computes `projection` with row type `output`.
    pub fn with_projection(
        &self,
        projection: &Projection,
        output: &Schema,
    ) -> OptResult<Option<JdbcQuery>> {
        if !self.is_select_star() {
            return Ok(None);
        }

        let mut items = Vec::with_capacity(projection.exprs().len());
        for (expr, name) in projection.exprs().iter().zip(projection.names()) {
            let expr = match self.translate(expr) {
                Some(e) => e,
                None => return Ok(None),
            };
            let alias = self.dialect.ident(name);
            items.push(match expr {
                SqlExpr::Identifier(ident) if ident == alias => {
                    SelectItem::UnnamedExpr(SqlExpr::Identifier(ident))
                }
                expr => SelectItem::ExprWithAlias { expr, alias },
            });
        }

        let mut query = self.clone();
        query.select_mut()?.projection = items;
        query.schema = output.clone();
        Ok(Some(query))
    }

    fn translate(&self, expr: &Expr) -> Option<SqlExpr> {
        match expr {
            Expr::Column(idx) => self
                .schema
                .field(*idx)
                .map(|f| SqlExpr::Identifier(self.dialect.ident(f.name()))),
            Expr::Literal(v) => Some(SqlExpr::Value(match v {
                ScalarValue::Null => Value::Null,
                ScalarValue::Boolean(b) => Value::Boolean(*b),
                ScalarValue::Int64(i) => Value::Number(i.to_string(), false),
                ScalarValue::Utf8(s) => Value::SingleQuotedString(s.clone()),
            })),
            Expr::BinaryExpr { left, op, right } => Some(SqlExpr::BinaryOp {
                left: Box::new(nested(self.translate(left)?)),
                op: binary_operator(*op),
                right: Box::new(nested(self.translate(right)?)),
            }),
            Expr::Not(e) => Some(SqlExpr::UnaryOp {
                op: UnaryOperator::Not,
                expr: Box::new(nested(self.translate(e)?)),
            }),
            Expr::IsNull(e) => Some(SqlExpr::IsNull(Box::new(nested(self.translate(e)?)))),
        }
    }
}

fn nested(expr: SqlExpr) -> SqlExpr {
    match expr {
        SqlExpr::BinaryOp { .. } => SqlExpr::Nested(Box::new(expr)),
        e => e,
    }
}

fn binary_operator(op: BinaryOp) -> BinaryOperator {
    match op {
        BinaryOp::Eq => BinaryOperator::Eq,
        BinaryOp::NotEq => BinaryOperator::NotEq,
        BinaryOp::Lt => BinaryOperator::Lt,
        BinaryOp::LtEq => BinaryOperator::LtEq,
        BinaryOp::Gt => BinaryOperator::Gt,
        BinaryOp::GtEq => BinaryOperator::GtEq,
        BinaryOp::And => BinaryOperator::And,
        BinaryOp::Or => BinaryOperator::Or,
        BinaryOp::Plus => BinaryOperator::Plus,
        BinaryOp::Minus => BinaryOperator::Minus,
        BinaryOp::Multiply => BinaryOperator::Multiply,
    }
}

impl OperatorTrait for JdbcQuery {
    fn category(&self) -> OperatorCategory {
        OperatorCategory::Leaf
    }

    fn derive_logical_prop(
        &self,
        inputs: &[&LogicalProperty],
        ctx: &OptimizerContext,
    ) -> OptResult<LogicalProperty> {
        check_arity(self, inputs.len())?;
        // Keys of the table only hold while the select list is untouched.
        let unique_keys = if self.is_select_star() {
            ctx.catalog()
                .table(&self.table)
                .map(|t| t.unique_keys().to_vec())
                .unwrap_or_default()
        } else {
            vec![]
        };
        Ok(LogicalProperty::new(self.schema.clone()).with_unique_keys(unique_keys))
    }

    fn derive_statistics(
        &self,
        _prop: &LogicalProperty,
        _inputs: &[&Statistics],
        ctx: &OptimizerContext,
    ) -> OptResult<Statistics> {
        let table = ctx
            .catalog()
            .table(&self.table)
            .ok_or_else(|| OptError::UnknownTable(self.table.clone()))?;
        let filtered = self
            .select()
            .map(|s| s.selection.is_some())
            .unwrap_or(false);
        let rows = if filtered {
            table.row_count() * PUSHED_FILTER_SELECTIVITY
        } else {
            table.row_count()
        };
        Ok(Statistics::new(rows))
    }

    fn self_cost(&self, stat: &Statistics, _inputs: &[&Statistics]) -> CostEstimate {
        CostEstimate::new(stat.row_count(), 0.0, stat.row_count())
    }
}

impl Display for JdbcQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "JdbcQuery(sql={})", self.statement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col, lit};
    use crate::properties::{DataType, Field};

    fn table(dialect: SqlDialect) -> TableMeta {
        TableMeta::new(
            "t",
            Schema::new(vec![
                Field::new("a", DataType::Int64),
                Field::new("b", DataType::Utf8),
            ]),
            100.0,
        )
        .with_remote(dialect)
    }

    #[test]
    fn test_filter_fusion() {
        let query = JdbcQuery::new(&table(SqlDialect::Generic)).unwrap();
        assert!(query.is_select_star());
        assert_eq!(query.sql(), "SELECT * FROM t");

        let filtered = query.with_filter(&col(0).eq(lit(5))).unwrap().unwrap();
        assert_eq!(filtered.sql(), "SELECT * FROM t WHERE a = 5");
        assert_eq!(query.sql(), "SELECT * FROM t");

        let twice = filtered
            .with_filter(&col(1).eq(lit("x")))
            .unwrap()
            .unwrap();
        assert_eq!(twice.sql(), "SELECT * FROM t WHERE (a = 5) AND (b = 'x')");
    }

    #[test]
    fn test_dialect_quoting() {
        let query = JdbcQuery::new(&table(SqlDialect::Postgres)).unwrap();
        let filtered = query
            .with_filter(&col(0).gt(lit(1)).or(col(1).eq(lit("y"))))
            .unwrap()
            .unwrap();
        assert_eq!(
            filtered.sql(),
            r#"SELECT * FROM "t" WHERE ("a" > 1) OR ("b" = 'y')"#
        );

        let query = JdbcQuery::new(&table(SqlDialect::MySql)).unwrap();
        assert_eq!(query.sql(), "SELECT * FROM `t`");
    }

    #[test]
    fn test_projection_fusion_shapes_select_list() {
        let query = JdbcQuery::new(&table(SqlDialect::Generic)).unwrap();
        let projection = Projection::new(
            vec![col(1), col(0).plus(lit(1))],
            vec!["b".to_string(), "a1".to_string()],
        );
        let output = Schema::new(vec![
            Field::new("b", DataType::Utf8),
            Field::new("a1", DataType::Int64),
        ]);

        let projected = query
            .with_projection(&projection, &output)
            .unwrap()
            .unwrap();
        assert_eq!(projected.sql(), "SELECT b, a + 1 AS a1 FROM t");
        assert!(!projected.is_select_star());
        assert_eq!(projected.schema(), &output);

        // A shaped select list accepts no further fusion.
        assert!(projected.with_filter(&col(0).eq(lit("x"))).unwrap().is_none());
        assert!(projected
            .with_projection(&projection, &output)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_untranslatable_predicate() {
        let query = JdbcQuery::new(&table(SqlDialect::Generic)).unwrap();
        assert!(query.with_filter(&col(7).eq(lit(1))).unwrap().is_none());
    }
}
