//! Catalog lookups needed by the optimizer.
//!
//! The metadata repository is an external collaborator; the optimizer only needs the row type,
//! cardinality and keys of a table and whether it lives in a remote JDBC source.

use std::collections::HashMap;
use std::rc::Rc;

use crate::operator::SqlDialect;
use crate::properties::{ColumnSet, Schema};

#[derive(Clone, Debug, PartialEq)]
pub struct TableMeta {
    name: String,
    schema: Schema,
    row_count: f64,
    unique_keys: Vec<ColumnSet>,
    remote: Option<SqlDialect>,
}

impl TableMeta {
    pub fn new<S: Into<String>>(name: S, schema: Schema, row_count: f64) -> Self {
        Self {
            name: name.into(),
            schema,
            row_count,
            unique_keys: vec![],
            remote: None,
        }
    }

    pub fn with_unique_key(mut self, key: ColumnSet) -> Self {
        self.unique_keys.push(key);
        self
    }

    /// Marks the table as living in a JDBC source speaking `dialect`.
    pub fn with_remote(mut self, dialect: SqlDialect) -> Self {
        self.remote = Some(dialect);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn row_count(&self) -> f64 {
        self.row_count
    }

    pub fn unique_keys(&self) -> &[ColumnSet] {
        &self.unique_keys
    }

    pub fn remote(&self) -> Option<SqlDialect> {
        self.remote
    }
}

pub trait Catalog {
    fn table(&self, name: &str) -> Option<Rc<TableMeta>>;
}

#[derive(Default, Debug)]
pub struct MemoryCatalog {
    tables: HashMap<String, Rc<TableMeta>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableMeta) -> Self {
        self.add_table(table);
        self
    }

    pub fn add_table(&mut self, table: TableMeta) {
        self.tables.insert(table.name.clone(), Rc::new(table));
    }
}

impl Catalog for MemoryCatalog {
    fn table(&self, name: &str) -> Option<Rc<TableMeta>> {
        self.tables.get(name).cloned()
    }
}
