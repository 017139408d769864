use std::fmt::{Display, Formatter};
use std::rc::Rc;

use itertools::Itertools;
use smallvec::SmallVec;

/// Sorted, deduplicated set of column ordinals.
pub type ColumnSet = SmallVec<[usize; 4]>;

pub fn column_set<I: IntoIterator<Item = usize>>(columns: I) -> ColumnSet {
    let mut set: ColumnSet = columns.into_iter().collect();
    set.sort_unstable();
    set.dedup();
    set
}

#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, strum_macros::Display)]
pub enum DataType {
    Int64,
    Float64,
    Utf8,
    Boolean,
}

#[derive(Clone, Debug, Hash, Eq, PartialEq)]
pub struct Field {
    name: String,
    data_type: DataType,
}

impl Field {
    pub fn new<S: Into<String>>(name: S, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }
}

/// Row type of a relational expression: an ordered list of named, typed columns.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Default)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Compares field count and types, ignoring names.
    pub fn type_eq(&self, other: &Schema) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|(a, b)| a.data_type == b.data_type)
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({})",
            self.fields
                .iter()
                .map(|field| format!("{} {}", field.name, field.data_type))
                .join(", ")
        )
    }
}

/// Properties shared by every member of an equivalence class.
#[derive(Clone, PartialEq, Debug)]
pub struct LogicalProperty {
    schema: Rc<Schema>,
    unique_keys: Vec<ColumnSet>,
}

impl LogicalProperty {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema: Rc::new(schema),
            unique_keys: vec![],
        }
    }

    pub fn with_unique_keys(mut self, unique_keys: Vec<ColumnSet>) -> Self {
        self.unique_keys = unique_keys;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn unique_keys(&self) -> &[ColumnSet] {
        &self.unique_keys
    }

    /// Whether rows are provably unique on `columns`, i.e. some known key is a subset of them.
    pub fn are_columns_unique(&self, columns: &[usize]) -> bool {
        self.unique_keys
            .iter()
            .any(|key| key.iter().all(|c| columns.contains(c)))
    }

    /// Adds keys learnt from another equivalent expression.
    pub fn merge_unique_keys(&mut self, other: &LogicalProperty) {
        for key in &other.unique_keys {
            if !self.unique_keys.contains(key) {
                self.unique_keys.push(key.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_key_subset() {
        let prop = LogicalProperty::new(Schema::new(vec![
            Field::new("a", DataType::Int64),
            Field::new("b", DataType::Int64),
        ]))
        .with_unique_keys(vec![column_set([0])]);

        assert!(prop.are_columns_unique(&[0]));
        assert!(prop.are_columns_unique(&[1, 0]));
        assert!(!prop.are_columns_unique(&[1]));
        assert!(!prop.are_columns_unique(&[]));
    }

    #[test]
    fn test_type_eq_ignores_names() {
        let a = Schema::new(vec![Field::new("a", DataType::Int64)]);
        let b = Schema::new(vec![Field::new("b", DataType::Int64)]);
        let c = Schema::new(vec![Field::new("a", DataType::Utf8)]);
        assert!(a.type_eq(&b));
        assert!(!a.type_eq(&c));
    }
}
