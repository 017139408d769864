/// Estimated statistics of a relational expression.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Statistics {
    row_count: f64,
}

impl Statistics {
    pub fn new(row_count: f64) -> Self {
        Self { row_count }
    }

    pub fn row_count(&self) -> f64 {
        self.row_count
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self { row_count: 1.0 }
    }
}
