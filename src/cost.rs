//! Cost model.
//!
//! Operators estimate the resources they consume as a [`CostEstimate`] (rows, cpu, io). A
//! pluggable [`CostModel`] folds an estimate into a single [`Cost`], which is totally ordered so
//! that the cost based optimizer can pick a winner deterministically.

use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::ops::Add;

use crate::error::{OptError, OptResult};

/// Resource estimate of one operator, excluding its inputs.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct CostEstimate {
    pub rows: f64,
    pub cpu: f64,
    pub io: f64,
}

impl CostEstimate {
    pub fn new(rows: f64, cpu: f64, io: f64) -> Self {
        Self { rows, cpu, io }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Cost(f64);

impl Cost {
    pub const INFINITE: Cost = Cost(f64::INFINITY);
    pub const ZERO: Cost = Cost(0.0);

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_infinite(&self) -> bool {
        self.0.is_infinite()
    }
}

impl From<f64> for Cost {
    fn from(v: f64) -> Self {
        Self(v)
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Self) -> Self::Output {
        Cost(self.0 + rhs.0)
    }
}

impl PartialEq for Cost {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Cost {}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Display for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_infinite() {
            write!(f, "inf")
        } else {
            write!(f, "{:.2}", self.0)
        }
    }
}

pub trait CostModel {
    fn cost(&self, estimate: &CostEstimate) -> OptResult<Cost>;
}

/// Weighted sum of rows, cpu and io.
#[derive(Clone, Debug)]
pub struct DefaultCostModel {
    row_weight: f64,
    cpu_weight: f64,
    io_weight: f64,
}

impl DefaultCostModel {
    pub fn new(row_weight: f64, cpu_weight: f64, io_weight: f64) -> Self {
        Self {
            row_weight,
            cpu_weight,
            io_weight,
        }
    }
}

impl Default for DefaultCostModel {
    fn default() -> Self {
        Self::new(1.0, 1.0, 4.0)
    }
}

impl CostModel for DefaultCostModel {
    fn cost(&self, estimate: &CostEstimate) -> OptResult<Cost> {
        let CostEstimate { rows, cpu, io } = *estimate;
        if [rows, cpu, io].iter().any(|v| v.is_nan() || *v < 0.0) {
            return Err(OptError::InvalidCost(format!(
                "cost estimate must be non-negative, got {:?}",
                estimate
            ))
            .into());
        }

        Ok(Cost(
            rows * self.row_weight + cpu * self.cpu_weight + io * self.io_weight,
        ))
    }
}
