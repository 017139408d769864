//! Implementation of heuristic optimizer.
//!
//! Heuristic optimizer optimizes query plan by replaying a program of rewrite rules, each until
//! it no longer matches or a match limit is reached. There is no search: the first alternative a
//! rule proposes wins. The implementation is heavily inspired by
//! [apache calcite](https://github.com/apache/calcite)'s HepPlanner.

mod optimizer;
pub use optimizer::*;
mod graph;
pub use graph::*;
mod program;
pub use program::*;
