//! Implementation of cost based optimizer.
//!
//! Rules never replace anything here. Every alternative they propose is registered in a memo of
//! equivalence sets, and exploration goes on until no rule has an unseen binding left. The
//! cheapest tree delivering the required convention is then picked by dynamic programming over
//! (set, convention) pairs, following the cascades framework[1].
//!
//! 1. Graefe, G., 1995. The cascades framework for query optimization. IEEE Data Eng. Bull.,
//! 18(3), pp.19-29.

mod memo;
pub use memo::*;
mod optimizer;
pub use optimizer::*;
mod rule_queue;
pub use rule_queue::*;
