//! Evaluation: ranking test documents and reporting accuracy.
//!
//! [`DocEvaluator`] runs a ranker over a test stream, measures each
//! document ([`DocEvalResult`]), and accumulates [`GroupedEvalStats`]:
//! an aggregate [`EvalStats`] plus bucketed breakdowns by center offset
//! and true-cell population.

mod evaluator;
mod grouped;
mod stats;

pub use evaluator::{DocEvalResult, DocEvaluator, DocOutcome, NOT_FOUND_RANK};
pub use grouped::{BucketMap, GroupedEvalStats};
pub use stats::EvalStats;
