//! Scoring of a schedule with two representative constraints.
//!
//! The score is maintained incrementally by [`ScoreCache`], which subscribes
//! to the schedule's change notifications. [`calculate`] recomputes it from
//! scratch and must always agree with the cache.

mod cache;
mod constraints;
mod director;

pub use cache::ScoreCache;
pub use constraints::{
    calculate, missing_skills, task_contribution, waiting_time_penalty, HardSoftScore,
};
pub use director::{BoxedObserver, ScoreDirector};
