//! Live call-center scheduling over chained task assignments.
//!
//! Each server anchors a chain of tasks. Assignment and wait estimates are
//! derived by propagating forward along the chain. A single worker thread
//! owns the working schedule and applies externally queued changes between
//! search steps, publishing immutable snapshots for readers.

// Allow clippy warning triggered by PyO3 macro expansion
#![cfg_attr(feature = "python", allow(clippy::useless_conversion))]

pub mod chain;
pub mod changes;
pub mod config;
pub mod interner;
pub mod logging;
pub mod models;
#[cfg(feature = "python")]
mod python;
pub mod score;
pub mod snapshot;
pub mod solver;

pub use chain::{ChainError, ChangeObserver, InvariantViolation, Schedule, Variable};
pub use changes::{ChangeOutcome, ProblemChange};
pub use config::SolverConfig;
pub use models::{Link, Server, ServerKey, Task, TaskKey};
pub use score::{HardSoftScore, ScoreDirector};
pub use snapshot::{ScheduleRecord, SnapshotError};
pub use solver::{CoordinatorError, HillClimbing, MutationCoordinator, Search, SolutionSnapshot, StepOutcome};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// The switchboard Python module.
#[cfg(feature = "python")]
#[pymodule]
fn switchboard(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Config types
    m.add_class::<SolverConfig>()?;

    // Solver
    m.add_class::<python::PySolver>()?;

    Ok(())
}
