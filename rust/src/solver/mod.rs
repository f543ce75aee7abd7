//! Background solving with live problem changes.
//!
//! One worker thread owns the working schedule and alternates between
//! draining queued changes and running search steps. Readers only ever see
//! immutable snapshots.

mod coordinator;
mod search;
mod state;

pub use coordinator::{CoordinatorError, MutationCoordinator};
pub use search::{HillClimbing, Search, StepOutcome};
pub use state::SolutionSnapshot;
