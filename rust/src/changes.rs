//! Live problem changes applied to the working schedule.
//!
//! Each change is one atomic unit: it either applies completely, is rejected
//! with the schedule untouched, or finds its task gone and does nothing.
//! A vanished task is expected, since changes are queued while the search
//! keeps rewriting the schedule.

use chrono::{DateTime, Duration, Utc};

use crate::chain::{ChainError, ChangeObserver, Schedule};
use crate::config::SolverConfig;
use crate::models::Task;
use crate::{log_changes, log_checks};

/// An externally requested edit.
#[derive(Clone, Debug)]
pub enum ProblemChange {
    /// Insert a new, unassigned task. The search links it on a later move.
    AddTask(Task),
    /// Remove a task, splicing its successor onto its predecessor.
    RemoveTask(String),
    /// Lengthen a task by `extra`, or by the configured quantum when `None`.
    ProlongTask { id: String, extra: Option<Duration> },
    /// Freeze a task's position and stamp its pickup time.
    PinTask(String),
    /// Release a pinned task back to the search.
    UnpinTask(String),
}

/// What applying a change did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeOutcome {
    Applied,
    /// The referenced task no longer exists; nothing was changed.
    Stale,
}

impl ProblemChange {
    pub fn prolong(id: impl Into<String>) -> Self {
        ProblemChange::ProlongTask {
            id: id.into(),
            extra: None,
        }
    }

    /// Identity of the task this change targets.
    pub fn task_id(&self) -> &str {
        match self {
            ProblemChange::AddTask(task) => &task.id,
            ProblemChange::RemoveTask(id)
            | ProblemChange::ProlongTask { id, .. }
            | ProblemChange::PinTask(id)
            | ProblemChange::UnpinTask(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProblemChange::AddTask(_) => "add",
            ProblemChange::RemoveTask(_) => "remove",
            ProblemChange::ProlongTask { .. } => "prolong",
            ProblemChange::PinTask(_) => "pin",
            ProblemChange::UnpinTask(_) => "unpin",
        }
    }

    /// Apply this change to the schedule, running whatever propagation it needs.
    pub fn apply(
        self,
        schedule: &mut Schedule,
        config: &SolverConfig,
        now: DateTime<Utc>,
        observer: &mut dyn ChangeObserver,
    ) -> Result<ChangeOutcome, ChainError> {
        let kind = self.kind();
        let key = match self {
            ProblemChange::AddTask(task) => {
                let id = task.id.clone();
                schedule.insert_task(task, observer)?;
                log_changes!(config.verbosity, task = %id, "added task");
                return Ok(ChangeOutcome::Applied);
            }
            ref other => match schedule.task_key(other.task_id()) {
                Some(key) => key,
                None => {
                    log_checks!(
                        config.verbosity,
                        task = %other.task_id(),
                        change = kind,
                        "task no longer exists, change skipped"
                    );
                    return Ok(ChangeOutcome::Stale);
                }
            },
        };

        match &self {
            ProblemChange::AddTask(_) => {}
            ProblemChange::RemoveTask(_) => schedule.remove_task(key, observer)?,
            ProblemChange::ProlongTask { extra, .. } => {
                let extra = extra.unwrap_or_else(|| config.prolong_quantum());
                schedule.prolong(key, extra, observer)?;
            }
            ProblemChange::PinTask(_) => schedule.pin(key, now, observer)?,
            ProblemChange::UnpinTask(_) => schedule.unpin(key, observer)?,
        }
        log_changes!(config.verbosity, task = %self.task_id(), change = kind, "applied change");
        Ok(ChangeOutcome::Applied)
    }
}
