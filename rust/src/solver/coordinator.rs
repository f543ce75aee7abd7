//! Mutation coordinator: the concurrency boundary between the search loop
//! and externally submitted changes.
//!
//! Requesters push onto an unbounded multi-producer queue and return
//! immediately. The worker thread is the only writer of the working
//! schedule: before every search step it drains the queue and applies the
//! whole batch, so the search never scores a move against a schedule a
//! queued change has already invalidated.

use chrono::Utc;
use parking_lot::RwLock;
use std::cmp::Reverse;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::chain::Schedule;
use crate::changes::{ChangeOutcome, ProblemChange};
use crate::config::SolverConfig;
use crate::score::{BoxedObserver, HardSoftScore, ScoreDirector};
use crate::{log_changes, log_debug};

use super::search::{Search, StepOutcome};
use super::state::SolutionSnapshot;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Solver worker has stopped")]
    WorkerStopped,
    #[error("Solver worker panicked")]
    WorkerPanicked,
    #[error("Failed to spawn solver worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Commands sent to the worker.
#[derive(Debug)]
enum Command {
    Change(ProblemChange),
    /// Finish the current batch, then stop.
    Stop,
}

type SharedSnapshot = Arc<RwLock<Arc<SolutionSnapshot>>>;

/// Handle to a running solver.
pub struct MutationCoordinator {
    sender: UnboundedSender<Command>,
    snapshot: SharedSnapshot,
    worker: Option<JoinHandle<Schedule>>,
}

impl MutationCoordinator {
    /// Start solving `schedule` on a dedicated worker thread.
    pub fn start(
        schedule: Schedule,
        search: Box<dyn Search>,
        config: SolverConfig,
        listeners: Vec<BoxedObserver>,
    ) -> Result<Self, CoordinatorError> {
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut director = ScoreDirector::new(&schedule);
        for listener in listeners {
            director.subscribe(listener);
        }
        let initial = SolutionSnapshot::capture(&schedule, director.score(), true, 0);
        let snapshot: SharedSnapshot = Arc::new(RwLock::new(Arc::new(initial)));

        let worker = Worker {
            schedule,
            director,
            search,
            config,
            receiver,
            snapshot: Arc::clone(&snapshot),
            best: None,
            version: 0,
        };
        let handle = thread::Builder::new()
            .name("schedule-solver".to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            sender,
            snapshot,
            worker: Some(handle),
        })
    }

    /// Start with the built-in search and no extra listeners.
    pub fn start_default(schedule: Schedule, config: SolverConfig) -> Result<Self, CoordinatorError> {
        let search = super::search::HillClimbing::new(config.max_positions_per_step, config.verbosity);
        Self::start(schedule, Box::new(search), config, Vec::new())
    }

    /// Enqueue a change. Never blocks; there is no confirmation of whether it
    /// was applied or turned out stale, so poll the snapshot if that matters.
    pub fn submit_change(&self, change: ProblemChange) -> Result<(), CoordinatorError> {
        self.sender
            .send(Command::Change(change))
            .map_err(|_| CoordinatorError::WorkerStopped)
    }

    /// Most recently published best solution.
    pub fn current_best_snapshot(&self) -> Arc<SolutionSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn is_solving(&self) -> bool {
        self.current_best_snapshot().is_solving
    }

    /// Stop after every change submitted so far has been applied, and return
    /// the final working schedule.
    pub fn stop(mut self) -> Result<Schedule, CoordinatorError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<Schedule, CoordinatorError> {
        let handle = self.worker.take().ok_or(CoordinatorError::WorkerStopped)?;
        // A closed channel means the worker already exited; join reports why.
        let _ = self.sender.send(Command::Stop);
        handle.join().map_err(|_| CoordinatorError::WorkerPanicked)
    }
}

impl Drop for MutationCoordinator {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.shutdown();
        }
    }
}

/// State owned by the worker thread.
struct Worker {
    schedule: Schedule,
    director: ScoreDirector,
    search: Box<dyn Search>,
    config: SolverConfig,
    receiver: UnboundedReceiver<Command>,
    snapshot: SharedSnapshot,
    /// Quality of the published best: fewer unassigned tasks first, then score.
    best: Option<(Reverse<usize>, HardSoftScore)>,
    version: u64,
}

impl Worker {
    fn run(mut self) -> Schedule {
        let mut pending: Vec<Command> = Vec::new();
        let mut stopping = false;

        loop {
            // Drain point.
            loop {
                match self.receiver.try_recv() {
                    Ok(command) => pending.push(command),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        stopping = true;
                        break;
                    }
                }
            }
            if !pending.is_empty() {
                stopping |= self.apply_batch(std::mem::take(&mut pending));
            }
            if stopping {
                break;
            }

            let idle = match self.search.step(&mut self.schedule, &mut self.director) {
                Ok(StepOutcome::Idle) => true,
                Ok(_) => {
                    self.publish_if_better();
                    false
                }
                Err(e) => {
                    tracing::warn!(error = %e, "search step failed");
                    true
                }
            };
            if idle {
                // Nothing to do: sleep until the next command arrives.
                match self.receiver.blocking_recv() {
                    Some(command) => pending.push(command),
                    None => break,
                }
            }
        }

        self.publish(false);
        log_changes!(
            self.config.verbosity,
            score = %self.director.score(),
            "solver stopped"
        );
        self.schedule
    }

    /// Apply a whole batch of commands. Returns true when a stop was requested;
    /// the rest of the batch is still applied first.
    fn apply_batch(&mut self, batch: Vec<Command>) -> bool {
        log_debug!(self.config.verbosity, size = batch.len(), "draining change batch");
        let mut stop = false;
        let mut applied = 0usize;

        for command in batch {
            let change = match command {
                Command::Stop => {
                    stop = true;
                    continue;
                }
                Command::Change(change) => change,
            };
            let (id, kind) = (change.task_id().to_string(), change.kind());
            match change.apply(&mut self.schedule, &self.config, Utc::now(), &mut self.director) {
                Ok(ChangeOutcome::Applied) => applied += 1,
                Ok(ChangeOutcome::Stale) => {}
                Err(e) => tracing::warn!(task = %id, change = kind, error = %e, "change rejected"),
            }
        }

        debug_assert!(
            self.schedule.verify().is_ok(),
            "schedule invariants broken after change batch: {:?}",
            self.schedule.verify()
        );

        if applied > 0 {
            // The problem itself changed, so the old best no longer applies.
            self.search.problem_changed();
            self.best = None;
        }
        self.publish_if_better();
        stop
    }

    fn quality(&self) -> (Reverse<usize>, HardSoftScore) {
        (
            Reverse(self.schedule.unchained_tasks().len()),
            self.director.score(),
        )
    }

    fn publish_if_better(&mut self) {
        let quality = self.quality();
        if self.best.map_or(true, |best| quality > best) {
            self.best = Some(quality);
            let score = quality.1;
            log_changes!(self.config.verbosity, %score, "new best solution");
            self.publish(true);
        }
    }

    fn publish(&mut self, is_solving: bool) {
        self.version += 1;
        let snapshot = if is_solving || self.best.is_none() {
            SolutionSnapshot::capture(&self.schedule, self.director.score(), is_solving, self.version)
        } else {
            self.snapshot.read().republish(is_solving, self.version)
        };
        *self.snapshot.write() = Arc::new(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Server, Task};
    use chrono::Duration;

    fn servers() -> Schedule {
        Schedule::with_servers([Server::new("a", ["en"]), Server::new("b", ["en", "de"])]).unwrap()
    }

    #[test]
    fn test_changes_before_stop_are_applied() {
        let coordinator = MutationCoordinator::start_default(servers(), SolverConfig::default()).unwrap();
        for i in 0..5 {
            coordinator
                .submit_change(ProblemChange::AddTask(Task::new(
                    format!("c{i}"),
                    ["en"],
                    Duration::minutes(3),
                )))
                .unwrap();
        }
        coordinator
            .submit_change(ProblemChange::RemoveTask("c2".into()))
            .unwrap();

        let schedule = coordinator.stop().unwrap();
        assert_eq!(schedule.len(), 4);
        assert!(schedule.task_key("c2").is_none());
        schedule.verify().unwrap();
    }

    #[test]
    fn test_final_snapshot_not_solving() {
        let coordinator = MutationCoordinator::start_default(servers(), SolverConfig::default()).unwrap();
        assert!(coordinator.is_solving());
        coordinator
            .submit_change(ProblemChange::AddTask(Task::new("c1", ["de"], Duration::minutes(1))))
            .unwrap();

        let snapshot_handle = Arc::clone(&coordinator.snapshot);
        let schedule = coordinator.stop().unwrap();
        let last = snapshot_handle.read().clone();
        assert!(!last.is_solving);
        assert_eq!(schedule.len(), 1);
    }
}
