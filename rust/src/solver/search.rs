//! Search over chain orderings.
//!
//! The coordinator only depends on the [`Search`] trait. [`HillClimbing`] is
//! the built-in implementation: construction first, then improving moves.

use crate::chain::{ChainError, Schedule};
use crate::models::{Link, TaskKey};
use crate::score::{HardSoftScore, ScoreDirector};
use crate::{log_changes, log_checks};

/// Result of one search step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// An unassigned task was linked into a chain.
    Constructed(TaskKey),
    /// A move improved the score to the given value.
    Improved(HardSoftScore),
    /// No improving move exists for the current schedule.
    Idle,
}

/// A search strategy run by the coordinator's worker between drain points.
///
/// Every edit must go through `director` so the score stays incremental and
/// external listeners see each change.
pub trait Search: Send {
    fn step(
        &mut self,
        schedule: &mut Schedule,
        director: &mut ScoreDirector,
    ) -> Result<StepOutcome, ChainError>;

    /// Called after a batch of live changes was applied.
    fn problem_changed(&mut self) {}
}

/// First-fit construction followed by best-position change moves.
#[derive(Debug, Default, Clone)]
pub struct HillClimbing {
    /// Cap on candidate positions evaluated per task (None = all).
    pub max_positions: Option<usize>,
    pub verbosity: u8,
    cursor: usize,
}

impl HillClimbing {
    pub fn new(max_positions: Option<usize>, verbosity: u8) -> Self {
        Self {
            max_positions,
            verbosity,
            cursor: 0,
        }
    }

    /// Every place `task` could follow: each anchor, then each chained task.
    fn positions(&self, schedule: &Schedule, task: TaskKey) -> Vec<Link> {
        let mut positions: Vec<Link> = schedule
            .servers()
            .map(|(key, _)| Link::Anchor(key))
            .collect();
        positions.extend(
            schedule
                .task_keys()
                .into_iter()
                .filter(|&k| k != task && schedule.task(k).is_some_and(|t| t.is_chained()))
                .map(Link::Task),
        );
        if let Some(cap) = self.max_positions {
            positions.truncate(cap);
        }
        positions
    }

    /// Link the first movable unassigned task at its best position.
    fn construct(
        &mut self,
        schedule: &mut Schedule,
        director: &mut ScoreDirector,
    ) -> Result<Option<StepOutcome>, ChainError> {
        let Some(task) = schedule
            .unchained_tasks()
            .into_iter()
            .find(|&k| schedule.task(k).is_some_and(|t| !t.is_pinned()))
        else {
            return Ok(None);
        };

        let mut best: Option<(HardSoftScore, Link)> = None;
        for position in self.positions(schedule, task) {
            if !try_move(schedule, director, task, position)? {
                continue;
            }
            let score = director.score();
            if best.map_or(true, |(b, _)| score > b) {
                best = Some((score, position));
            }
            schedule.detach(task, director)?;
        }

        match best {
            Some((score, position)) => {
                schedule.move_after(task, position, director)?;
                log_changes!(
                    self.verbosity,
                    task = %schedule.describe(Link::Task(task)),
                    after = %schedule.describe(position),
                    %score,
                    "constructed"
                );
                Ok(Some(StepOutcome::Constructed(task)))
            }
            None => Ok(None),
        }
    }

    /// Find the best strictly improving position for `task`, leaving the
    /// schedule as it was.
    fn best_improvement(
        &self,
        schedule: &mut Schedule,
        director: &mut ScoreDirector,
        task: TaskKey,
    ) -> Result<Option<(HardSoftScore, Link)>, ChainError> {
        let Some(original) = schedule.task(task).and_then(|t| t.predecessor()) else {
            return Ok(None);
        };
        let current = director.score();
        let mut best: Option<(HardSoftScore, Link)> = None;

        for position in self.positions(schedule, task) {
            if position == original || !try_move(schedule, director, task, position)? {
                continue;
            }
            let score = director.score();
            log_checks!(
                self.verbosity,
                task = %schedule.describe(Link::Task(task)),
                after = %schedule.describe(position),
                %score,
                "evaluated move"
            );
            if score > current && best.map_or(true, |(b, _)| score > b) {
                best = Some((score, position));
            }
            schedule.move_after(task, original, director)?;
        }
        Ok(best)
    }
}

/// Apply a candidate move. Pinned or cyclic candidates are skipped, not errors.
fn try_move(
    schedule: &mut Schedule,
    director: &mut ScoreDirector,
    task: TaskKey,
    position: Link,
) -> Result<bool, ChainError> {
    match schedule.move_after(task, position, director) {
        Ok(moved) => Ok(moved),
        Err(ChainError::PinnedTask(_)) | Err(ChainError::InvalidLink { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

impl Search for HillClimbing {
    fn step(
        &mut self,
        schedule: &mut Schedule,
        director: &mut ScoreDirector,
    ) -> Result<StepOutcome, ChainError> {
        if let Some(outcome) = self.construct(schedule, director)? {
            return Ok(outcome);
        }

        let movable: Vec<TaskKey> = schedule
            .task_keys()
            .into_iter()
            .filter(|&k| schedule.task(k).is_some_and(|t| t.is_chained() && !t.is_pinned()))
            .collect();

        for offset in 0..movable.len() {
            let index = (self.cursor + offset) % movable.len();
            let task = movable[index];
            if let Some((score, position)) = self.best_improvement(schedule, director, task)? {
                schedule.move_after(task, position, director)?;
                self.cursor = index + 1;
                log_changes!(
                    self.verbosity,
                    task = %schedule.describe(Link::Task(task)),
                    after = %schedule.describe(position),
                    %score,
                    "improved"
                );
                return Ok(StepOutcome::Improved(score));
            }
        }

        self.cursor = 0;
        Ok(StepOutcome::Idle)
    }

    fn problem_changed(&mut self) {
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::NoopObserver;
    use crate::models::{Server, Task};
    use crate::score::calculate;
    use chrono::{Duration, Utc};

    fn run_until_idle(schedule: &mut Schedule, director: &mut ScoreDirector) -> usize {
        let mut search = HillClimbing::default();
        let mut steps = 0;
        while search.step(schedule, director).unwrap() != StepOutcome::Idle {
            steps += 1;
            assert!(steps < 1_000, "search did not settle");
        }
        steps
    }

    #[test]
    fn test_construction_respects_skills() {
        let mut schedule =
            Schedule::with_servers([Server::new("en-agent", ["en"]), Server::new("de-agent", ["de"])])
                .unwrap();
        for (id, skill) in [("c1", "de"), ("c2", "en"), ("c3", "de")] {
            schedule
                .insert_task(Task::new(id, [skill], Duration::minutes(5)), &mut NoopObserver)
                .unwrap();
        }
        let mut director = ScoreDirector::new(&schedule);
        run_until_idle(&mut schedule, &mut director);

        assert!(schedule.unchained_tasks().is_empty());
        assert_eq!(director.score(), calculate(&schedule));
        assert_eq!(director.score().hard, 0);

        let de = schedule.server_key("de-agent").unwrap();
        let c2 = schedule.task_key("c2").unwrap();
        assert_eq!(schedule.chain_of(de).count(), 2);
        assert_ne!(schedule.task(c2).unwrap().server(), Some(de));
        schedule.verify().unwrap();
    }

    #[test]
    fn test_improvement_balances_waits() {
        let mut schedule =
            Schedule::with_servers([Server::new("a", ["en"]), Server::new("b", ["en"])]).unwrap();
        let a = schedule.server_key("a").unwrap();
        for id in ["c1", "c2", "c3", "c4"] {
            let key = schedule
                .insert_task(Task::new(id, ["en"], Duration::minutes(10)), &mut NoopObserver)
                .unwrap();
            schedule.append(a, key, &mut NoopObserver).unwrap();
        }
        let mut director = ScoreDirector::new(&schedule);
        let before = director.score();

        run_until_idle(&mut schedule, &mut director);

        assert!(director.score() > before);
        assert_eq!(director.score(), calculate(&schedule));
        let b = schedule.server_key("b").unwrap();
        assert_eq!(schedule.chain_of(b).count(), 2);
        schedule.verify().unwrap();
    }

    #[test]
    fn test_pinned_tasks_stay_put() {
        let mut schedule =
            Schedule::with_servers([Server::new("a", ["en"]), Server::new("b", ["en"])]).unwrap();
        let a = schedule.server_key("a").unwrap();
        let mut keys = Vec::new();
        for id in ["c1", "c2", "c3"] {
            let key = schedule
                .insert_task(Task::new(id, ["en"], Duration::minutes(10)), &mut NoopObserver)
                .unwrap();
            schedule.append(a, key, &mut NoopObserver).unwrap();
            keys.push(key);
        }
        schedule.pin(keys[0], Utc::now(), &mut NoopObserver).unwrap();
        schedule.pin(keys[1], Utc::now(), &mut NoopObserver).unwrap();

        let mut director = ScoreDirector::new(&schedule);
        run_until_idle(&mut schedule, &mut director);

        assert_eq!(schedule.head_of(a), Some(keys[0]));
        assert_eq!(schedule.task(keys[1]).unwrap().predecessor(), Some(Link::Task(keys[0])));
        schedule.verify().unwrap();
    }

    #[test]
    fn test_idle_on_empty_schedule() {
        let mut schedule = Schedule::with_servers([Server::new("a", ["en"])]).unwrap();
        let mut director = ScoreDirector::new(&schedule);
        let mut search = HillClimbing::new(Some(4), 0);
        assert_eq!(
            search.step(&mut schedule, &mut director).unwrap(),
            StepOutcome::Idle
        );
    }
}
