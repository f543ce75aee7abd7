//! Incremental score cache driven by change notifications.
//!
//! Keeps each task's last contribution so a notification only has to
//! recompute the one task it names.

use rustc_hash::FxHashMap;

use crate::chain::{ChangeObserver, Schedule, Variable};
use crate::models::TaskKey;

use super::constraints::{task_contribution, HardSoftScore, ScoreTotal};

#[derive(Debug, Clone, Default)]
pub struct ScoreCache {
    /// Last known contribution per task.
    contributions: FxHashMap<TaskKey, HardSoftScore>,
    total: ScoreTotal,
}

impl ScoreCache {
    /// Build the cache from every task currently in the schedule.
    pub fn new(schedule: &Schedule) -> Self {
        let mut cache = Self::default();
        for key in schedule.task_keys() {
            cache.refresh(schedule, key);
        }
        cache
    }

    pub fn score(&self) -> HardSoftScore {
        self.total.score()
    }

    fn refresh(&mut self, schedule: &Schedule, key: TaskKey) {
        let fresh = task_contribution(schedule, key);
        if let Some(old) = self.contributions.insert(key, fresh) {
            self.total.sub(old);
        }
        self.total.add(fresh);
    }

    fn retract(&mut self, key: TaskKey) {
        if let Some(old) = self.contributions.remove(&key) {
            self.total.sub(old);
        }
    }
}

impl ChangeObserver for ScoreCache {
    fn after_variable_changed(&mut self, schedule: &Schedule, task: TaskKey, variable: Variable) {
        match variable {
            Variable::Assignment | Variable::WaitEstimate | Variable::Link => {
                self.refresh(schedule, task)
            }
            // Duration and pin state do not score on their own; the
            // propagation they trigger reports the tasks that change.
            Variable::Duration | Variable::Pinned => {}
        }
    }

    fn after_entity_added(&mut self, schedule: &Schedule, task: TaskKey) {
        self.refresh(schedule, task);
    }

    fn before_entity_removed(&mut self, _schedule: &Schedule, task: TaskKey) {
        self.retract(task);
    }
}
