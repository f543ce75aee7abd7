//! Fan-out of schedule notifications to the score cache and external listeners.

use crate::chain::{ChangeObserver, Schedule, Variable};
use crate::models::TaskKey;

use super::cache::ScoreCache;
use super::constraints::HardSoftScore;

/// Listener that can travel to the worker thread.
pub type BoxedObserver = Box<dyn ChangeObserver + Send>;

/// Owns the incremental score and forwards every notification, in order, to
/// subscribed listeners after the cache has seen it.
#[derive(Default)]
pub struct ScoreDirector {
    cache: ScoreCache,
    listeners: Vec<BoxedObserver>,
}

impl ScoreDirector {
    pub fn new(schedule: &Schedule) -> Self {
        Self {
            cache: ScoreCache::new(schedule),
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: BoxedObserver) {
        self.listeners.push(listener);
    }

    pub fn score(&self) -> HardSoftScore {
        self.cache.score()
    }

    /// Rebuild the cache, e.g. after the schedule was replaced wholesale.
    pub fn reset(&mut self, schedule: &Schedule) {
        self.cache = ScoreCache::new(schedule);
    }
}

impl ChangeObserver for ScoreDirector {
    fn before_variable_changed(&mut self, schedule: &Schedule, task: TaskKey, variable: Variable) {
        self.cache.before_variable_changed(schedule, task, variable);
        for l in &mut self.listeners {
            l.before_variable_changed(schedule, task, variable);
        }
    }

    fn after_variable_changed(&mut self, schedule: &Schedule, task: TaskKey, variable: Variable) {
        self.cache.after_variable_changed(schedule, task, variable);
        for l in &mut self.listeners {
            l.after_variable_changed(schedule, task, variable);
        }
    }

    fn before_entity_added(&mut self, schedule: &Schedule, task: TaskKey) {
        self.cache.before_entity_added(schedule, task);
        for l in &mut self.listeners {
            l.before_entity_added(schedule, task);
        }
    }

    fn after_entity_added(&mut self, schedule: &Schedule, task: TaskKey) {
        self.cache.after_entity_added(schedule, task);
        for l in &mut self.listeners {
            l.after_entity_added(schedule, task);
        }
    }

    fn before_entity_removed(&mut self, schedule: &Schedule, task: TaskKey) {
        self.cache.before_entity_removed(schedule, task);
        for l in &mut self.listeners {
            l.before_entity_removed(schedule, task);
        }
    }

    fn after_entity_removed(&mut self, schedule: &Schedule, task: TaskKey) {
        self.cache.after_entity_removed(schedule, task);
        for l in &mut self.listeners {
            l.after_entity_removed(schedule, task);
        }
    }
}
