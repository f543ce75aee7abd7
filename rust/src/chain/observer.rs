//! Before/after notification hooks around every schedule edit.
//!
//! The schedule calls these synchronously, in the exact order edits are made.
//! Each mutated variable is wrapped by exactly one before/after pair.

use crate::models::TaskKey;

use super::schedule::Schedule;

/// Which part of a task an edit touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Variable {
    /// Predecessor link (decision variable).
    Link,
    /// Assigned server (derived from the chain anchor).
    Assignment,
    /// Wait estimate (derived by propagation).
    WaitEstimate,
    /// Raw duration (changed by prolong).
    Duration,
    /// Pinned flag and pickup time.
    Pinned,
}

/// Subscriber to schedule edits, e.g. an incremental score calculator.
#[allow(unused_variables)]
pub trait ChangeObserver {
    fn before_variable_changed(&mut self, schedule: &Schedule, task: TaskKey, variable: Variable) {}
    fn after_variable_changed(&mut self, schedule: &Schedule, task: TaskKey, variable: Variable) {}
    /// Called before the task exists in the schedule.
    fn before_entity_added(&mut self, schedule: &Schedule, task: TaskKey) {}
    fn after_entity_added(&mut self, schedule: &Schedule, task: TaskKey) {}
    fn before_entity_removed(&mut self, schedule: &Schedule, task: TaskKey) {}
    /// Called after the task is gone from the schedule.
    fn after_entity_removed(&mut self, schedule: &Schedule, task: TaskKey) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ChangeObserver for NoopObserver {}

/// A single recorded notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    BeforeVariable(TaskKey, Variable),
    AfterVariable(TaskKey, Variable),
    BeforeAdded(TaskKey),
    AfterAdded(TaskKey),
    BeforeRemoved(TaskKey),
    AfterRemoved(TaskKey),
}

/// Observer that records every notification in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingObserver {
    pub events: Vec<Notification>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks whose `variable` was written, in write order.
    pub fn writes_of(&self, variable: Variable) -> Vec<TaskKey> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Notification::AfterVariable(task, v) if *v == variable => Some(*task),
                _ => None,
            })
            .collect()
    }

    /// True when every `before` is immediately closed by its matching `after`.
    pub fn is_balanced(&self) -> bool {
        self.events.chunks(2).all(|pair| match pair {
            [Notification::BeforeVariable(a, x), Notification::AfterVariable(b, y)] => {
                a == b && x == y
            }
            [Notification::BeforeAdded(a), Notification::AfterAdded(b)] => a == b,
            [Notification::BeforeRemoved(a), Notification::AfterRemoved(b)] => a == b,
            _ => false,
        })
    }
}

impl ChangeObserver for RecordingObserver {
    fn before_variable_changed(&mut self, _: &Schedule, task: TaskKey, variable: Variable) {
        self.events.push(Notification::BeforeVariable(task, variable));
    }
    fn after_variable_changed(&mut self, _: &Schedule, task: TaskKey, variable: Variable) {
        self.events.push(Notification::AfterVariable(task, variable));
    }
    fn before_entity_added(&mut self, _: &Schedule, task: TaskKey) {
        self.events.push(Notification::BeforeAdded(task));
    }
    fn after_entity_added(&mut self, _: &Schedule, task: TaskKey) {
        self.events.push(Notification::AfterAdded(task));
    }
    fn before_entity_removed(&mut self, _: &Schedule, task: TaskKey) {
        self.events.push(Notification::BeforeRemoved(task));
    }
    fn after_entity_removed(&mut self, _: &Schedule, task: TaskKey) {
        self.events.push(Notification::AfterRemoved(task));
    }
}
