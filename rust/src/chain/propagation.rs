//! Forward propagation of derived timing values along a chain suffix.
//!
//! Recomputation starts at the first structurally changed task and walks
//! successors to the tail. Everything upstream is already correct, so the
//! cost is the length of the affected suffix, not of the chain.

use chrono::Duration;

use crate::models::{Link, ServerKey, TaskKey};

use super::observer::{ChangeObserver, Variable};
use super::schedule::Schedule;

/// Derived values a task inherits from its predecessor.
///
/// Behind an anchor: the anchor itself and its queued lead time (null when
/// nothing is queued). Behind a task: that task's server and completion.
///
/// Panics when the predecessor does not exist or has no server; both mean a
/// chain was left broken by an earlier edit.
pub fn derive_from(schedule: &Schedule, predecessor: Link) -> (ServerKey, Option<Duration>) {
    match predecessor {
        Link::Anchor(server_key) => {
            let server = schedule
                .server(server_key)
                .unwrap_or_else(|| panic!("chain anchored at missing {server_key:?}"));
            (server_key, server.queued_lead_time())
        }
        Link::Task(task_key) => {
            let pred = schedule
                .task(task_key)
                .unwrap_or_else(|| panic!("chain links to missing {task_key:?}"));
            let server = pred
                .server()
                .unwrap_or_else(|| panic!("predecessor {} has no server", pred.id));
            (server, Some(pred.completion()))
        }
    }
}

/// Recompute assignment and wait estimate from `start` to the tail.
///
/// Each write is wrapped by its own before/after notification so observers
/// see every intermediate value. Returns the number of tasks visited.
pub fn propagate_from(
    schedule: &mut Schedule,
    start: TaskKey,
    observer: &mut dyn ChangeObserver,
) -> usize {
    let limit = schedule.len();
    let mut current = Some(start);
    let mut visited = 0;

    while let Some(key) = current {
        visited += 1;
        assert!(
            visited <= limit,
            "propagation from {start:?} walked past {limit} tasks: chain has a cycle"
        );
        let Some(task) = schedule.task(key) else {
            panic!("propagation reached missing {key:?}");
        };
        let (server, wait) = match task.predecessor() {
            Some(link) => {
                let (server, wait) = derive_from(schedule, link);
                (Some(server), wait)
            }
            None => (None, None),
        };
        let next = task.successor();

        observer.before_variable_changed(schedule, key, Variable::Assignment);
        if let Some(t) = schedule.task_mut(key) {
            t.server = server;
        }
        observer.after_variable_changed(schedule, key, Variable::Assignment);

        observer.before_variable_changed(schedule, key, Variable::WaitEstimate);
        if let Some(t) = schedule.task_mut(key) {
            t.wait_estimate = wait;
        }
        observer.after_variable_changed(schedule, key, Variable::WaitEstimate);

        current = next;
    }
    visited
}

/// Recompute every chain from its head. Used after bulk rebuilds.
pub fn propagate_all(schedule: &mut Schedule, observer: &mut dyn ChangeObserver) {
    let heads: Vec<TaskKey> = schedule
        .servers()
        .filter_map(|(key, _)| schedule.head_of(key))
        .collect();
    for head in heads {
        propagate_from(schedule, head, observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::observer::{NoopObserver, RecordingObserver};
    use crate::models::{Server, Task};

    fn minutes(m: i64) -> Duration {
        Duration::minutes(m)
    }

    /// Link tasks with raw edits only, leaving estimates unset.
    fn raw_chain(lead: i64, durations: &[i64]) -> (Schedule, ServerKey, Vec<TaskKey>) {
        let mut schedule =
            Schedule::with_servers([Server::new("s", ["en"]).with_lead_time(minutes(lead))])
                .unwrap();
        let server = schedule.server_key("s").unwrap();
        let mut prev = Link::Anchor(server);
        let mut keys = Vec::new();
        for (i, d) in durations.iter().enumerate() {
            let key = schedule
                .insert_task(Task::new(format!("t{i}"), ["en"], minutes(*d)), &mut NoopObserver)
                .unwrap();
            schedule
                .set_predecessor(key, Some(prev), &mut NoopObserver)
                .unwrap();
            prev = Link::Task(key);
            keys.push(key);
        }
        (schedule, server, keys)
    }

    #[test]
    fn test_set_predecessor_alone_does_not_propagate() {
        let (schedule, _, keys) = raw_chain(0, &[10, 20]);
        assert_eq!(schedule.task(keys[1]).unwrap().wait_estimate(), None);
        assert!(schedule.verify().is_err());
    }

    #[test]
    fn test_propagate_from_head() {
        let (mut schedule, server, keys) = raw_chain(0, &[10, 20, 30]);
        let visited = propagate_from(&mut schedule, keys[0], &mut NoopObserver);
        assert_eq!(visited, 3);

        let waits: Vec<_> = keys
            .iter()
            .map(|k| schedule.task(*k).unwrap().wait_estimate())
            .collect();
        assert_eq!(waits, vec![None, Some(minutes(10)), Some(minutes(30))]);
        assert!(keys
            .iter()
            .all(|k| schedule.task(*k).unwrap().server() == Some(server)));
        schedule.verify().unwrap();
    }

    #[test]
    fn test_lead_time_seeds_head() {
        let (mut schedule, _, keys) = raw_chain(4, &[10, 20]);
        propagate_all(&mut schedule, &mut NoopObserver);
        assert_eq!(
            schedule.task(keys[0]).unwrap().wait_estimate(),
            Some(minutes(4))
        );
        assert_eq!(
            schedule.task(keys[1]).unwrap().wait_estimate(),
            Some(minutes(14))
        );
    }

    #[test]
    fn test_propagation_only_visits_suffix() {
        let (mut schedule, _, keys) = raw_chain(0, &[1, 2, 3, 4]);
        propagate_all(&mut schedule, &mut NoopObserver);

        let mut recorder = RecordingObserver::new();
        let visited = propagate_from(&mut schedule, keys[2], &mut recorder);
        assert_eq!(visited, 2);
        assert_eq!(
            recorder.writes_of(Variable::WaitEstimate),
            vec![keys[2], keys[3]]
        );
        assert!(recorder.is_balanced());
    }

    #[test]
    fn test_derive_from_task() {
        let (mut schedule, server, keys) = raw_chain(0, &[10]);
        propagate_all(&mut schedule, &mut NoopObserver);
        assert_eq!(
            derive_from(&schedule, Link::Task(keys[0])),
            (server, Some(minutes(10)))
        );
        assert_eq!(derive_from(&schedule, Link::Anchor(server)), (server, None));
    }
}
