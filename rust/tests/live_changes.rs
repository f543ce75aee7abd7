//! End-to-end changes through a running coordinator.

use std::thread;
use std::time::{Duration as StdDuration, Instant};

use chrono::{Duration, Utc};
use switchboard::chain::NoopObserver;
use switchboard::chain::Schedule;
use switchboard::changes::ProblemChange;
use switchboard::config::SolverConfig;
use switchboard::models::{Server, Task};
use switchboard::snapshot::ScheduleRecord;
use switchboard::solver::{MutationCoordinator, SolutionSnapshot};

fn agents() -> Schedule {
    Schedule::with_servers([
        Server::new("anna", ["en", "fr"]),
        Server::new("bert", ["en", "de"]),
        Server::new("carl", ["de"]).with_lead_time(Duration::seconds(20)),
    ])
    .unwrap()
}

fn call(id: &str, skill: &str, secs: i64) -> ProblemChange {
    ProblemChange::AddTask(Task::new(id, [skill], Duration::seconds(secs)))
}

/// Poll published snapshots until `done` holds.
fn wait_for(
    coordinator: &MutationCoordinator,
    done: impl Fn(&SolutionSnapshot) -> bool,
) -> std::sync::Arc<SolutionSnapshot> {
    let deadline = Instant::now() + StdDuration::from_secs(10);
    loop {
        let snapshot = coordinator.current_best_snapshot();
        if done(&snapshot) {
            return snapshot;
        }
        assert!(Instant::now() < deadline, "timed out waiting for snapshot");
        thread::sleep(StdDuration::from_millis(5));
    }
}

fn all_assigned(snapshot: &SolutionSnapshot, count: usize) -> bool {
    snapshot.schedule.tasks.len() == count
        && snapshot
            .schedule
            .tasks
            .iter()
            .all(|t| t.assigned_server_id.is_some())
}

#[test]
fn added_calls_get_assigned() {
    let coordinator = MutationCoordinator::start_default(agents(), SolverConfig::default()).unwrap();
    for (id, skill) in [("c1", "en"), ("c2", "de"), ("c3", "fr"), ("c4", "de")] {
        coordinator.submit_change(call(id, skill, 120)).unwrap();
    }

    let snapshot = wait_for(&coordinator, |s| all_assigned(s, 4));
    assert!(snapshot.is_solving);
    assert_eq!(snapshot.task("c3").unwrap().assigned_server_id.as_deref(), Some("anna"));

    let schedule = coordinator.stop().unwrap();
    schedule.verify().unwrap();
    assert!(schedule.unchained_tasks().is_empty());
}

#[test]
fn concurrent_submitters_are_all_applied() {
    let coordinator = MutationCoordinator::start_default(agents(), SolverConfig::default()).unwrap();

    thread::scope(|scope| {
        for worker in 0..4 {
            let coordinator = &coordinator;
            scope.spawn(move || {
                for i in 0..10 {
                    let id = format!("w{worker}-c{i}");
                    coordinator.submit_change(call(&id, "en", 30 + i)).unwrap();
                    if i % 3 == 0 {
                        coordinator.submit_change(ProblemChange::prolong(id)).unwrap();
                    }
                }
            });
        }
    });

    let schedule = coordinator.stop().unwrap();
    assert_eq!(schedule.len(), 40);
    schedule.verify().unwrap();

    let prolonged = schedule.task(schedule.task_key("w2-c3").unwrap()).unwrap();
    assert_eq!(prolonged.duration(), Duration::seconds(33 + 60));
}

#[test]
fn removing_twice_is_harmless() {
    let coordinator = MutationCoordinator::start_default(agents(), SolverConfig::default()).unwrap();
    for id in ["c1", "c2", "c3"] {
        coordinator.submit_change(call(id, "en", 60)).unwrap();
    }
    coordinator.submit_change(ProblemChange::RemoveTask("c2".into())).unwrap();
    coordinator.submit_change(ProblemChange::RemoveTask("c2".into())).unwrap();
    coordinator.submit_change(ProblemChange::prolong("c2")).unwrap();

    let schedule = coordinator.stop().unwrap();
    assert_eq!(schedule.len(), 2);
    assert!(schedule.task_key("c2").is_none());
    schedule.verify().unwrap();
}

#[test]
fn pinned_call_keeps_its_agent() {
    let coordinator = MutationCoordinator::start_default(agents(), SolverConfig::default()).unwrap();
    coordinator.submit_change(call("c1", "de", 300)).unwrap();
    let before = wait_for(&coordinator, |s| all_assigned(s, 1));
    let agent = before.task("c1").unwrap().assigned_server_id.clone();

    coordinator.submit_change(ProblemChange::PinTask("c1".into())).unwrap();
    for i in 0..6 {
        coordinator.submit_change(call(&format!("d{i}"), "de", 240)).unwrap();
    }
    let after = wait_for(&coordinator, |s| {
        all_assigned(s, 7) && s.task("c1").is_some_and(|t| t.pinned)
    });
    let pinned = after.task("c1").unwrap();
    assert_eq!(pinned.assigned_server_id, agent);
    assert!(pinned.picked_up_at.is_some());

    coordinator.stop().unwrap().verify().unwrap();
}

#[test]
fn solving_resumes_from_a_snapshot() {
    let coordinator = MutationCoordinator::start_default(agents(), SolverConfig::default()).unwrap();
    for (id, skill) in [("c1", "en"), ("c2", "de"), ("c3", "en")] {
        coordinator.submit_change(call(id, skill, 90)).unwrap();
    }
    wait_for(&coordinator, |s| all_assigned(s, 3));
    let json = coordinator.current_best_snapshot().schedule.to_json().unwrap();
    coordinator.stop().unwrap();

    let schedule = ScheduleRecord::from_json(&json).unwrap().rebuild().unwrap();
    let resumed = MutationCoordinator::start_default(schedule, SolverConfig::default()).unwrap();
    resumed.submit_change(ProblemChange::RemoveTask("c1".into())).unwrap();

    let last = resumed.stop().unwrap();
    assert_eq!(last.len(), 2);
    last.verify().unwrap();
}

#[test]
fn initial_snapshot_is_published_on_start() {
    let coordinator = MutationCoordinator::start_default(agents(), SolverConfig::default()).unwrap();
    let snapshot = coordinator.current_best_snapshot();
    coordinator.stop().unwrap();
    assert!(snapshot.is_solving);
    assert_eq!(snapshot.version, 0);
}

#[test]
fn huge_durations_do_not_kill_the_worker() {
    let schedule = Schedule::with_servers([Server::new("anna", ["en"])]).unwrap();
    let coordinator = MutationCoordinator::start_default(schedule, SolverConfig::default()).unwrap();
    let huge = 4_000_000_000_000_000;
    for id in ["c1", "c2", "c3"] {
        coordinator.submit_change(call(id, "en", huge)).unwrap();
    }
    wait_for(&coordinator, |s| all_assigned(s, 3));

    coordinator
        .submit_change(ProblemChange::ProlongTask {
            id: "c1".into(),
            extra: Some(Duration::MAX),
        })
        .unwrap();
    coordinator.submit_change(call("c4", "en", 60)).unwrap();

    let schedule = coordinator.stop().unwrap();
    assert_eq!(schedule.len(), 4);
    let c1 = schedule.task(schedule.task_key("c1").unwrap()).unwrap();
    assert_eq!(c1.duration(), Duration::seconds(huge));
    schedule.verify().unwrap();
}

#[test]
fn remove_in_front_of_pinned_call_succeeds_after_unpin() {
    let mut schedule = agents();
    let anna = schedule.server_key("anna").unwrap();
    for id in ["done", "live"] {
        let key = schedule
            .insert_task(Task::new(id, ["fr"], Duration::seconds(60)), &mut NoopObserver)
            .unwrap();
        schedule.append(anna, key, &mut NoopObserver).unwrap();
    }
    let live = schedule.task_key("live").unwrap();
    schedule.pin(live, Utc::now(), &mut NoopObserver).unwrap();

    let coordinator = MutationCoordinator::start_default(schedule, SolverConfig::default()).unwrap();
    coordinator.submit_change(ProblemChange::RemoveTask("done".into())).unwrap();
    coordinator.submit_change(call("marker", "de", 1)).unwrap();
    wait_for(&coordinator, |s| s.task("marker").is_some());
    assert!(coordinator.current_best_snapshot().task("done").is_some());

    coordinator.submit_change(ProblemChange::UnpinTask("live".into())).unwrap();
    coordinator.submit_change(ProblemChange::RemoveTask("done".into())).unwrap();

    let schedule = coordinator.stop().unwrap();
    assert!(schedule.task_key("done").is_none());
    let live = schedule.task(schedule.task_key("live").unwrap()).unwrap();
    assert!(!live.is_pinned());
    assert!(live.is_chained());
    schedule.verify().unwrap();
}
