//! Constraint functions and the hard/soft score type.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use crate::chain::Schedule;
use crate::models::{Task, TaskKey};

/// Two-level score: any hard improvement outranks every soft one.
///
/// Arithmetic saturates, so extreme waits bottom out instead of overflowing.
///
/// Field order matters: the derived `Ord` compares `hard` first.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct HardSoftScore {
    pub hard: i64,
    pub soft: i64,
}

impl HardSoftScore {
    pub const ZERO: HardSoftScore = HardSoftScore { hard: 0, soft: 0 };

    pub fn new(hard: i64, soft: i64) -> Self {
        Self { hard, soft }
    }

    /// No hard constraint is broken.
    pub fn is_feasible(&self) -> bool {
        self.hard >= 0
    }
}

impl Add for HardSoftScore {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.hard.saturating_add(rhs.hard), self.soft.saturating_add(rhs.soft))
    }
}

impl Sub for HardSoftScore {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.hard.saturating_sub(rhs.hard), self.soft.saturating_sub(rhs.soft))
    }
}

impl Neg for HardSoftScore {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(self.hard.saturating_neg(), self.soft.saturating_neg())
    }
}

impl AddAssign for HardSoftScore {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for HardSoftScore {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl fmt::Display for HardSoftScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}hard/{}soft", self.hard, self.soft)
    }
}

/// Running total of task contributions.
///
/// Sums exactly and clamps only when read, so the total depends on the
/// contributions alone and not on the order they were added and retracted.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct ScoreTotal {
    hard: i128,
    soft: i128,
}

impl ScoreTotal {
    pub(crate) fn add(&mut self, score: HardSoftScore) {
        self.hard += i128::from(score.hard);
        self.soft += i128::from(score.soft);
    }

    pub(crate) fn sub(&mut self, score: HardSoftScore) {
        self.hard -= i128::from(score.hard);
        self.soft -= i128::from(score.soft);
    }

    pub(crate) fn score(&self) -> HardSoftScore {
        let clamp = |v: i128| v.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64;
        HardSoftScore::new(clamp(self.hard), clamp(self.soft))
    }
}

/// Hard: number of required skills the assigned server lacks.
pub fn missing_skills(schedule: &Schedule, task: &Task) -> i64 {
    let Some(server) = task.server().and_then(|s| schedule.server(s)) else {
        return 0;
    };
    task.required_skills
        .iter()
        .filter(|skill| !server.skills.contains(*skill))
        .count() as i64
}

/// Soft: squared wait in seconds, so one long wait costs more than several short ones.
pub fn waiting_time_penalty(task: &Task) -> i64 {
    if !task.is_chained() {
        return 0;
    }
    let secs = task.wait_estimate().map_or(0, |w| w.num_seconds());
    secs.saturating_mul(secs)
}

/// Score contribution of a single task. Zero for tasks not in the schedule.
pub fn task_contribution(schedule: &Schedule, key: TaskKey) -> HardSoftScore {
    match schedule.task(key) {
        Some(task) => HardSoftScore::new(
            -missing_skills(schedule, task),
            -waiting_time_penalty(task),
        ),
        None => HardSoftScore::ZERO,
    }
}

/// Full recomputation over every task.
pub fn calculate(schedule: &Schedule) -> HardSoftScore {
    let mut total = ScoreTotal::default();
    for key in schedule.task_keys() {
        total.add(task_contribution(schedule, key));
    }
    total.score()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::NoopObserver;
    use crate::models::Server;
    use chrono::Duration;

    #[test]
    fn test_score_ordering_hard_first() {
        let worse_hard = HardSoftScore::new(-1, 0);
        let worse_soft = HardSoftScore::new(0, -1_000_000);
        assert!(worse_soft > worse_hard);
        assert!(HardSoftScore::ZERO > worse_soft);
    }

    #[test]
    fn test_arithmetic_saturates() {
        let floor = HardSoftScore::new(0, i64::MIN);
        assert_eq!(floor + HardSoftScore::new(0, -1), floor);
        let ceiling = HardSoftScore::new(0, i64::MAX);
        assert_eq!(ceiling - HardSoftScore::new(0, -1), ceiling);
        assert_eq!(-floor, HardSoftScore::new(0, i64::MAX));
    }

    #[test]
    fn test_huge_waits_do_not_overflow() {
        let mut schedule = Schedule::with_servers([Server::new("a", ["en"])]).unwrap();
        let server = schedule.server_key("a").unwrap();
        let huge = Duration::seconds(4_000_000_000_000_000);
        for id in ["c1", "c2", "c3"] {
            let key = schedule
                .insert_task(Task::new(id, ["en"], huge), &mut NoopObserver)
                .unwrap();
            schedule.append(server, key, &mut NoopObserver).unwrap();
        }
        assert_eq!(calculate(&schedule).soft, i64::MIN);
    }

    #[test]
    fn test_display() {
        assert_eq!(HardSoftScore::new(-2, -30).to_string(), "-2hard/-30soft");
    }

    #[test]
    fn test_missing_skills_and_wait_penalty() {
        let mut schedule = Schedule::with_servers([Server::new("a", ["en"])]).unwrap();
        let server = schedule.server_key("a").unwrap();
        let first = schedule
            .insert_task(Task::new("c1", ["en", "fr"], Duration::seconds(10)), &mut NoopObserver)
            .unwrap();
        let second = schedule
            .insert_task(Task::new("c2", ["en"], Duration::seconds(10)), &mut NoopObserver)
            .unwrap();

        // Unassigned tasks are not penalized.
        assert_eq!(calculate(&schedule), HardSoftScore::ZERO);

        schedule.append(server, first, &mut NoopObserver).unwrap();
        schedule.append(server, second, &mut NoopObserver).unwrap();

        assert_eq!(task_contribution(&schedule, first), HardSoftScore::new(-1, 0));
        assert_eq!(task_contribution(&schedule, second), HardSoftScore::new(0, -100));
        assert_eq!(calculate(&schedule), HardSoftScore::new(-1, -100));
        assert!(!calculate(&schedule).is_feasible());
    }
}
