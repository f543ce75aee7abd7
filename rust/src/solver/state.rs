//! Immutable solution snapshots handed to readers.

use serde::Serialize;

use crate::chain::Schedule;
use crate::score::HardSoftScore;
use crate::snapshot::ScheduleRecord;

/// Copy of the best known schedule at some point in time.
///
/// Never shares structure with the live working schedule, so readers can
/// hold it as long as they like.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionSnapshot {
    pub schedule: ScheduleRecord,
    pub score: HardSoftScore,
    pub is_solving: bool,
    /// Incremented on every publish.
    pub version: u64,
}

impl SolutionSnapshot {
    pub fn capture(schedule: &Schedule, score: HardSoftScore, is_solving: bool, version: u64) -> Self {
        Self {
            schedule: ScheduleRecord::capture(schedule),
            score,
            is_solving,
            version,
        }
    }

    /// Same content, republished under a new version and solving flag.
    pub fn republish(&self, is_solving: bool, version: u64) -> Self {
        Self {
            schedule: self.schedule.clone(),
            score: self.score,
            is_solving,
            version,
        }
    }

    pub fn task(&self, id: &str) -> Option<&crate::snapshot::TaskRecord> {
        self.schedule.tasks.iter().find(|t| t.id == id)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
