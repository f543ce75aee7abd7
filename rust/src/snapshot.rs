//! Serialized form of a schedule for snapshot transmission.
//!
//! Tasks are listed chain by chain, head to tail, followed by unassigned
//! tasks. Rebuilding re-derives successor links, assignments and wait
//! estimates from the predecessor links alone.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::{propagate_all, ChainError, InvariantViolation, NoopObserver, Schedule};
use crate::models::{Link, Server, Task, TaskKey};

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Unknown server reference: {0}")]
    UnknownServer(String),
    #[error("Unknown task reference: {0}")]
    UnknownTask(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Inconsistent(#[from] InvariantViolation),
    #[error("Invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{field} of {id} is out of range: {seconds}s")]
    OutOfRange {
        id: String,
        field: &'static str,
        seconds: i64,
    },
}

/// Whole-second duration from a serialized field, rejecting values chrono cannot hold.
fn parse_seconds(id: &str, field: &'static str, seconds: i64) -> Result<Duration, SnapshotError> {
    Duration::try_seconds(seconds).ok_or_else(|| SnapshotError::OutOfRange {
        id: id.to_string(),
        field,
        seconds,
    })
}

/// Predecessor reference: a server anchor or another task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum PredecessorRef {
    Server(String),
    Task(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub id: String,
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub lead_time_seconds: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub required_capabilities: Vec<String>,
    pub duration_seconds: i64,
    pub assigned_server_id: Option<String>,
    pub predecessor_id: Option<PredecessorRef>,
    pub wait_estimate_seconds: Option<i64>,
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picked_up_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub servers: Vec<ServerRecord>,
    pub tasks: Vec<TaskRecord>,
}

impl ScheduleRecord {
    /// Copy a schedule into its serialized form.
    pub fn capture(schedule: &Schedule) -> Self {
        let servers = schedule
            .servers()
            .map(|(_, s)| ServerRecord {
                id: s.id.clone(),
                capabilities: s.skills.iter().cloned().collect(),
                lead_time_seconds: s.lead_time.num_seconds(),
            })
            .collect();

        let mut order: Vec<TaskKey> = schedule
            .servers()
            .flat_map(|(key, _)| schedule.chain_of(key))
            .collect();
        order.extend(schedule.unchained_tasks());

        let tasks = order
            .into_iter()
            .filter_map(|key| schedule.task(key).map(|task| task_record(schedule, task)))
            .collect();

        Self { servers, tasks }
    }

    /// Rebuild a live schedule, re-deriving everything but the links.
    pub fn rebuild(&self) -> Result<Schedule, SnapshotError> {
        let mut schedule = Schedule::new();
        for record in &self.servers {
            let lead_time = parse_seconds(&record.id, "leadTimeSeconds", record.lead_time_seconds)?;
            let server = Server::new(record.id.clone(), record.capabilities.iter().cloned())
                .with_lead_time(lead_time);
            schedule.add_server(server)?;
        }

        let mut keys = Vec::with_capacity(self.tasks.len());
        for record in &self.tasks {
            let task = Task::new(
                record.id.clone(),
                record.required_capabilities.iter().cloned(),
                parse_seconds(&record.id, "durationSeconds", record.duration_seconds)?,
            );
            keys.push(schedule.insert_task(task, &mut NoopObserver)?);
        }

        for (record, key) in self.tasks.iter().zip(&keys) {
            let Some(pred) = &record.predecessor_id else {
                continue;
            };
            let link = match pred {
                PredecessorRef::Server(id) => Link::Anchor(
                    schedule
                        .server_key(id)
                        .ok_or_else(|| SnapshotError::UnknownServer(id.clone()))?,
                ),
                PredecessorRef::Task(id) => Link::Task(
                    schedule
                        .task_key(id)
                        .ok_or_else(|| SnapshotError::UnknownTask(id.clone()))?,
                ),
            };
            schedule.set_predecessor(*key, Some(link), &mut NoopObserver)?;
        }

        propagate_all(&mut schedule, &mut NoopObserver);

        for (record, key) in self.tasks.iter().zip(&keys) {
            if record.pinned {
                let at = record.picked_up_at.unwrap_or_else(Utc::now);
                schedule.pin(*key, at, &mut NoopObserver)?;
            }
        }

        schedule.verify()?;
        Ok(schedule)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }
}

fn task_record(schedule: &Schedule, task: &Task) -> TaskRecord {
    let predecessor_id = task.predecessor().map(|link| match link {
        Link::Anchor(s) => PredecessorRef::Server(
            schedule.server(s).map(|s| s.id.clone()).unwrap_or_default(),
        ),
        Link::Task(t) => {
            PredecessorRef::Task(schedule.task(t).map(|t| t.id.clone()).unwrap_or_default())
        }
    });
    TaskRecord {
        id: task.id.clone(),
        required_capabilities: task.required_skills.iter().cloned().collect(),
        duration_seconds: task.duration().num_seconds(),
        assigned_server_id: task
            .server()
            .and_then(|s| schedule.server(s))
            .map(|s| s.id.clone()),
        predecessor_id,
        wait_estimate_seconds: task.wait_estimate().map(|w| w.num_seconds()),
        pinned: task.is_pinned(),
        picked_up_at: task.picked_up_at(),
    }
}
