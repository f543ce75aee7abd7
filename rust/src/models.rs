//! Core data types for the chain-structured assignment model.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;

/// Truncate to whole seconds, the precision of the serialized form.
pub fn whole_seconds(duration: Duration) -> Duration {
    Duration::try_seconds(duration.num_seconds()).unwrap_or(duration)
}

/// Dense integer key addressing a node in the schedule arena.
pub trait ArenaKey: Copy + Eq + std::hash::Hash {
    fn from_index(index: u32) -> Self;
    fn index(self) -> u32;
}

/// Stable arena key of a task (call).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey(u32);

/// Stable arena key of a server (agent).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerKey(u32);

impl ArenaKey for TaskKey {
    fn from_index(index: u32) -> Self {
        TaskKey(index)
    }
    fn index(self) -> u32 {
        self.0
    }
}

impl ArenaKey for ServerKey {
    fn from_index(index: u32) -> Self {
        ServerKey(index)
    }
    fn index(self) -> u32 {
        self.0
    }
}

/// Predecessor of a task: either the server anchoring the chain or another task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Link {
    Anchor(ServerKey),
    Task(TaskKey),
}

/// A server (agent): the fixed head of exactly one chain.
#[derive(Clone, Debug)]
pub struct Server {
    pub id: String,
    pub skills: BTreeSet<String>,
    /// Time the server is already busy before its first queued task can start.
    pub lead_time: Duration,
    pub(crate) first: Option<TaskKey>,
}

impl Server {
    pub fn new<I, S>(id: impl Into<String>, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            skills: skills.into_iter().map(Into::into).collect(),
            lead_time: Duration::zero(),
            first: None,
        }
    }

    /// Sub-second parts are dropped.
    pub fn with_lead_time(mut self, lead_time: Duration) -> Self {
        self.lead_time = whole_seconds(lead_time);
        self
    }

    /// First task in this server's chain.
    pub fn first(&self) -> Option<TaskKey> {
        self.first
    }

    /// Lead time as the head estimate: zero means nothing is queued.
    pub fn queued_lead_time(&self) -> Option<Duration> {
        (self.lead_time > Duration::zero()).then_some(self.lead_time)
    }
}

/// A task (call) waiting to be handled by a server.
///
/// Link and derived fields are only written through the schedule, which keeps
/// them consistent.
#[derive(Clone, Debug)]
pub struct Task {
    pub id: String,
    pub required_skills: BTreeSet<String>,
    pub(crate) duration: Duration,
    pub(crate) predecessor: Option<Link>,
    pub(crate) successor: Option<TaskKey>,
    pub(crate) server: Option<ServerKey>,
    pub(crate) wait_estimate: Option<Duration>,
    pub(crate) pinned: bool,
    pub(crate) picked_up_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create an unassigned task. Sub-second parts of `duration` are dropped.
    pub fn new<I, S>(id: impl Into<String>, required_skills: I, duration: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            required_skills: required_skills.into_iter().map(Into::into).collect(),
            duration: whole_seconds(duration),
            predecessor: None,
            successor: None,
            server: None,
            wait_estimate: None,
            pinned: false,
            picked_up_at: None,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn predecessor(&self) -> Option<Link> {
        self.predecessor
    }

    pub fn successor(&self) -> Option<TaskKey> {
        self.successor
    }

    /// Server anchoring this task's chain (derived).
    pub fn server(&self) -> Option<ServerKey> {
        self.server
    }

    /// Cumulative delay before this task begins (derived).
    pub fn wait_estimate(&self) -> Option<Duration> {
        self.wait_estimate
    }

    /// When this task will be finished, counted from now. Saturates at
    /// `Duration::MAX`.
    pub fn completion(&self) -> Duration {
        self.wait_estimate
            .unwrap_or_else(Duration::zero)
            .checked_add(&self.duration)
            .unwrap_or(Duration::MAX)
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    pub fn picked_up_at(&self) -> Option<DateTime<Utc>> {
        self.picked_up_at
    }

    pub fn is_chained(&self) -> bool {
        self.predecessor.is_some()
    }
}
