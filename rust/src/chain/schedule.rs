//! Chain model: arena of servers and tasks linked into per-server chains.

use chrono::{DateTime, Duration, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::interner::IdInterner;
use crate::models::{whole_seconds, ArenaKey, Link, Server, ServerKey, Task, TaskKey};

use super::observer::{ChangeObserver, Variable};
use super::propagation::propagate_from;

/// Errors that reject a structural edit. The schedule is unchanged when one is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Invalid link: {task} cannot follow {predecessor}")]
    InvalidLink { task: String, predecessor: String },
    #[error("Task is pinned: {0}")]
    PinnedTask(String),
    #[error("Unknown task: {0:?}")]
    UnknownTask(TaskKey),
    #[error("Unknown server: {0:?}")]
    UnknownServer(ServerKey),
    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),
    #[error("Duplicate server id: {0}")]
    DuplicateServer(String),
    #[error("Duration of {0} would overflow")]
    DurationOverflow(String),
}

/// A structural invariant does not hold.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invariant violated: {0}")]
pub struct InvariantViolation(pub String);

/// The working schedule: servers anchoring chains of tasks.
///
/// Links are arena keys, never references. Every edit is reported to the
/// supplied observer; structural edits followed by propagation keep the
/// derived values (assignment, wait estimate) consistent.
#[derive(Clone, Debug, Default)]
pub struct Schedule {
    servers: Vec<Server>,
    server_ids: IdInterner<ServerKey>,
    tasks: FxHashMap<TaskKey, Task>,
    task_ids: IdInterner<TaskKey>,
}

/// Restartable walk over one server's chain, head to tail.
#[derive(Clone)]
pub struct Chain<'a> {
    schedule: &'a Schedule,
    next: Option<TaskKey>,
    remaining: usize,
}

impl Iterator for Chain<'_> {
    type Item = TaskKey;

    fn next(&mut self) -> Option<TaskKey> {
        let key = self.next?;
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.next = self.schedule.task(key).and_then(|t| t.successor);
        Some(key)
    }
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a schedule with the given servers and no tasks.
    pub fn with_servers(servers: impl IntoIterator<Item = Server>) -> Result<Self, ChainError> {
        let mut schedule = Self::new();
        for server in servers {
            schedule.add_server(server)?;
        }
        Ok(schedule)
    }

    /// Register a server as the anchor of a new, empty chain.
    pub fn add_server(&mut self, mut server: Server) -> Result<ServerKey, ChainError> {
        if self.server_ids.get(&server.id).is_some() {
            return Err(ChainError::DuplicateServer(server.id));
        }
        let key = self.server_ids.intern(&server.id);
        server.first = None;
        self.servers.push(server);
        Ok(key)
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn server(&self, key: ServerKey) -> Option<&Server> {
        self.servers.get(key_index(key))
    }

    pub fn servers(&self) -> impl Iterator<Item = (ServerKey, &Server)> + '_ {
        self.servers
            .iter()
            .enumerate()
            .map(|(i, s)| (server_key_at(i), s))
    }

    pub fn server_key(&self, id: &str) -> Option<ServerKey> {
        self.server_ids.get(id)
    }

    pub fn task(&self, key: TaskKey) -> Option<&Task> {
        self.tasks.get(&key)
    }

    /// Key of a live task by identity.
    pub fn task_key(&self, id: &str) -> Option<TaskKey> {
        self.task_ids.get(id).filter(|k| self.tasks.contains_key(k))
    }

    /// Live task keys in creation order.
    pub fn task_keys(&self) -> Vec<TaskKey> {
        let mut keys: Vec<TaskKey> = self.tasks.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Tasks with no predecessor, in creation order.
    pub fn unchained_tasks(&self) -> Vec<TaskKey> {
        let mut keys: Vec<TaskKey> = self
            .tasks
            .iter()
            .filter(|(_, t)| !t.is_chained())
            .map(|(k, _)| *k)
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Successor of a node (server anchor or task).
    pub fn successor(&self, node: Link) -> Option<TaskKey> {
        match node {
            Link::Anchor(s) => self.server(s).and_then(|s| s.first),
            Link::Task(t) => self.task(t).and_then(|t| t.successor),
        }
    }

    /// First task in a server's chain.
    pub fn head_of(&self, server: ServerKey) -> Option<TaskKey> {
        self.server(server).and_then(|s| s.first)
    }

    /// Lazy walk of a server's chain. Finite even on a corrupted chain.
    pub fn chain_of(&self, server: ServerKey) -> Chain<'_> {
        Chain {
            schedule: self,
            next: self.head_of(server),
            remaining: self.tasks.len(),
        }
    }

    /// Last node of a server's chain: its tail task, or the anchor when empty.
    pub fn tail_of(&self, server: ServerKey) -> Link {
        self.chain_of(server)
            .last()
            .map_or(Link::Anchor(server), Link::Task)
    }

    /// Follow predecessor links up to the anchor. `None` for unchained tasks.
    pub fn anchor_of(&self, task: TaskKey) -> Option<ServerKey> {
        let mut current = self.task(task)?.predecessor;
        for _ in 0..=self.tasks.len() {
            match current? {
                Link::Anchor(s) => return Some(s),
                Link::Task(t) => current = self.task(t)?.predecessor,
            }
        }
        None
    }

    /// Human-readable identity of a node for error messages.
    pub fn describe(&self, link: Link) -> String {
        match link {
            Link::Anchor(s) => self
                .server(s)
                .map_or_else(|| format!("{s:?}"), |s| format!("server {}", s.id)),
            Link::Task(t) => self
                .task(t)
                .map_or_else(|| format!("{t:?}"), |t| format!("task {}", t.id)),
        }
    }

    pub(super) fn task_mut(&mut self, key: TaskKey) -> Option<&mut Task> {
        self.tasks.get_mut(&key)
    }

    fn require(&self, key: TaskKey) -> Result<&Task, ChainError> {
        self.task(key).ok_or(ChainError::UnknownTask(key))
    }

    fn require_unpinned(&self, key: TaskKey) -> Result<&Task, ChainError> {
        let task = self.require(key)?;
        if task.pinned {
            return Err(ChainError::PinnedTask(task.id.clone()));
        }
        Ok(task)
    }

    // ------------------------------------------------------------------
    // Primitive link edit
    // ------------------------------------------------------------------

    /// Point `task` at a new predecessor (or unlink it with `None`).
    ///
    /// Keeps back-references symmetric for `task` itself: the old predecessor
    /// stops pointing at it and the new one does. A task displaced from the
    /// new predecessor is left for the caller to relink. Does not propagate.
    pub fn set_predecessor(
        &mut self,
        task: TaskKey,
        new_pred: Option<Link>,
        observer: &mut dyn ChangeObserver,
    ) -> Result<(), ChainError> {
        let current = self.require_unpinned(task)?.predecessor;
        if current == new_pred {
            return Ok(());
        }
        if let Some(link) = new_pred {
            self.check_link(task, link)?;
        }
        self.relink(task, new_pred, observer);
        Ok(())
    }

    /// Reject links to unknown nodes, to the task itself, or into its own
    /// descendants.
    fn check_link(&self, task: TaskKey, link: Link) -> Result<(), ChainError> {
        let target = match link {
            Link::Anchor(s) => {
                return match self.server(s) {
                    Some(_) => Ok(()),
                    None => Err(ChainError::UnknownServer(s)),
                }
            }
            Link::Task(t) => t,
        };
        self.require(target)?;

        let invalid = || ChainError::InvalidLink {
            task: self.describe(Link::Task(task)),
            predecessor: self.describe(link),
        };
        if target == task {
            return Err(invalid());
        }
        let mut next = self.require(task)?.successor;
        let mut steps = 0;
        while let Some(key) = next {
            if key == target {
                return Err(invalid());
            }
            steps += 1;
            assert!(
                steps <= self.tasks.len(),
                "successor walk from {:?} exceeded {} tasks",
                task,
                self.tasks.len()
            );
            next = self.task(key).and_then(|t| t.successor);
        }
        Ok(())
    }

    /// Unchecked link write with notifications.
    fn relink(&mut self, task: TaskKey, new_pred: Option<Link>, observer: &mut dyn ChangeObserver) {
        let old_pred = self.task(task).and_then(|t| t.predecessor);

        observer.before_variable_changed(self, task, Variable::Link);
        if let Some(old) = old_pred {
            if self.successor(old) == Some(task) {
                self.set_successor(old, None);
            }
        }
        if let Some(new) = new_pred {
            self.set_successor(new, Some(task));
        }
        if let Some(t) = self.task_mut(task) {
            t.predecessor = new_pred;
        }
        observer.after_variable_changed(self, task, Variable::Link);
    }

    fn set_successor(&mut self, node: Link, successor: Option<TaskKey>) {
        match node {
            Link::Anchor(s) => {
                if let Some(server) = self.servers.get_mut(key_index(s)) {
                    server.first = successor;
                }
            }
            Link::Task(t) => {
                if let Some(task) = self.task_mut(t) {
                    task.successor = successor;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Composite edits
    // ------------------------------------------------------------------

    /// Insert a new, unchained task. Any links on `task` are discarded.
    pub fn insert_task(
        &mut self,
        mut task: Task,
        observer: &mut dyn ChangeObserver,
    ) -> Result<TaskKey, ChainError> {
        if self.task_key(&task.id).is_some() {
            return Err(ChainError::DuplicateTask(task.id));
        }
        let key = self.task_ids.intern(&task.id);
        task.predecessor = None;
        task.successor = None;
        task.server = None;
        task.wait_estimate = None;

        observer.before_entity_added(self, key);
        self.tasks.insert(key, task);
        observer.after_entity_added(self, key);
        Ok(key)
    }

    /// Move `task` to directly after `new_pred`, splicing it out of its
    /// current position first. Returns `false` when it is already there.
    pub fn move_after(
        &mut self,
        task: TaskKey,
        new_pred: Link,
        observer: &mut dyn ChangeObserver,
    ) -> Result<bool, ChainError> {
        let node = self.require_unpinned(task)?;
        if node.predecessor == Some(new_pred) {
            return Ok(false);
        }
        let old_pred = node.predecessor;
        let old_succ = node.successor;

        if new_pred == Link::Task(task) {
            return Err(ChainError::InvalidLink {
                task: self.describe(Link::Task(task)),
                predecessor: self.describe(new_pred),
            });
        }
        match new_pred {
            Link::Anchor(s) if self.server(s).is_none() => {
                return Err(ChainError::UnknownServer(s))
            }
            Link::Task(t) => {
                if !self.require(t)?.is_chained() {
                    return Err(ChainError::InvalidLink {
                        task: self.describe(Link::Task(task)),
                        predecessor: self.describe(new_pred),
                    });
                }
            }
            Link::Anchor(_) => {}
        }
        if let Some(succ) = old_succ {
            self.require_unpinned(succ)?;
        }
        let displaced = self.successor(new_pred);
        if let Some(d) = displaced {
            self.require_unpinned(d)?;
        }

        if let Some(succ) = old_succ {
            self.set_predecessor(succ, old_pred, observer)?;
        }
        self.set_predecessor(task, Some(new_pred), observer)?;
        if let Some(d) = displaced {
            self.set_predecessor(d, Some(Link::Task(task)), observer)?;
        }

        match old_succ {
            Some(succ) if self.reaches(task, succ) => {
                propagate_from(self, task, observer);
            }
            Some(succ) if self.reaches(succ, task) => {
                propagate_from(self, succ, observer);
            }
            Some(succ) => {
                propagate_from(self, succ, observer);
                propagate_from(self, task, observer);
            }
            None => {
                propagate_from(self, task, observer);
            }
        }
        Ok(true)
    }

    /// True when `to` is `from` or lies downstream of it.
    fn reaches(&self, from: TaskKey, to: TaskKey) -> bool {
        let mut next = Some(from);
        for _ in 0..=self.tasks.len() {
            match next {
                Some(key) if key == to => return true,
                Some(key) => next = self.task(key).and_then(|t| t.successor),
                None => return false,
            }
        }
        false
    }

    /// Append `task` at the tail of `server`'s chain.
    pub fn append(
        &mut self,
        server: ServerKey,
        task: TaskKey,
        observer: &mut dyn ChangeObserver,
    ) -> Result<bool, ChainError> {
        let tail = self.tail_of(server);
        if tail == Link::Task(task) {
            return Ok(false);
        }
        self.move_after(task, tail, observer)
    }

    /// Unassign `task`, closing the gap it leaves behind.
    pub fn detach(
        &mut self,
        task: TaskKey,
        observer: &mut dyn ChangeObserver,
    ) -> Result<bool, ChainError> {
        let node = self.require_unpinned(task)?;
        let (old_pred, old_succ) = (node.predecessor, node.successor);
        if old_pred.is_none() {
            return Ok(false);
        }
        if let Some(succ) = old_succ {
            self.require_unpinned(succ)?;
            self.set_predecessor(succ, old_pred, observer)?;
        }
        self.set_predecessor(task, None, observer)?;

        if let Some(succ) = old_succ {
            propagate_from(self, succ, observer);
        }
        propagate_from(self, task, observer);
        Ok(true)
    }

    /// Splice `task` out of its chain, propagate from its former successor,
    /// then discard it. A pinned task may be removed; a pinned successor
    /// cannot be relinked and rejects the removal, so callers must unpin the
    /// successor first.
    pub fn remove_task(
        &mut self,
        task: TaskKey,
        observer: &mut dyn ChangeObserver,
    ) -> Result<(), ChainError> {
        let node = self.require(task)?;
        let (old_pred, old_succ) = (node.predecessor, node.successor);
        if let Some(succ) = old_succ {
            self.require_unpinned(succ)?;
            self.set_predecessor(succ, old_pred, observer)?;
            propagate_from(self, succ, observer);
        }
        if old_pred.is_some() {
            self.relink(task, None, observer);
        }

        observer.before_entity_removed(self, task);
        self.tasks.remove(&task);
        observer.after_entity_removed(self, task);
        Ok(())
    }

    /// Lengthen a task by whole seconds of `extra`; only its downstream
    /// estimates change.
    pub fn prolong(
        &mut self,
        task: TaskKey,
        extra: Duration,
        observer: &mut dyn ChangeObserver,
    ) -> Result<(), ChainError> {
        let node = self.require(task)?;
        let successor = node.successor;
        let duration = node
            .duration
            .checked_add(&whole_seconds(extra))
            .ok_or_else(|| ChainError::DurationOverflow(node.id.clone()))?;

        observer.before_variable_changed(self, task, Variable::Duration);
        if let Some(t) = self.task_mut(task) {
            t.duration = duration;
        }
        observer.after_variable_changed(self, task, Variable::Duration);

        if let Some(succ) = successor {
            propagate_from(self, succ, observer);
        }
        Ok(())
    }

    /// Freeze a task's links and stamp its pickup time.
    pub fn pin(
        &mut self,
        task: TaskKey,
        picked_up_at: DateTime<Utc>,
        observer: &mut dyn ChangeObserver,
    ) -> Result<(), ChainError> {
        self.write_pin(task, Some(picked_up_at), observer)
    }

    pub fn unpin(
        &mut self,
        task: TaskKey,
        observer: &mut dyn ChangeObserver,
    ) -> Result<(), ChainError> {
        self.write_pin(task, None, observer)
    }

    fn write_pin(
        &mut self,
        task: TaskKey,
        picked_up_at: Option<DateTime<Utc>>,
        observer: &mut dyn ChangeObserver,
    ) -> Result<(), ChainError> {
        self.require(task)?;
        observer.before_variable_changed(self, task, Variable::Pinned);
        if let Some(t) = self.task_mut(task) {
            t.pinned = picked_up_at.is_some();
            t.picked_up_at = picked_up_at;
        }
        observer.after_variable_changed(self, task, Variable::Pinned);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Invariants
    // ------------------------------------------------------------------

    /// Check acyclicity, back-reference symmetry and derived-value freshness.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        let mut reached: FxHashSet<TaskKey> = FxHashSet::default();

        for (server_key, server) in self.servers() {
            let mut prev = Link::Anchor(server_key);
            let mut expected_wait = server.queued_lead_time();
            let mut next = server.first;
            let mut steps = 0;

            while let Some(key) = next {
                steps += 1;
                if steps > self.tasks.len() {
                    return violation(format!("chain of server {} does not end", server.id));
                }
                let Some(task) = self.task(key) else {
                    return violation(format!("dangling successor {key:?} in {}", server.id));
                };
                if !reached.insert(key) {
                    return violation(format!("task {} reachable twice", task.id));
                }
                if task.predecessor != Some(prev) {
                    return violation(format!(
                        "task {} does not point back at {}",
                        task.id,
                        self.describe(prev)
                    ));
                }
                if task.server != Some(server_key) {
                    return violation(format!(
                        "task {} assignment differs from anchor {}",
                        task.id, server.id
                    ));
                }
                if task.wait_estimate != expected_wait {
                    return violation(format!(
                        "task {} has stale wait estimate {:?}, expected {:?}",
                        task.id, task.wait_estimate, expected_wait
                    ));
                }
                expected_wait = Some(task.completion());
                prev = Link::Task(key);
                next = task.successor;
            }
        }

        for key in self.task_keys() {
            if reached.contains(&key) {
                continue;
            }
            let Some(task) = self.task(key) else { continue };
            if task.predecessor.is_some() {
                return violation(format!("task {} is chained but no anchor reaches it", task.id));
            }
            if task.successor.is_some() || task.server.is_some() || task.wait_estimate.is_some() {
                return violation(format!("unchained task {} carries chain state", task.id));
            }
        }
        Ok(())
    }
}

fn violation(message: String) -> Result<(), InvariantViolation> {
    Err(InvariantViolation(message))
}

fn key_index(key: ServerKey) -> usize {
    key.index() as usize
}

fn server_key_at(index: usize) -> ServerKey {
    ServerKey::from_index(index as u32)
}
