//! Authoritative client-side map of task name to last-known status.
//!
//! Every mutation builds a fresh map and swaps it in behind an `Arc`, then
//! publishes the new snapshot on a watch channel. Observers therefore only
//! ever see whole, consistent snapshots. All mutation happens on the
//! engine's event-loop task; the registry itself takes no locks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;

use taskdock_core::transition::{self, Admission};
use taskdock_core::{PortUpdate, Status, StatusDelta, TaskRecord};

pub type TaskMap = Arc<HashMap<String, TaskRecord>>;

/// What applying a delta did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// The entry changed; the new record.
    Applied(TaskRecord),
    /// Same state as before (idempotent write); no notification sent.
    Unchanged,
    /// The transition reducer refused the move.
    Rejected { current: Status, proposed: Status },
}

pub struct TaskRegistry {
    tasks: TaskMap,
    publish: watch::Sender<TaskMap>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        let tasks: TaskMap = Arc::new(HashMap::new());
        let (publish, _) = watch::channel(tasks.clone());
        Self { tasks, publish }
    }

    /// Replace the whole map from a startup snapshot. Task names without a
    /// managed process entry become `Closed` defaults.
    pub fn load_snapshot(&mut self, names: &[String], records: Vec<TaskRecord>) {
        let mut map: HashMap<String, TaskRecord> = names
            .iter()
            .map(|name| (name.clone(), TaskRecord::closed(name)))
            .collect();
        for record in records {
            map.insert(record.name.clone(), record);
        }
        self.tasks = Arc::new(map);
        let _ = self.publish.send(self.tasks.clone());
    }

    /// Merge a status change. Creates the entry (with no port) when the
    /// name is new; refuses backward moves to anything but `Closed`.
    pub fn apply_delta(&mut self, name: &str, delta: StatusDelta) -> DeltaOutcome {
        let current = self
            .tasks
            .get(name)
            .cloned()
            .unwrap_or_else(|| TaskRecord::closed(name));

        if let Admission::Rejected = transition::admit(current.status, delta.status) {
            return DeltaOutcome::Rejected {
                current: current.status,
                proposed: delta.status,
            };
        }

        let mut next = current.clone();
        next.status = delta.status;
        next.port = match delta.port {
            PortUpdate::Keep => next.port,
            PortUpdate::Set(port) => Some(port),
            PortUpdate::Clear => None,
        };
        if !next.status.port_meaningful() {
            next.port = None;
        }

        if next == current && self.tasks.contains_key(name) {
            return DeltaOutcome::Unchanged;
        }

        let mut map = (*self.tasks).clone();
        map.insert(name.to_string(), next.clone());
        self.tasks = Arc::new(map);
        let _ = self.publish.send(self.tasks.clone());
        DeltaOutcome::Applied(next)
    }

    /// Current entry, or the `Closed` default for unknown names.
    pub fn get(&self, name: &str) -> TaskRecord {
        self.tasks
            .get(name)
            .cloned()
            .unwrap_or_else(|| TaskRecord::closed(name))
    }

    pub fn snapshot(&self) -> TaskMap {
        self.tasks.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TaskMap> {
        self.publish.subscribe()
    }
}
