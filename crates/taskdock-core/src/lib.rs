use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod reconcile;
pub mod transition;
pub mod wire;

/// Client-visible lifecycle stage of a task.
///
/// The stages are ordered: a task normally advances `Closed -> Loading ->
/// Running -> Served`, and the only way back is closing. The wire contract
/// serializes each stage as its lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Closed,
    Loading,
    Running,
    Served,
}

impl Default for Status {
    fn default() -> Self {
        Self::Closed
    }
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Closed => "closed",
            Status::Loading => "loading",
            Status::Running => "running",
            Status::Served => "served",
        }
    }

    /// Whether the task counts as open for UI gating purposes.
    pub fn is_open(self) -> bool {
        self != Status::Closed
    }

    /// A port assignment is only meaningful once the backing service exists.
    pub fn port_meaningful(self) -> bool {
        matches!(self, Status::Running | Status::Served)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "closed" => Ok(Status::Closed),
            "loading" => Ok(Status::Loading),
            "running" => Ok(Status::Running),
            "served" => Ok(Status::Served),
            other => Err(format!("Unknown status: {other}")),
        }
    }
}

/// Snapshot of a single task as reported by the server.
///
/// `port` is `Some` only once the server has assigned a redirect target,
/// which cannot happen before the task reaches `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub port: Option<u16>,
    pub status: Status,
}

impl TaskRecord {
    /// The default record for a task the registry has never seen.
    pub fn closed(name: &str) -> Self {
        Self {
            name: name.to_string(),
            port: None,
            status: Status::Closed,
        }
    }

    /// The delta that folds this record into a registry.
    pub fn as_delta(&self) -> StatusDelta {
        StatusDelta {
            status: self.status,
            port: match self.port {
                Some(port) => PortUpdate::Set(port),
                None => PortUpdate::Clear,
            },
        }
    }
}

/// A partial status update from any of the three event sources
/// (command result, probe result, push event).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusDelta {
    pub status: Status,
    pub port: PortUpdate,
}

impl StatusDelta {
    /// A status-only delta, as delivered by the push channel.
    pub fn status_only(status: Status) -> Self {
        Self {
            status,
            port: PortUpdate::Keep,
        }
    }

    /// The delta a close command applies regardless of prior state.
    pub fn closed() -> Self {
        Self {
            status: Status::Closed,
            port: PortUpdate::Clear,
        }
    }
}

/// What a delta does to the task's port assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortUpdate {
    /// Leave the current assignment alone (push events carry no port).
    Keep,
    Set(u16),
    Clear,
}
