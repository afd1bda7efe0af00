//! The synchronization engine: one process-scoped context owning the
//! registry and the event loop that reconciles all three event sources
//! (command results, probe results, push deltas).
//!
//! Every registry mutation happens on the loop task, so no locking is
//! needed and observers see deltas applied in arrival order
//! (last-write-wins across sources; there is no cross-source ordering).
//! Commands and probes run in spawned tasks and report back over the
//! event channel, so neither a slow server nor the probe timeout ever
//! stalls the loop. Teardown cancels the root token; probe timers and
//! the reconnect schedule are children of it and die with the context.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use taskdock_core::reconcile::PolicyMap;
use taskdock_core::wire::PushEvent;
use taskdock_core::{Status, StatusDelta, TaskRecord};

use crate::api::{ApiError, TaskApi};
use crate::commands::{CommandDispatcher, CommandOutcome};
use crate::config::SyncConfig;
use crate::probe;
use crate::push;
use crate::registry::{DeltaOutcome, TaskMap, TaskRegistry};

const COMMAND_QUEUE_CAPACITY: usize = 64;
const EVENT_QUEUE_CAPACITY: usize = 256;

/// Lifecycle request from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open(String),
    Close(String),
}

/// Anything the loop folds into the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Push(PushEvent),
    ProbeReady { name: String },
    OpenFinished { name: String, outcome: CommandOutcome },
    CloseFinished { name: String, outcome: CommandOutcome },
}

pub struct SyncEngine;

impl SyncEngine {
    /// Load the initial snapshot and start the engine.
    ///
    /// Fails only when the startup snapshot cannot be loaded; once
    /// running, every failure degrades to stale-but-usable state.
    pub async fn spawn(config: SyncConfig, api: Arc<dyn TaskApi>) -> Result<SyncHandle, ApiError> {
        let names = api.list_tasks().await?;
        let records = api.snapshot().await?;

        let mut registry = TaskRegistry::new();
        registry.load_snapshot(&names, records);
        let tasks = registry.subscribe();

        let cancel = CancellationToken::new();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

        let engine_loop = EngineLoop {
            api,
            registry,
            policies: config.policies.clone(),
            ws_url: config.ws_url.clone(),
            probe_timeout: config.probe_timeout,
            probe_interval: config.probe_interval,
            reconnect_delay: config.reconnect_delay,
            probes: HashMap::new(),
            event_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(engine_loop.run(command_rx, event_rx));

        Ok(SyncHandle {
            commands: command_tx,
            tasks,
            cancel,
            task,
        })
    }
}

/// Handle to a running engine. Dropping it without calling
/// [`SyncHandle::shutdown`] leaves the loop running detached.
pub struct SyncHandle {
    commands: mpsc::Sender<Command>,
    tasks: watch::Receiver<TaskMap>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Request that a task be opened. Fire-and-forget: completion shows
    /// up as registry updates.
    pub async fn open(&self, name: &str) {
        if self
            .commands
            .send(Command::Open(name.to_string()))
            .await
            .is_err()
        {
            warn!("engine_gone: open {name}");
        }
    }

    /// Request that a task be closed.
    pub async fn close(&self, name: &str) {
        if self
            .commands
            .send(Command::Close(name.to_string()))
            .await
            .is_err()
        {
            warn!("engine_gone: close {name}");
        }
    }

    /// Current record for a task (the `Closed` default if unknown).
    pub fn task(&self, name: &str) -> TaskRecord {
        self.tasks
            .borrow()
            .get(name)
            .cloned()
            .unwrap_or_else(|| TaskRecord::closed(name))
    }

    /// Watch receiver over whole registry snapshots.
    pub fn watch_tasks(&self) -> watch::Receiver<TaskMap> {
        self.tasks.clone()
    }

    /// Tear the context down: cancels the push channel and every probe
    /// timer, then waits for the loop to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            warn!("engine_join_error: {err}");
        }
    }
}

struct EngineLoop {
    api: Arc<dyn TaskApi>,
    registry: TaskRegistry,
    policies: PolicyMap,
    ws_url: url::Url,
    probe_timeout: Duration,
    probe_interval: Duration,
    reconnect_delay: Duration,
    probes: HashMap<String, CancellationToken>,
    event_tx: mpsc::Sender<EngineEvent>,
    cancel: CancellationToken,
}

impl EngineLoop {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<EngineEvent>,
    ) {
        let push_task = tokio::spawn(push::run_push_channel(
            self.ws_url.clone(),
            self.reconnect_delay,
            self.event_tx.clone(),
            self.cancel.clone(),
        ));

        // Tasks already mid-startup in the snapshot need their probes.
        let snapshot = self.registry.snapshot();
        for record in snapshot.values() {
            self.reconcile_probe(record);
        }

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                Some(command) = commands.recv() => self.dispatch(command),
                Some(event) = events.recv() => self.handle_event(event),
                else => break,
            }
        }

        for (_, token) in self.probes.drain() {
            token.cancel();
        }
        self.cancel.cancel();
        let _ = push_task.await;
    }

    /// Issue the command in its own task so a slow server never stalls
    /// the loop; the result comes back as an event.
    fn dispatch(&mut self, command: Command) {
        let dispatcher = CommandDispatcher::new(self.api.clone());
        let events = self.event_tx.clone();
        match command {
            Command::Open(name) => {
                tokio::spawn(async move {
                    let outcome = dispatcher.open(&name).await;
                    let _ = events.send(EngineEvent::OpenFinished { name, outcome }).await;
                });
            }
            Command::Close(name) => {
                tokio::spawn(async move {
                    let outcome = dispatcher.close(&name).await;
                    let _ = events
                        .send(EngineEvent::CloseFinished { name, outcome })
                        .await;
                });
            }
        }
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Push(event) => {
                self.apply(&event.name, StatusDelta::status_only(event.status), "push");
            }
            EngineEvent::ProbeReady { name } => {
                self.probes.remove(&name);
                let policy = self.policies.resolve(&name);
                self.apply(&name, StatusDelta::status_only(policy.ready_state), "probe");
            }
            EngineEvent::OpenFinished { name, outcome } => {
                if let CommandOutcome::Opened { initial, refreshed } = outcome {
                    let record = refreshed.unwrap_or(initial);
                    self.apply(&name, record.as_delta(), "open");
                    let policy = self.policies.resolve(&name);
                    if !policy.needs_probe && self.registry.get(&name).status == Status::Loading {
                        // No endpoint to wait for; the task is as ready
                        // as it will ever look.
                        self.apply(&name, StatusDelta::status_only(policy.ready_state), "open");
                    }
                }
            }
            EngineEvent::CloseFinished { name, outcome } => {
                if outcome == CommandOutcome::Closed {
                    self.apply(&name, StatusDelta::closed(), "close");
                }
            }
        }
    }

    fn apply(&mut self, name: &str, delta: StatusDelta, source: &str) {
        match self.registry.apply_delta(name, delta) {
            DeltaOutcome::Applied(record) => {
                debug!("status_applied: {name} -> {} source={source}", record.status);
                self.reconcile_probe(&record);
            }
            DeltaOutcome::Unchanged => {}
            DeltaOutcome::Rejected { current, proposed } => {
                debug!("status_rejected: {name} {current} -> {proposed} source={source}");
            }
        }
    }

    /// Keep probe lifetimes in lockstep with task status: a `Loading`
    /// task with an endpoint gets exactly one probe loop; any other
    /// status cancels whatever probe is live (close while in flight,
    /// or a push event that reached the ready state first).
    fn reconcile_probe(&mut self, record: &TaskRecord) {
        let policy = self.policies.resolve(&record.name);
        if policy.needs_probe && record.status == Status::Loading {
            if !self.probes.contains_key(&record.name) {
                let token = self.cancel.child_token();
                self.probes.insert(record.name.clone(), token.clone());
                tokio::spawn(probe::run_probe(
                    self.api.clone(),
                    record.name.clone(),
                    self.probe_timeout,
                    self.probe_interval,
                    token,
                    self.event_tx.clone(),
                ));
            }
        } else if let Some(token) = self.probes.remove(&record.name) {
            token.cancel();
        }
    }
}
