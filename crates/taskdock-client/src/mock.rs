//! Mock server for unit and integration testing.
//!
//! Records every call and returns pre-configured responses, including a
//! scripted sequence of probe outcomes.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use taskdock_core::wire::{DirListing, DriveList};
use taskdock_core::{Status, TaskRecord};

use crate::api::{ApiError, TaskApi};

/// A recorded call to the mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ListTasks,
    Snapshot,
    Fetch(String),
    Open(String),
    Close(String),
    Probe(String),
    ShutdownHost,
    Monitors(bool),
    Drives,
    ListDir(String),
}

/// Mock implementation of [`TaskApi`].
///
/// `open` moves (or creates) the named task at `Loading`, mirroring a
/// server that accepted the start request but whose service is not up
/// yet; `close` resets it. Probe outcomes come from a scripted queue and
/// fall back to "not ready" once the script is exhausted.
pub struct MockTaskApi {
    names: Mutex<Vec<String>>,
    records: Mutex<HashMap<String, TaskRecord>>,
    calls: Mutex<Vec<MockCall>>,
    open_error: Mutex<Option<ApiError>>,
    close_error: Mutex<Option<ApiError>>,
    fetch_error: Mutex<Option<ApiError>>,
    probe_script: Mutex<VecDeque<bool>>,
}

impl Default for MockTaskApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTaskApi {
    pub fn new() -> Self {
        Self {
            names: Mutex::new(Vec::new()),
            records: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            open_error: Mutex::new(None),
            close_error: Mutex::new(None),
            fetch_error: Mutex::new(None),
            probe_script: Mutex::new(VecDeque::new()),
        }
    }

    /// Add a task name to `GET /tasks` without a managed process entry.
    pub fn with_task_name(self, name: &str) -> Self {
        self.names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_string());
        self
    }

    /// Pre-populate a managed task; its name is also listed.
    pub fn with_record(self, record: TaskRecord) -> Self {
        {
            let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
            if !names.contains(&record.name) {
                names.push(record.name.clone());
            }
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.name.clone(), record);
        self
    }

    /// Configure open to fail.
    pub fn with_open_error(self, err: ApiError) -> Self {
        *self.open_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
        self
    }

    /// Configure close to fail.
    pub fn with_close_error(self, err: ApiError) -> Self {
        *self.close_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
        self
    }

    /// Configure the out-of-band fetch to fail.
    pub fn with_fetch_error(self, err: ApiError) -> Self {
        *self.fetch_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
        self
    }

    /// Script the next probe outcomes, in order. `true` means the
    /// service answered; once exhausted probes report "not ready".
    pub fn with_probe_script(self, outcomes: impl IntoIterator<Item = bool>) -> Self {
        self.probe_script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(outcomes);
        self
    }

    /// All recorded calls.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many probes hit the given task.
    pub fn probe_count(&self, name: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, MockCall::Probe(n) if n == name))
            .count()
    }

    /// Push a probe outcome after construction (for staged tests).
    pub fn script_probe(&self, ready: bool) {
        self.probe_script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(ready);
    }

    fn record_call(&self, call: MockCall) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    fn take_error(&self, slot: &Mutex<Option<ApiError>>) -> Option<ApiError> {
        slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl TaskApi for MockTaskApi {
    async fn list_tasks(&self) -> Result<Vec<String>, ApiError> {
        self.record_call(MockCall::ListTasks);
        Ok(self
            .names
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn snapshot(&self) -> Result<Vec<TaskRecord>, ApiError> {
        self.record_call(MockCall::Snapshot);
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.values().cloned().collect())
    }

    async fn fetch(&self, name: &str) -> Result<TaskRecord, ApiError> {
        self.record_call(MockCall::Fetch(name.to_string()));
        if let Some(err) = self.take_error(&self.fetch_error) {
            return Err(err);
        }
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.get(name).cloned().ok_or(ApiError::Status {
            endpoint: format!("processes/{name}"),
            status: 404,
        })
    }

    async fn open(&self, name: &str) -> Result<TaskRecord, ApiError> {
        self.record_call(MockCall::Open(name.to_string()));
        if let Some(err) = self.take_error(&self.open_error) {
            return Err(err);
        }
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let record = records
            .entry(name.to_string())
            .or_insert_with(|| TaskRecord::closed(name));
        if record.status == Status::Closed {
            record.status = Status::Loading;
            record.port = None;
        }
        Ok(record.clone())
    }

    async fn close(&self, name: &str) -> Result<(), ApiError> {
        self.record_call(MockCall::Close(name.to_string()));
        if let Some(err) = self.take_error(&self.close_error) {
            return Err(err);
        }
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = records.get_mut(name) {
            record.status = Status::Closed;
            record.port = None;
        }
        Ok(())
    }

    async fn probe_redirect(&self, name: &str, _timeout: Duration) -> Result<(), ApiError> {
        self.record_call(MockCall::Probe(name.to_string()));
        let ready = self
            .probe_script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(false);
        if ready {
            Ok(())
        } else {
            Err(ApiError::Transport("connection refused".to_string()))
        }
    }

    fn redirect_url(&self, name: &str) -> Url {
        let mut url = Url::parse("http://mock.invalid/").expect("static url");
        url.set_path(&format!("processes/{name}/redirect"));
        url
    }

    async fn shutdown_host(&self) -> Result<(), ApiError> {
        self.record_call(MockCall::ShutdownHost);
        Ok(())
    }

    async fn set_monitors(&self, on: bool) -> Result<(), ApiError> {
        self.record_call(MockCall::Monitors(on));
        Ok(())
    }

    async fn drives(&self) -> Result<DriveList, ApiError> {
        self.record_call(MockCall::Drives);
        Ok(DriveList { drives: Vec::new() })
    }

    async fn list_dir(&self, path: &str) -> Result<DirListing, ApiError> {
        self.record_call(MockCall::ListDir(path.to_string()));
        Ok(DirListing {
            path: path.to_string(),
            files: Vec::new(),
        })
    }

    fn download_url(&self, path: &str) -> Url {
        let mut url = Url::parse("http://mock.invalid/download").expect("static url");
        url.query_pairs_mut().append_pair("path", path);
        url
    }
}
