//! Server contract consumed by the engine.
//!
//! `TaskApi` covers the lifecycle endpoints the synchronization engine
//! depends on plus the collaborator endpoints (monitors, shutdown, file
//! browser) that are plain request plumbing. Implementations: the
//! reqwest-backed [`crate::http::HttpTaskApi`] and the recording
//! [`crate::mock::MockTaskApi`] for tests.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use taskdock_core::wire::{DirListing, DriveList};
use taskdock_core::TaskRecord;

/// Normalized error for server operations. Transport details stay out of
/// the engine; every variant is non-fatal there.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },
    #[error("response decode failed: {0}")]
    Decode(String),
}

#[async_trait]
pub trait TaskApi: Send + Sync {
    /// `GET /tasks`: every task name the host knows about.
    async fn list_tasks(&self) -> Result<Vec<String>, ApiError>;

    /// `GET /processes`: full snapshot of currently managed tasks.
    async fn snapshot(&self) -> Result<Vec<TaskRecord>, ApiError>;

    /// `GET /processes/{name}`: single task status.
    async fn fetch(&self, name: &str) -> Result<TaskRecord, ApiError>;

    /// `POST /processes/{name}`: start the task.
    async fn open(&self, name: &str) -> Result<TaskRecord, ApiError>;

    /// `DELETE /processes/{name}`: stop the task.
    async fn close(&self, name: &str) -> Result<(), ApiError>;

    /// `GET /processes/{name}/redirect` under `timeout`. `Ok` means the
    /// backing service accepted the request; every failure is just "not
    /// yet ready" to the caller.
    async fn probe_redirect(&self, name: &str, timeout: Duration) -> Result<(), ApiError>;

    /// The browser navigation target once a task is reachable.
    fn redirect_url(&self, name: &str) -> Url;

    /// `GET /shutdown`.
    async fn shutdown_host(&self) -> Result<(), ApiError>;

    /// `GET /monitors/on` or `GET /monitors/off`.
    async fn set_monitors(&self, on: bool) -> Result<(), ApiError>;

    /// `GET /drives`.
    async fn drives(&self) -> Result<DriveList, ApiError>;

    /// `GET /list?path=`.
    async fn list_dir(&self, path: &str) -> Result<DirListing, ApiError>;

    /// The download target for a file path; the browser follows it.
    fn download_url(&self, path: &str) -> Url;
}
