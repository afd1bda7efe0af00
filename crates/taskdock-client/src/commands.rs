//! Lifecycle command dispatch.
//!
//! Commands are fire-and-forget from the caller's point of view: there is
//! no client-side dedup of in-flight requests (the server treats
//! open-on-open and close-on-closed as no-ops), and any failure is logged
//! and swallowed so the user can simply retry.

use std::sync::Arc;

use tracing::warn;

use taskdock_core::TaskRecord;

use crate::api::TaskApi;

/// What dispatching a command produced for the registry to fold in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Open succeeded. `refreshed` is the out-of-band status fetch issued
    /// right after the start request, to shrink the dead window before
    /// the first probe tick; it is `None` when that fetch failed.
    Opened {
        initial: TaskRecord,
        refreshed: Option<TaskRecord>,
    },
    /// Close succeeded; the caller resets the task to `Closed`.
    Closed,
    /// The request failed; registry state must be left alone.
    Failed,
}

pub struct CommandDispatcher {
    api: Arc<dyn TaskApi>,
}

impl CommandDispatcher {
    pub fn new(api: Arc<dyn TaskApi>) -> Self {
        Self { api }
    }

    pub async fn open(&self, name: &str) -> CommandOutcome {
        let initial = match self.api.open(name).await {
            Ok(record) => record,
            Err(err) => {
                warn!("open_error: {name}: {err}");
                return CommandOutcome::Failed;
            }
        };
        let refreshed = match self.api.fetch(name).await {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("open_refresh_error: {name}: {err}");
                None
            }
        };
        CommandOutcome::Opened { initial, refreshed }
    }

    pub async fn close(&self, name: &str) -> CommandOutcome {
        match self.api.close(name).await {
            Ok(()) => CommandOutcome::Closed,
            Err(err) => {
                warn!("close_error: {name}: {err}");
                CommandOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use taskdock_core::Status;

    use crate::api::ApiError;
    use crate::mock::{MockCall, MockTaskApi};

    #[tokio::test]
    async fn open_issues_one_out_of_band_fetch() {
        let api = Arc::new(MockTaskApi::new().with_task_name("jellyfin"));
        let dispatcher = CommandDispatcher::new(api.clone());

        let outcome = dispatcher.open("jellyfin").await;
        let CommandOutcome::Opened { initial, refreshed } = outcome else {
            panic!("open should succeed");
        };
        assert_eq!(initial.status, Status::Loading);
        assert_eq!(refreshed.expect("fetch succeeds").status, Status::Loading);
        assert_eq!(
            api.calls(),
            vec![
                MockCall::Open("jellyfin".to_string()),
                MockCall::Fetch("jellyfin".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn open_failure_is_swallowed() {
        let api = Arc::new(
            MockTaskApi::new()
                .with_task_name("jellyfin")
                .with_open_error(ApiError::Transport("connection refused".to_string())),
        );
        let dispatcher = CommandDispatcher::new(api.clone());

        assert_eq!(dispatcher.open("jellyfin").await, CommandOutcome::Failed);
        // No out-of-band fetch after a failed start request.
        assert_eq!(api.calls(), vec![MockCall::Open("jellyfin".to_string())]);
    }

    #[tokio::test]
    async fn open_survives_a_failed_refresh() {
        let api = Arc::new(
            MockTaskApi::new()
                .with_task_name("jellyfin")
                .with_fetch_error(ApiError::Status {
                    endpoint: "processes/jellyfin".to_string(),
                    status: 500,
                }),
        );
        let dispatcher = CommandDispatcher::new(api);

        let CommandOutcome::Opened { refreshed, .. } = dispatcher.open("jellyfin").await else {
            panic!("open should still count as dispatched");
        };
        assert!(refreshed.is_none());
    }

    #[tokio::test]
    async fn close_reports_failure_without_side_effects() {
        let api = Arc::new(
            MockTaskApi::new()
                .with_close_error(ApiError::Transport("connection reset".to_string())),
        );
        let dispatcher = CommandDispatcher::new(api);

        assert_eq!(dispatcher.close("jellyfin").await, CommandOutcome::Failed);
    }
}
