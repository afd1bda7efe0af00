//! Engine behavior against the mock server: command dispatch, the
//! readiness retry loop, cancellation, and policy-driven ready states.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use url::Url;

use taskdock_client::api::ApiError;
use taskdock_client::config::SyncConfig;
use taskdock_client::engine::SyncEngine;
use taskdock_client::mock::MockTaskApi;
use taskdock_client::registry::TaskMap;
use taskdock_core::reconcile::{PolicyMap, ServicePolicy};
use taskdock_core::{Status, TaskRecord};

const PROBE_INTERVAL: Duration = Duration::from_millis(25);

fn test_config() -> SyncConfig {
    // Nothing listens on the ws port; the push channel just retries in
    // the background without affecting these tests.
    let mut config = SyncConfig::new(Url::parse("http://127.0.0.1:9").expect("url"));
    config.probe_timeout = Duration::from_millis(50);
    config.probe_interval = PROBE_INTERVAL;
    config.reconnect_delay = Duration::from_millis(200);
    config
}

fn loading(name: &str) -> TaskRecord {
    TaskRecord {
        name: name.to_string(),
        port: None,
        status: Status::Loading,
    }
}

async fn wait_for_status(rx: &mut watch::Receiver<TaskMap>, name: &str, status: Status) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            {
                let map = rx.borrow_and_update();
                if map.get(name).map(|task| task.status) == Some(status) {
                    return;
                }
            }
            rx.changed().await.expect("registry sender alive");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("task {name} never reached {status}"));
}

#[tokio::test]
async fn open_probes_until_the_service_answers() {
    let api = Arc::new(
        MockTaskApi::new()
            .with_task_name("jellyfin")
            .with_probe_script([false, false, true]),
    );
    let handle = SyncEngine::spawn(test_config(), api.clone())
        .await
        .expect("engine starts");
    let mut tasks = handle.watch_tasks();

    assert_eq!(handle.task("jellyfin").status, Status::Closed);
    handle.open("jellyfin").await;
    wait_for_status(&mut tasks, "jellyfin", Status::Running).await;

    assert_eq!(api.probe_count("jellyfin"), 3);
    // Success must stop the retry timer.
    tokio::time::sleep(PROBE_INTERVAL * 4).await;
    assert_eq!(api.probe_count("jellyfin"), 3);

    handle.shutdown().await;
}

#[tokio::test]
async fn unanswered_probes_keep_the_task_loading() {
    let api = Arc::new(MockTaskApi::new().with_task_name("jellyfin"));
    let handle = SyncEngine::spawn(test_config(), api.clone())
        .await
        .expect("engine starts");
    let mut tasks = handle.watch_tasks();

    handle.open("jellyfin").await;
    wait_for_status(&mut tasks, "jellyfin", Status::Loading).await;

    tokio::time::sleep(PROBE_INTERVAL * 5).await;
    assert_eq!(handle.task("jellyfin").status, Status::Loading);
    // One immediate attempt plus roughly one per interval, never stacked.
    let count = api.probe_count("jellyfin");
    assert!((3..=8).contains(&count), "unexpected probe count {count}");

    handle.shutdown().await;
}

#[tokio::test]
async fn close_resets_the_task_and_cancels_its_probe() {
    let api = Arc::new(MockTaskApi::new().with_task_name("jellyfin"));
    let handle = SyncEngine::spawn(test_config(), api.clone())
        .await
        .expect("engine starts");
    let mut tasks = handle.watch_tasks();

    handle.open("jellyfin").await;
    wait_for_status(&mut tasks, "jellyfin", Status::Loading).await;

    handle.close("jellyfin").await;
    wait_for_status(&mut tasks, "jellyfin", Status::Closed).await;
    assert_eq!(handle.task("jellyfin").port, None);

    let settled = api.probe_count("jellyfin");
    tokio::time::sleep(PROBE_INTERVAL * 4).await;
    assert_eq!(api.probe_count("jellyfin"), settled);

    handle.shutdown().await;
}

#[tokio::test]
async fn failed_open_leaves_the_registry_unchanged() {
    let api = Arc::new(
        MockTaskApi::new()
            .with_task_name("jellyfin")
            .with_open_error(ApiError::Transport("connection refused".to_string())),
    );
    let handle = SyncEngine::spawn(test_config(), api.clone())
        .await
        .expect("engine starts");

    handle.open("jellyfin").await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(handle.task("jellyfin").status, Status::Closed);
    assert_eq!(api.probe_count("jellyfin"), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn headless_tasks_open_without_probing() {
    let api = Arc::new(MockTaskApi::new().with_task_name("backup"));
    let config = test_config().with_policies(
        PolicyMap::new(ServicePolicy::default()).with_policy("backup", ServicePolicy::headless()),
    );
    let handle = SyncEngine::spawn(config, api.clone())
        .await
        .expect("engine starts");
    let mut tasks = handle.watch_tasks();

    handle.open("backup").await;
    wait_for_status(&mut tasks, "backup", Status::Running).await;
    assert_eq!(api.probe_count("backup"), 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn ready_state_follows_the_task_policy() {
    let api = Arc::new(
        MockTaskApi::new()
            .with_task_name("media")
            .with_probe_script([true]),
    );
    let config = test_config().with_policies(
        PolicyMap::new(ServicePolicy::default())
            .with_policy("media", ServicePolicy::endpoint(Status::Served)),
    );
    let handle = SyncEngine::spawn(config, api)
        .await
        .expect("engine starts");
    let mut tasks = handle.watch_tasks();

    handle.open("media").await;
    wait_for_status(&mut tasks, "media", Status::Served).await;

    handle.shutdown().await;
}

#[tokio::test]
async fn snapshot_with_loading_task_starts_probing_on_mount() {
    let api = Arc::new(
        MockTaskApi::new()
            .with_record(loading("jellyfin"))
            .with_probe_script([true]),
    );
    let handle = SyncEngine::spawn(test_config(), api.clone())
        .await
        .expect("engine starts");
    let mut tasks = handle.watch_tasks();

    // No open command: the mount-time snapshot alone drives the probe.
    wait_for_status(&mut tasks, "jellyfin", Status::Running).await;
    assert!(api.probe_count("jellyfin") >= 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_probe_timers() {
    let api = Arc::new(MockTaskApi::new().with_record(loading("jellyfin")));
    let handle = SyncEngine::spawn(test_config(), api.clone())
        .await
        .expect("engine starts");

    tokio::time::sleep(PROBE_INTERVAL * 2).await;
    handle.shutdown().await;

    let settled = api.probe_count("jellyfin");
    tokio::time::sleep(PROBE_INTERVAL * 4).await;
    assert_eq!(api.probe_count("jellyfin"), settled);
}
