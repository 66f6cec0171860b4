//! Contract tests for container runtimes, driven against the memory backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use netlab_common::{GenericFilter, MgmtNet, NodeConfig, RuntimeError};
use netlab_runtime::option::{with_config, with_keep_mgmt_net, with_mgmt_net};
use netlab_runtime::{
    Context, ContainerRuntime, LifecycleEvent, MemoryRuntime, RuntimeConfig, RuntimeOption,
    RuntimeRegistry,
};

const IMAGE: &str = "ghcr.io/hellt/network-multitool";

async fn memory_runtime(options: Vec<RuntimeOption>) -> MemoryRuntime {
    let mut runtime = MemoryRuntime::new().with_image(IMAGE).unwrap();
    runtime.init(options).await.unwrap();
    runtime
}

async fn deploy(runtime: &dyn ContainerRuntime, node: &NodeConfig) {
    let ctx = Context::background();
    runtime.create_container(&ctx, node).await.unwrap();
    runtime
        .start_container(&ctx, node.container_name())
        .await
        .unwrap();
}

fn argv(cmd: &str) -> Vec<String> {
    cmd.split_whitespace().map(String::from).collect()
}

#[test_log::test(tokio::test)]
async fn registered_runtime_initializes_with_options() {
    let mut registry = RuntimeRegistry::new();
    registry.register("x", || Box::new(MemoryRuntime::with_name("x")));

    let config = RuntimeConfig::default().with_timeout(Duration::from_secs(5));
    let runtime = registry
        .init_runtime(
            "x",
            vec![with_config(config), with_mgmt_net(MgmtNet::new("mgmt0"))],
        )
        .await
        .unwrap();

    assert_eq!(runtime.name(), "x");
    assert_eq!(runtime.config(), config);
    assert_eq!(runtime.config().timeout, Duration::from_secs(5));

    let ctx = Context::background();
    runtime.create_net(&ctx).await.unwrap();
    runtime.create_net(&ctx).await.unwrap();
}

#[tokio::test]
async fn unknown_runtime_fails_before_backend_io() {
    let registry = RuntimeRegistry::with_builtin();
    let err = registry.init_runtime("podman", Vec::new()).await.err().unwrap();
    assert!(matches!(err, RuntimeError::UnknownRuntime { .. }));
}

#[tokio::test]
async fn config_is_returned_verbatim() {
    let config = RuntimeConfig {
        timeout: Duration::from_secs(42),
        graceful_shutdown: true,
        debug: true,
        keep_mgmt_net: false,
    };
    let runtime = memory_runtime(vec![with_config(config)]).await;

    let mut returned = runtime.config();
    assert_eq!(returned, config);

    returned.debug = false;
    assert!(runtime.config().debug);
}

#[tokio::test]
async fn options_apply_in_order_and_are_idempotent() {
    let first = RuntimeConfig::default().with_debug();
    let second = RuntimeConfig::default().with_timeout(Duration::from_secs(9));

    let runtime = memory_runtime(vec![with_config(first), with_config(second)]).await;
    assert_eq!(runtime.config(), second);

    let once = memory_runtime(vec![with_keep_mgmt_net()]).await;
    let twice = memory_runtime(vec![with_keep_mgmt_net(), with_keep_mgmt_net()]).await;
    assert_eq!(once.config(), twice.config());
    assert!(twice.config().keep_mgmt_net);

    let mgmt = MgmtNet::new("mgmt0");
    let repeated = memory_runtime(vec![
        with_mgmt_net(mgmt.clone()),
        with_mgmt_net(mgmt.clone()),
    ])
    .await;
    assert_eq!(repeated.mgmt_net(), Some(&mgmt));
}

#[tokio::test]
async fn keep_mgmt_net_survives_delete() {
    let runtime = memory_runtime(vec![
        with_mgmt_net(MgmtNet::new("mgmt0")),
        with_keep_mgmt_net(),
    ])
    .await;
    let ctx = Context::background();

    runtime.create_net(&ctx).await.unwrap();
    for _ in 0..3 {
        runtime.delete_net(&ctx).await.unwrap();
        assert!(runtime.has_network("mgmt0"));
    }
}

#[tokio::test]
async fn delete_net_removes_network_once() {
    let runtime = memory_runtime(vec![with_mgmt_net(MgmtNet::new("mgmt0"))]).await;
    let ctx = Context::background();

    runtime.create_net(&ctx).await.unwrap();
    assert!(runtime.has_network("mgmt0"));
    runtime.delete_net(&ctx).await.unwrap();
    assert!(!runtime.has_network("mgmt0"));
    runtime.delete_net(&ctx).await.unwrap();
}

#[tokio::test]
async fn teardown_of_missing_targets_succeeds() {
    let runtime = memory_runtime(vec![with_mgmt_net(MgmtNet::new("mgmt0"))]).await;
    let ctx = Context::background();

    runtime.stop_container(&ctx, "ghost").await.unwrap();
    runtime.delete_container(&ctx, "ghost").await.unwrap();
    runtime.delete_net(&ctx).await.unwrap();

    let bare = memory_runtime(Vec::new()).await;
    bare.delete_net(&ctx).await.unwrap();
}

#[tokio::test]
async fn not_found_is_an_error_for_start_exec_and_netns() {
    let runtime = memory_runtime(Vec::new()).await;
    let ctx = Context::background();

    let start = runtime.start_container(&ctx, "ghost").await.unwrap_err();
    let exec = runtime.exec(&ctx, "ghost", &argv("true")).await.unwrap_err();
    let netns = runtime.get_ns_path(&ctx, "ghost").await.unwrap_err();

    assert!(start.is_not_found());
    assert!(exec.is_not_found());
    assert!(netns.is_not_found());
}

#[test_log::test(tokio::test)]
async fn container_state_machine() {
    let runtime = memory_runtime(Vec::new()).await;
    let ctx = Context::background();
    let node = NodeConfig::new("r1", IMAGE);

    runtime.create_container(&ctx, &node).await.unwrap();
    let created = runtime.list_containers(&ctx, &[]).await.unwrap();
    assert_eq!(created[0].state, "created");
    assert!(matches!(
        runtime.get_ns_path(&ctx, "r1").await,
        Err(RuntimeError::ContainerNotRunning { .. })
    ));

    let dup = runtime.create_container(&ctx, &node).await.unwrap_err();
    assert!(matches!(dup, RuntimeError::ContainerExists { .. }));

    runtime.start_container(&ctx, "r1").await.unwrap();
    runtime.start_container(&ctx, "r1").await.unwrap();
    let path = runtime.get_ns_path(&ctx, "r1").await.unwrap();
    assert!(path.starts_with("/proc/") && path.ends_with("/ns/net"));

    runtime.stop_container(&ctx, "r1").await.unwrap();
    runtime.stop_container(&ctx, "r1").await.unwrap();
    let stopped = runtime.list_containers(&ctx, &[]).await.unwrap();
    assert_eq!(stopped[0].state, "exited");
    assert_eq!(stopped[0].pid, 0);

    runtime.start_container(&ctx, "r1").await.unwrap();
    runtime.delete_container(&ctx, "r1").await.unwrap();
    runtime.delete_container(&ctx, "r1").await.unwrap();
    assert!(runtime.list_containers(&ctx, &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn host_network_container_has_no_netns() {
    let runtime = memory_runtime(Vec::new()).await;
    let node = NodeConfig::new("h1", IMAGE).with_network_mode("host");
    deploy(&runtime, &node).await;

    let err = runtime
        .get_ns_path(&Context::background(), "h1")
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::NoNetworkNamespace { .. }));
}

#[tokio::test]
async fn created_container_is_listed_by_name() {
    let runtime = memory_runtime(Vec::new()).await;
    let ctx = Context::background();

    runtime
        .create_container(&ctx, &NodeConfig::new("r1", IMAGE))
        .await
        .unwrap();
    runtime
        .create_container(&ctx, &NodeConfig::new("r10", IMAGE))
        .await
        .unwrap();

    let listed = runtime
        .list_containers(&ctx, &[GenericFilter::name("r1")])
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].has_name("r1"));
}

#[tokio::test]
async fn list_filters_are_conjunctive() {
    let runtime = memory_runtime(Vec::new()).await;
    let ctx = Context::background();

    for (name, role) in [("leaf1", "leaf"), ("leaf2", "leaf"), ("spine1", "spine")] {
        let node = NodeConfig::new(name, IMAGE)
            .with_label("clab-topo", "lab1")
            .with_label("role", role);
        runtime.create_container(&ctx, &node).await.unwrap();
    }
    let other = NodeConfig::new("client", IMAGE).with_label("clab-topo", "lab2");
    runtime.create_container(&ctx, &other).await.unwrap();

    let names = |containers: Vec<netlab_common::GenericContainer>| {
        let mut names: Vec<String> = containers.into_iter().flat_map(|c| c.names).collect();
        names.sort();
        names
    };

    let all = runtime.list_containers(&ctx, &[]).await.unwrap();
    assert_eq!(all.len(), 4);

    let lab1 = runtime
        .list_containers(&ctx, &[GenericFilter::label("clab-topo", "lab1")])
        .await
        .unwrap();
    assert_eq!(names(lab1), ["leaf1", "leaf2", "spine1"]);

    let overlapping = runtime
        .list_containers(
            &ctx,
            &[
                GenericFilter::label("clab-topo", "lab1"),
                GenericFilter::label("role", "leaf"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(names(overlapping), ["leaf1", "leaf2"]);

    let disjoint = runtime
        .list_containers(
            &ctx,
            &[
                GenericFilter::label("clab-topo", "lab2"),
                GenericFilter::label("role", "leaf"),
            ],
        )
        .await
        .unwrap();
    assert!(disjoint.is_empty());

    let has_role = runtime
        .list_containers(&ctx, &[GenericFilter::label_exists("role")])
        .await
        .unwrap();
    assert_eq!(has_role.len(), 3);
}

#[tokio::test]
async fn exec_reports_exit_code_without_failing() {
    let runtime = memory_runtime(Vec::new()).await;
    deploy(&runtime, &NodeConfig::new("r1", IMAGE)).await;
    let ctx = Context::background();

    let out = runtime.exec(&ctx, "r1", &argv("echo hello")).await.unwrap();
    assert!(out.success());
    assert_eq!(out.stdout_lossy(), "hello\n");

    let out = runtime.exec(&ctx, "r1", &argv("false")).await.unwrap();
    assert_eq!(out.exit_code, 1);
    assert!(matches!(
        out.into_result("r1"),
        Err(RuntimeError::ExecFailed { exit_code: 1, .. })
    ));

    let empty = runtime.exec(&ctx, "r1", &[]).await.unwrap_err();
    assert!(matches!(empty, RuntimeError::EmptyCommand { .. }));
}

#[tokio::test]
async fn exec_uses_custom_handler() {
    let mut runtime = MemoryRuntime::new()
        .with_image(IMAGE)
        .unwrap()
        .with_exec_handler(|name, cmd| netlab_runtime::ExecOutput {
            exit_code: 0,
            stdout: format!("{name}:{}", cmd.join(",")).into_bytes(),
            stderr: b"warn".to_vec(),
        });
    runtime.init(Vec::new()).await.unwrap();
    deploy(&runtime, &NodeConfig::new("r1", IMAGE)).await;

    let out = runtime
        .exec(&Context::background(), "r1", &argv("ip link"))
        .await
        .unwrap();
    assert_eq!(out.stdout_lossy(), "r1:ip,link");
    assert_eq!(out.stderr, b"warn");
}

#[tokio::test]
async fn exec_on_stopped_container_fails() {
    let runtime = memory_runtime(Vec::new()).await;
    let ctx = Context::background();
    runtime
        .create_container(&ctx, &NodeConfig::new("r1", IMAGE))
        .await
        .unwrap();

    let err = runtime.exec(&ctx, "r1", &argv("true")).await.unwrap_err();
    assert!(matches!(err, RuntimeError::ContainerNotRunning { .. }));
}

#[tokio::test]
async fn exec_not_wait_returns_before_completion() {
    let mut runtime = memory_runtime(Vec::new()).await;
    deploy(&runtime, &NodeConfig::new("r1", IMAGE)).await;
    runtime.set_latency(Duration::from_millis(200));

    let started = Instant::now();
    runtime
        .exec_not_wait(&Context::background(), "r1", &argv("sleep 1"))
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(200));
    assert!(runtime.exec_log().is_empty());

    let deadline = Instant::now() + Duration::from_secs(5);
    while runtime.exec_log().is_empty() {
        assert!(Instant::now() < deadline, "detached command never ran");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(runtime.exec_log()[0], ("r1".to_string(), argv("sleep 1")));
}

#[tokio::test]
async fn exec_not_wait_only_fails_on_launch() {
    let runtime = memory_runtime(Vec::new()).await;
    deploy(&runtime, &NodeConfig::new("r1", IMAGE)).await;
    let ctx = Context::background();

    // a failing command still launches fine
    runtime.exec_not_wait(&ctx, "r1", &argv("false")).await.unwrap();

    let err = runtime
        .exec_not_wait(&ctx, "ghost", &argv("true"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn pull_skips_present_images() {
    let runtime = memory_runtime(Vec::new()).await;
    let ctx = Context::background();

    runtime.pull_image_if_required(&ctx, IMAGE).await.unwrap();
    assert_eq!(runtime.pull_count(), 0);

    runtime.pull_image_if_required(&ctx, "alpine").await.unwrap();
    runtime
        .pull_image_if_required(&ctx, "docker.io/library/alpine:latest")
        .await
        .unwrap();
    assert_eq!(runtime.pull_count(), 1);
    assert!(runtime.has_image("alpine:latest"));

    let err = runtime
        .pull_image_if_required(&ctx, "alpine:")
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidImageReference { .. }));
}

#[tokio::test]
async fn cancelled_context_interrupts_blocking_calls() {
    let mut runtime = memory_runtime(Vec::new()).await;
    deploy(&runtime, &NodeConfig::new("r1", IMAGE)).await;
    runtime.set_latency(Duration::from_secs(30));

    let ctx = Context::background();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = runtime.exec(&ctx, "r1", &argv("true")).await.unwrap_err();
    assert!(err.is_cancellation());
    assert!(started.elapsed() < Duration::from_secs(2));

    // already-cancelled contexts fail immediately
    let started = Instant::now();
    let create = runtime
        .create_container(&ctx, &NodeConfig::new("r2", IMAGE))
        .await
        .unwrap_err();
    let pull = runtime
        .pull_image_if_required(&ctx, "frrouting/frr:v8.4.1")
        .await
        .unwrap_err();
    let present = runtime
        .pull_image_if_required(&ctx, IMAGE)
        .await
        .unwrap_err();
    assert!(matches!(create, RuntimeError::Cancelled { .. }));
    assert!(matches!(pull, RuntimeError::Cancelled { .. }));
    assert!(matches!(present, RuntimeError::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(runtime.pull_count(), 0);
    assert!(runtime.exec_log().is_empty());
}

#[tokio::test]
async fn deadline_interrupts_blocking_calls() {
    let mut runtime = memory_runtime(Vec::new()).await;
    runtime.set_latency(Duration::from_secs(30));

    let ctx = Context::with_timeout(Duration::from_millis(50));
    let started = Instant::now();
    let err = runtime
        .pull_image_if_required(&ctx, "alpine")
        .await
        .unwrap_err();

    assert!(matches!(err, RuntimeError::DeadlineExceeded { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!runtime.has_image("alpine"));
}

#[tokio::test]
async fn handle_streams_lifecycle_events() {
    let runtime = memory_runtime(Vec::new()).await;
    let ctx = Context::background();

    let mut handle = runtime
        .create_container(&ctx, &NodeConfig::new("r1", IMAGE))
        .await
        .unwrap();
    assert_eq!(handle.name, "r1");
    assert_eq!(handle.id.short().len(), 12);

    runtime.start_container(&ctx, "r1").await.unwrap();
    runtime.stop_container(&ctx, "r1").await.unwrap();
    runtime.delete_container(&ctx, "r1").await.unwrap();

    let events = handle.events.as_mut().unwrap();
    assert!(matches!(events.recv().await, Some(LifecycleEvent::Created { .. })));
    assert!(matches!(events.recv().await, Some(LifecycleEvent::Started { .. })));
    assert!(matches!(events.recv().await, Some(LifecycleEvent::Stopped { .. })));
    assert!(matches!(events.recv().await, Some(LifecycleEvent::Deleted { .. })));
}

#[tokio::test]
async fn init_failure_is_passed_through() {
    let mut runtime = MemoryRuntime::new().with_init_failure("daemon unreachable");
    let err = runtime.init(Vec::new()).await.unwrap_err();

    match err {
        RuntimeError::Backend { backend, source } => {
            assert_eq!(backend, "memory");
            assert_eq!(source.to_string(), "daemon unreachable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn distinct_containers_can_be_driven_concurrently() {
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(memory_runtime(Vec::new()).await);

    let tasks = (0..8).map(|i| {
        let runtime = Arc::clone(&runtime);
        tokio::spawn(async move {
            let node = NodeConfig::new(format!("n{i}"), IMAGE);
            deploy(runtime.as_ref(), &node).await;
        })
    });
    for result in futures::future::join_all(tasks).await {
        result.unwrap();
    }

    let running = runtime
        .list_containers(&Context::background(), &[])
        .await
        .unwrap();
    assert_eq!(running.len(), 8);
    assert!(running.iter().all(|c| c.state == "running"));

    let mut pids: Vec<u32> = running.iter().map(|c| c.pid).collect();
    pids.sort_unstable();
    pids.dedup();
    assert_eq!(pids.len(), 8);
}
