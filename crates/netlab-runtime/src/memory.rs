//! In-process reference backend.
//!
//! [`MemoryRuntime`] keeps networks, images and containers in process
//! memory and honours the whole [`ContainerRuntime`] contract. It backs dry
//! runs and is the runtime the contract tests drive. An optional simulated
//! latency is applied to every blocking call so cancellation behaviour can
//! be observed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netlab_common::{
    ContainerId, ContainerName, GenericContainer, GenericFilter, ImageReference, MgmtNet,
    NetworkSettings, NodeConfig, RuntimeError, RuntimeResult,
};
use parking_lot::Mutex;

use crate::config::RuntimeConfig;
use crate::context::Context;
use crate::events::{ContainerHandle, EventBus, LifecycleEvent};
use crate::option::RuntimeOption;
use crate::runtime::{ContainerRuntime, ExecOutput, MEMORY_RUNTIME};

/// Computes the output of a command run through [`MemoryRuntime::exec`].
///
/// Receives the container name and the argument vector.
pub type ExecHandler = Arc<dyn Fn(&str, &[String]) -> ExecOutput + Send + Sync>;

/// Container status tracked by the memory backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Created,
    Running,
    Stopped,
}

impl Status {
    const fn state(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopped => "exited",
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryContainer {
    id: ContainerId,
    node: NodeConfig,
    image: String,
    status: Status,
    pid: Option<u32>,
    ipv4: Option<Ipv4Addr>,
    ipv6: Option<String>,
}

impl MemoryContainer {
    fn to_generic(&self, mgmt: Option<&MgmtNet>) -> GenericContainer {
        let v4_subnet = mgmt.and_then(|m| Ipv4Subnet::parse(&m.ipv4_subnet).ok());
        let v6_subnet = mgmt.and_then(|m| parse_ipv6_subnet(&m.ipv6_subnet));

        let mut network_settings = NetworkSettings::default();
        if let Some(addr) = self.ipv4 {
            network_settings.ipv4_addr = addr.to_string();
            if let Some(subnet) = v4_subnet.filter(|s| s.contains(addr)) {
                network_settings.ipv4_prefix_len = subnet.prefix_len;
                network_settings.ipv4_gateway = subnet.gateway().to_string();
            }
        }
        if let Some(addr) = &self.ipv6 {
            network_settings.ipv6_addr.clone_from(addr);
            if let Some((network, prefix_len)) = v6_subnet {
                network_settings.ipv6_prefix_len = prefix_len;
                network_settings.ipv6_gateway =
                    Ipv6Addr::from(u128::from(network).saturating_add(1)).to_string();
            }
        }

        GenericContainer {
            names: vec![self.node.container_name().to_string()],
            id: self.id.to_string(),
            short_id: self.id.short().to_string(),
            image: self.image.clone(),
            state: self.status.state().to_string(),
            status: match self.status {
                Status::Created => "Created".to_string(),
                Status::Running => "Up".to_string(),
                Status::Stopped => "Exited (0)".to_string(),
            },
            labels: self.node.labels.clone(),
            pid: self.pid.unwrap_or_default(),
            network_settings,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    networks: BTreeSet<String>,
    images: BTreeSet<String>,
    containers: BTreeMap<String, MemoryContainer>,
    pulls: usize,
    next_pid: u32,
    exec_log: Vec<(String, Vec<String>)>,
}

impl MemoryState {
    fn container(&self, name: &str) -> RuntimeResult<&MemoryContainer> {
        self.containers
            .get(name)
            .ok_or_else(|| RuntimeError::ContainerNotFound {
                name: name.to_string(),
            })
    }

    fn running_container(&self, name: &str) -> RuntimeResult<&MemoryContainer> {
        let container = self.container(name)?;
        if container.status == Status::Running {
            Ok(container)
        } else {
            Err(RuntimeError::ContainerNotRunning {
                name: name.to_string(),
            })
        }
    }

    fn ipv4_in_use(&self, addr: Ipv4Addr) -> bool {
        self.containers.values().any(|c| c.ipv4 == Some(addr))
    }

    /// Lowest free host address of `subnet`, skipping the gateway and every
    /// address held by an existing container.
    fn allocate_ipv4(&self, subnet: Ipv4Subnet) -> Option<Ipv4Addr> {
        subnet.hosts().find(|addr| !self.ipv4_in_use(*addr))
    }
}

/// An IPv4 management subnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ipv4Subnet {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Subnet {
    fn parse(cidr: &str) -> RuntimeResult<Self> {
        let invalid = || RuntimeError::Config {
            message: format!("invalid IPv4 subnet: {cidr}"),
        };
        let (addr, len) = cidr.split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix_len: u8 = len.parse().map_err(|_| invalid())?;
        if prefix_len > 32 {
            return Err(invalid());
        }
        Ok(Self {
            network: Ipv4Addr::from(u32::from(addr) & Self::mask(prefix_len)),
            prefix_len,
        })
    }

    const fn mask(prefix_len: u8) -> u32 {
        if prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - prefix_len)
        }
    }

    fn broadcast(self) -> u32 {
        u32::from(self.network) | !Self::mask(self.prefix_len)
    }

    fn gateway(self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network).saturating_add(1))
    }

    fn contains(self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & Self::mask(self.prefix_len) == u32::from(self.network)
    }

    /// Assignable container addresses: everything between the gateway and
    /// the broadcast address, exclusive.
    fn hosts(self) -> impl Iterator<Item = Ipv4Addr> {
        let first = u32::from(self.network).saturating_add(2);
        let last = self.broadcast().saturating_sub(1);
        (first..=last).map(Ipv4Addr::from)
    }
}

impl fmt::Display for Ipv4Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

fn parse_ipv6_subnet(cidr: &str) -> Option<(Ipv6Addr, u8)> {
    let (addr, len) = cidr.split_once('/')?;
    let addr: Ipv6Addr = addr.parse().ok()?;
    let prefix_len: u8 = len.parse().ok().filter(|len| *len <= 128)?;
    let mask = if prefix_len == 0 {
        0
    } else {
        u128::MAX << (128 - prefix_len)
    };
    Some((Ipv6Addr::from(u128::from(addr) & mask), prefix_len))
}

/// Static addresses may carry a prefix length (`172.20.20.5/24`).
fn parse_static_ipv4(addr: &str) -> RuntimeResult<Ipv4Addr> {
    addr.split_once('/')
        .map_or(addr, |(a, _)| a)
        .parse()
        .map_err(|_| RuntimeError::Config {
            message: format!("invalid management IPv4 address: {addr}"),
        })
}

/// Runtime backend that keeps all state in memory.
pub struct MemoryRuntime {
    name: String,
    config: RuntimeConfig,
    mgmt: Option<MgmtNet>,
    initialized: bool,
    init_failure: Option<String>,
    latency: Duration,
    exec_handler: ExecHandler,
    state: Arc<Mutex<MemoryState>>,
    events: EventBus,
}

impl fmt::Debug for MemoryRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRuntime")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("mgmt", &self.mgmt)
            .field("initialized", &self.initialized)
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

impl Default for MemoryRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRuntime {
    /// PID handed to the first started container.
    const FIRST_PID: u32 = 1000;

    /// Create an uninitialized runtime registered as `memory`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_name(MEMORY_RUNTIME)
    }

    /// Create an uninitialized runtime reporting `name` from
    /// [`ContainerRuntime::name`].
    #[must_use]
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: RuntimeConfig::default(),
            mgmt: None,
            initialized: false,
            init_failure: None,
            latency: Duration::ZERO,
            exec_handler: Arc::new(default_exec),
            state: Arc::new(Mutex::new(MemoryState {
                next_pid: Self::FIRST_PID,
                ..MemoryState::default()
            })),
            events: EventBus::new(),
        }
    }

    /// Delay every blocking call by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Change the simulated latency of an existing runtime.
    pub const fn set_latency(&mut self, latency: Duration) {
        self.latency = latency;
    }

    /// Mark `image` as already present locally.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidImageReference`] for malformed images.
    pub fn with_image(self, image: &str) -> RuntimeResult<Self> {
        let reference = ImageReference::parse(image)?;
        self.state.lock().images.insert(reference.full_reference());
        Ok(self)
    }

    /// Replace the command interpreter used by `exec`.
    #[must_use]
    pub fn with_exec_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &[String]) -> ExecOutput + Send + Sync + 'static,
    {
        self.exec_handler = Arc::new(handler);
        self
    }

    /// Make `init` fail as if the backend were unreachable.
    #[must_use]
    pub fn with_init_failure(mut self, message: impl Into<String>) -> Self {
        self.init_failure = Some(message.into());
        self
    }

    /// The recorded management network.
    #[must_use]
    pub const fn mgmt_net(&self) -> Option<&MgmtNet> {
        self.mgmt.as_ref()
    }

    /// Whether a network called `name` exists.
    #[must_use]
    pub fn has_network(&self, name: &str) -> bool {
        self.state.lock().networks.contains(name)
    }

    /// Whether `image` is present locally.
    #[must_use]
    pub fn has_image(&self, image: &str) -> bool {
        ImageReference::parse(image)
            .is_ok_and(|r| self.state.lock().images.contains(&r.full_reference()))
    }

    /// Number of image pulls performed.
    #[must_use]
    pub fn pull_count(&self) -> usize {
        self.state.lock().pulls
    }

    /// Commands executed so far, as `(container, argv)` pairs.
    #[must_use]
    pub fn exec_log(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().exec_log.clone()
    }

    fn ensure_initialized(&self) -> RuntimeResult<()> {
        if self.initialized {
            Ok(())
        } else {
            Err(RuntimeError::NotInitialized {
                runtime: self.name.clone(),
            })
        }
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn validate_exec(&self, name: &str, cmd: &[String]) -> RuntimeResult<()> {
        if cmd.is_empty() {
            return Err(RuntimeError::EmptyCommand {
                name: name.to_string(),
            });
        }
        self.state.lock().running_container(name).map(|_| ())
    }
}

/// Understands `echo`, `true`, `false` and `hostname`; anything else exits
/// 127.
fn default_exec(container: &str, cmd: &[String]) -> ExecOutput {
    match cmd.first().map(String::as_str) {
        Some("echo") => ExecOutput {
            exit_code: 0,
            stdout: format!("{}\n", cmd[1..].join(" ")).into_bytes(),
            stderr: Vec::new(),
        },
        Some("true") => ExecOutput::default(),
        Some("false") => ExecOutput {
            exit_code: 1,
            ..ExecOutput::default()
        },
        Some("hostname") => ExecOutput {
            exit_code: 0,
            stdout: format!("{container}\n").into_bytes(),
            stderr: Vec::new(),
        },
        Some(other) => ExecOutput {
            exit_code: 127,
            stdout: Vec::new(),
            stderr: format!("{other}: command not found\n").into_bytes(),
        },
        None => ExecOutput::default(),
    }
}

#[async_trait]
impl ContainerRuntime for MemoryRuntime {
    async fn init(&mut self, options: Vec<RuntimeOption>) -> RuntimeResult<()> {
        if self.initialized {
            return Err(RuntimeError::AlreadyInitialized {
                runtime: self.name.clone(),
            });
        }

        RuntimeOption::apply_all(&options, &mut *self);

        if let Some(message) = &self.init_failure {
            return Err(RuntimeError::backend(
                self.name.clone(),
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, message.clone()),
            ));
        }

        self.initialized = true;
        tracing::debug!(
            runtime = %self.name,
            timeout = ?self.config.timeout,
            keep_mgmt_net = self.config.keep_mgmt_net,
            "Memory runtime ready"
        );
        Ok(())
    }

    fn with_config(&mut self, config: RuntimeConfig) {
        self.config = config;
    }

    fn with_mgmt_net(&mut self, mgmt: MgmtNet) {
        self.mgmt = Some(mgmt);
    }

    fn with_keep_mgmt_net(&mut self) {
        self.config.keep_mgmt_net = true;
    }

    async fn create_net(&self, ctx: &Context) -> RuntimeResult<()> {
        self.ensure_initialized()?;
        let mgmt = self.mgmt.as_ref().ok_or_else(|| RuntimeError::MissingOption {
            option: "mgmt network".to_string(),
        })?;

        ctx.run("create network", async {
            self.simulate_latency().await;
            if self.state.lock().networks.insert(mgmt.network.clone()) {
                tracing::info!(runtime = %self.name, network = %mgmt.network, "Created management network");
            } else {
                tracing::debug!(runtime = %self.name, network = %mgmt.network, "Management network already exists");
            }
            Ok(())
        })
        .await
    }

    async fn delete_net(&self, ctx: &Context) -> RuntimeResult<()> {
        self.ensure_initialized()?;
        let Some(mgmt) = &self.mgmt else {
            return Ok(());
        };
        if self.config.keep_mgmt_net {
            tracing::debug!(runtime = %self.name, network = %mgmt.network, "Keeping management network");
            return Ok(());
        }

        ctx.run("delete network", async {
            self.simulate_latency().await;
            if self.state.lock().networks.remove(&mgmt.network) {
                tracing::info!(runtime = %self.name, network = %mgmt.network, "Deleted management network");
            } else {
                tracing::debug!(runtime = %self.name, network = %mgmt.network, "Management network already absent");
            }
            Ok(())
        })
        .await
    }

    async fn pull_image_if_required(&self, ctx: &Context, image: &str) -> RuntimeResult<()> {
        self.ensure_initialized()?;
        let reference = ImageReference::parse(image)?.full_reference();
        ctx.check("pull image")?;

        if self.state.lock().images.contains(&reference) {
            tracing::debug!(runtime = %self.name, image = %reference, "Image present, skipping pull");
            return Ok(());
        }

        ctx.run("pull image", async {
            tracing::info!(runtime = %self.name, image = %reference, "Pulling image");
            self.simulate_latency().await;
            let mut state = self.state.lock();
            if state.images.insert(reference.clone()) {
                state.pulls += 1;
            }
            Ok(())
        })
        .await
    }

    async fn create_container(&self, ctx: &Context, node: &NodeConfig) -> RuntimeResult<ContainerHandle> {
        self.ensure_initialized()?;
        let name = ContainerName::new(node.container_name())?;
        let image = ImageReference::parse(&node.image)?.full_reference();

        ctx.run("create container", async {
            self.simulate_latency().await;

            let id = ContainerId::generate();
            {
                let mut state = self.state.lock();
                if state.containers.contains_key(name.as_str()) {
                    return Err(RuntimeError::ContainerExists {
                        name: name.to_string(),
                    });
                }
                if !state.images.contains(&image) {
                    return Err(RuntimeError::backend(
                        self.name.clone(),
                        format!("no such image: {image}"),
                    ));
                }

                let ipv4 = match (&node.mgmt_ipv4_address, &self.mgmt) {
                    _ if node.uses_host_network() => None,
                    (Some(addr), _) => {
                        let addr = parse_static_ipv4(addr)?;
                        if state.ipv4_in_use(addr) {
                            return Err(RuntimeError::backend(
                                self.name.clone(),
                                format!("address {addr} is already in use"),
                            ));
                        }
                        Some(addr)
                    }
                    (None, Some(mgmt)) => {
                        let subnet = Ipv4Subnet::parse(&mgmt.ipv4_subnet)?;
                        let addr = state.allocate_ipv4(subnet).ok_or_else(|| {
                            RuntimeError::backend(
                                self.name.clone(),
                                format!("no free address left in {subnet}"),
                            )
                        })?;
                        Some(addr)
                    }
                    (None, None) => None,
                };
                let ipv6 = node
                    .mgmt_ipv6_address
                    .as_ref()
                    .filter(|_| !node.uses_host_network())
                    .map(|addr| addr.split_once('/').map_or(addr.as_str(), |(a, _)| a).to_string());
                state.containers.insert(
                    name.to_string(),
                    MemoryContainer {
                        id: id.clone(),
                        node: node.clone(),
                        image: node.image.clone(),
                        status: Status::Created,
                        pid: None,
                        ipv4,
                        ipv6,
                    },
                );
            }

            let events = self.events.subscribe(name.as_str());
            self.events.publish(LifecycleEvent::created(name.as_str()));
            tracing::info!(runtime = %self.name, container = %name, id = %id.short(), "Created container");

            Ok(ContainerHandle::new(id, name.as_str()).with_events(events))
        })
        .await
    }

    async fn start_container(&self, ctx: &Context, name: &str) -> RuntimeResult<()> {
        self.ensure_initialized()?;

        ctx.run("start container", async {
            self.simulate_latency().await;
            {
                let mut state = self.state.lock();
                let pid = state.next_pid;
                let container = state.containers.get_mut(name).ok_or_else(|| {
                    RuntimeError::ContainerNotFound {
                        name: name.to_string(),
                    }
                })?;
                if container.status == Status::Running {
                    tracing::debug!(runtime = %self.name, container = %name, "Container already running");
                    return Ok(());
                }
                container.status = Status::Running;
                container.pid = Some(pid);
                state.next_pid += 1;
            }

            self.events.publish(LifecycleEvent::started(name));
            tracing::info!(runtime = %self.name, container = %name, "Started container");
            Ok(())
        })
        .await
    }

    async fn stop_container(&self, ctx: &Context, name: &str) -> RuntimeResult<()> {
        self.ensure_initialized()?;

        ctx.run("stop container", async {
            self.simulate_latency().await;
            {
                let mut state = self.state.lock();
                match state.containers.get_mut(name) {
                    Some(container) if container.status == Status::Running => {
                        container.status = Status::Stopped;
                        container.pid = None;
                    }
                    _ => {
                        tracing::debug!(runtime = %self.name, container = %name, "Container not running, nothing to stop");
                        return Ok(());
                    }
                }
            }

            self.events.publish(LifecycleEvent::stopped(name));
            tracing::info!(runtime = %self.name, container = %name, "Stopped container");
            Ok(())
        })
        .await
    }

    async fn list_containers(
        &self,
        ctx: &Context,
        filters: &[GenericFilter],
    ) -> RuntimeResult<Vec<GenericContainer>> {
        self.ensure_initialized()?;

        ctx.run("list containers", async {
            self.simulate_latency().await;
            let state = self.state.lock();
            Ok(state
                .containers
                .values()
                .map(|c| c.to_generic(self.mgmt.as_ref()))
                .filter(|c| GenericFilter::match_all(filters, c))
                .collect())
        })
        .await
    }

    async fn get_ns_path(&self, ctx: &Context, name: &str) -> RuntimeResult<String> {
        self.ensure_initialized()?;

        ctx.run("get netns path", async {
            self.simulate_latency().await;
            let state = self.state.lock();
            let container = state.container(name)?;
            if container.node.uses_host_network() {
                return Err(RuntimeError::NoNetworkNamespace {
                    name: name.to_string(),
                });
            }
            let pid = state.running_container(name)?.pid.ok_or_else(|| {
                RuntimeError::ContainerNotRunning {
                    name: name.to_string(),
                }
            })?;
            Ok(format!("/proc/{pid}/ns/net"))
        })
        .await
    }

    async fn exec(&self, ctx: &Context, name: &str, cmd: &[String]) -> RuntimeResult<ExecOutput> {
        self.ensure_initialized()?;
        self.validate_exec(name, cmd)?;

        ctx.run("exec", async {
            self.simulate_latency().await;
            // the container may have been stopped while we waited
            self.state.lock().running_container(name)?;
            let output = (self.exec_handler)(name, cmd);
            self.state
                .lock()
                .exec_log
                .push((name.to_string(), cmd.to_vec()));
            tracing::debug!(
                runtime = %self.name,
                container = %name,
                ?cmd,
                exit_code = output.exit_code,
                "Executed command"
            );
            Ok(output)
        })
        .await
    }

    async fn exec_not_wait(&self, ctx: &Context, name: &str, cmd: &[String]) -> RuntimeResult<()> {
        self.ensure_initialized()?;
        ctx.check("exec")?;
        self.validate_exec(name, cmd)?;

        let state = Arc::clone(&self.state);
        let handler = Arc::clone(&self.exec_handler);
        let latency = self.latency;
        let container = name.to_string();
        let cmd = cmd.to_vec();

        tokio::spawn(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let output = handler(&container, &cmd);
            tracing::debug!(container = %container, ?cmd, exit_code = output.exit_code, "Detached command finished");
            state.lock().exec_log.push((container, cmd));
        });

        tracing::debug!(runtime = %self.name, container = %name, "Launched detached command");
        Ok(())
    }

    async fn delete_container(&self, ctx: &Context, name: &str) -> RuntimeResult<()> {
        self.ensure_initialized()?;

        ctx.run("delete container", async {
            self.simulate_latency().await;
            let removed = self.state.lock().containers.remove(name);
            match removed {
                Some(container) => {
                    // without graceful shutdown a running container is killed
                    // and removed in one step, with no stop transition
                    if container.status == Status::Running && self.config.graceful_shutdown {
                        self.events.publish(LifecycleEvent::stopped(name));
                    }
                    self.events.publish(LifecycleEvent::deleted(name));
                    tracing::info!(runtime = %self.name, container = %name, "Deleted container");
                }
                None => {
                    tracing::debug!(runtime = %self.name, container = %name, "Container already absent");
                }
            }
            Ok(())
        })
        .await
    }

    fn config(&self) -> RuntimeConfig {
        self.config
    }

    fn name(&self) -> &str {
        &self.name
    }
}
