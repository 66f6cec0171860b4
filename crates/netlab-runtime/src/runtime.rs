//! The capability contract every container runtime backend implements.

use async_trait::async_trait;
use netlab_common::{GenericContainer, GenericFilter, MgmtNet, NodeConfig, RuntimeError, RuntimeResult};

use crate::config::RuntimeConfig;
use crate::context::Context;
use crate::events::ContainerHandle;
use crate::option::RuntimeOption;

/// Registry name of the Linux-container engine backend.
pub const DOCKER_RUNTIME: &str = "docker";
/// Registry name of the micro-VM engine backend.
pub const IGNITE_RUNTIME: &str = "ignite";
/// Registry name of the in-process reference backend.
pub const MEMORY_RUNTIME: &str = "memory";

/// Captured result of [`ContainerRuntime::exec`].
///
/// A non-zero exit code is reported here, not as an error; see
/// [`ExecOutput::into_result`] for the strict form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code of the command.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    /// Whether the command exited with code 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Standard output as lossy UTF-8.
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error as lossy UTF-8.
    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Treat a non-zero exit code as an error.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ExecFailed`] if the command did not exit 0.
    pub fn into_result(self, container: &str) -> RuntimeResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(RuntimeError::ExecFailed {
                name: container.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr_lossy(),
            })
        }
    }
}

/// Uniform lifecycle surface of a container or VM backend.
///
/// A fresh instance comes from a registry initializer and must be passed
/// through [`ContainerRuntime::init`] exactly once before any network or
/// container operation. Setters take `&mut self` and are only meant to be
/// called from options during `init`; every other operation takes `&self`
/// so an initialized runtime can be shared and driven concurrently for
/// distinct container names. Calls for the same name are not serialized.
///
/// Every blocking operation takes a [`Context`] and returns
/// [`RuntimeError::Cancelled`] or [`RuntimeError::DeadlineExceeded`]
/// promptly once it ends. Backend errors are passed through as
/// [`RuntimeError::Backend`] without translation.
///
/// # Exec policy
///
/// [`ContainerRuntime::exec`] only fails on transport or attach problems
/// (unknown container, container not running, cancellation). A command that
/// runs and exits non-zero is a successful call whose [`ExecOutput`] carries
/// the exit code.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Apply `options` in order and connect to the backend.
    ///
    /// # Errors
    ///
    /// Fails if the backend cannot be reached or if the instance was
    /// already initialized.
    async fn init(&mut self, options: Vec<RuntimeOption>) -> RuntimeResult<()>;

    /// Store the runtime configuration.
    fn with_config(&mut self, config: RuntimeConfig);

    /// Record the management network used by `create_net`/`delete_net`.
    fn with_mgmt_net(&mut self, mgmt: MgmtNet);

    /// Keep the management network on `delete_net`.
    fn with_keep_mgmt_net(&mut self);

    /// Create the management network. Creating an existing network succeeds.
    async fn create_net(&self, ctx: &Context) -> RuntimeResult<()>;

    /// Delete the management network.
    ///
    /// A no-op when the keep flag is set or the network is absent.
    async fn delete_net(&self, ctx: &Context) -> RuntimeResult<()>;

    /// Pull `image` unless it is already present locally.
    async fn pull_image_if_required(&self, ctx: &Context, image: &str) -> RuntimeResult<()>;

    /// Create, but do not start, the container for `node`.
    async fn create_container(&self, ctx: &Context, node: &NodeConfig) -> RuntimeResult<ContainerHandle>;

    /// Start a previously created container.
    async fn start_container(&self, ctx: &Context, name: &str) -> RuntimeResult<()>;

    /// Stop a container. Stopping a stopped or absent container succeeds.
    async fn stop_container(&self, ctx: &Context, name: &str) -> RuntimeResult<()>;

    /// List containers matching every filter; an empty slice matches all.
    /// Order is backend-defined.
    async fn list_containers(
        &self,
        ctx: &Context,
        filters: &[GenericFilter],
    ) -> RuntimeResult<Vec<GenericContainer>>;

    /// Filesystem path of a running container's network namespace.
    async fn get_ns_path(&self, ctx: &Context, name: &str) -> RuntimeResult<String>;

    /// Run `cmd` in the container and capture its output.
    async fn exec(&self, ctx: &Context, name: &str, cmd: &[String]) -> RuntimeResult<ExecOutput>;

    /// Launch `cmd` in the container without waiting for it to finish.
    async fn exec_not_wait(&self, ctx: &Context, name: &str, cmd: &[String]) -> RuntimeResult<()>;

    /// Delete a container. Deleting an absent container succeeds.
    async fn delete_container(&self, ctx: &Context, name: &str) -> RuntimeResult<()>;

    /// The stored configuration, by value.
    fn config(&self) -> RuntimeConfig;

    /// The name the backend is registered under.
    fn name(&self) -> &str;
}
