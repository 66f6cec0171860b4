//! # netlab-runtime
//!
//! Pluggable container runtime core for network topology emulation.
//!
//! The orchestrator picks a backend by name, gets a bare runtime from the
//! [`RuntimeRegistry`], initializes it with a list of [`RuntimeOption`]s and
//! then drives every topology node through the [`ContainerRuntime`]
//! contract without knowing which backend it talks to.
//!
//! ## Usage
//!
//! ```no_run
//! use netlab_common::{MgmtNet, NodeConfig};
//! use netlab_runtime::{Context, RuntimeConfig, RuntimeRegistry, option};
//!
//! # async fn example() -> netlab_common::RuntimeResult<()> {
//! let registry = RuntimeRegistry::with_builtin();
//! let runtime = registry
//!     .init_runtime(
//!         "memory",
//!         vec![
//!             option::with_config(RuntimeConfig::default()),
//!             option::with_mgmt_net(MgmtNet::new("clab")),
//!         ],
//!     )
//!     .await?;
//!
//! let ctx = Context::background();
//! runtime.create_net(&ctx).await?;
//! runtime.pull_image_if_required(&ctx, "alpine:3.20").await?;
//! runtime
//!     .create_container(&ctx, &NodeConfig::new("r1", "alpine:3.20"))
//!     .await?;
//! runtime.start_container(&ctx, "r1").await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod events;
pub mod memory;
pub mod option;
pub mod registry;
pub mod runtime;

pub use config::RuntimeConfig;
pub use context::Context;
pub use events::{ContainerHandle, EventBus, EventSubscription, LifecycleEvent};
pub use memory::MemoryRuntime;
pub use option::RuntimeOption;
pub use registry::{Initializer, RuntimeRegistry, resolve_runtime_name};
pub use runtime::{ContainerRuntime, DOCKER_RUNTIME, ExecOutput, IGNITE_RUNTIME, MEMORY_RUNTIME};
