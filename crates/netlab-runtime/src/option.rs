//! Options applied to a runtime during initialization.

use netlab_common::MgmtNet;

use crate::config::RuntimeConfig;
use crate::runtime::ContainerRuntime;

/// A configuration delta applied to a runtime by [`ContainerRuntime::init`].
///
/// Applying an option calls exactly the matching setter with the captured
/// value and nothing else, so reapplying an option leaves the runtime
/// unchanged. When two options touch the same setting the last one wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeOption {
    /// Calls [`ContainerRuntime::with_config`].
    Config(RuntimeConfig),
    /// Calls [`ContainerRuntime::with_mgmt_net`].
    MgmtNet(MgmtNet),
    /// Calls [`ContainerRuntime::with_keep_mgmt_net`].
    KeepMgmtNet,
}

impl RuntimeOption {
    /// Apply this option to `runtime`.
    pub fn apply(&self, runtime: &mut dyn ContainerRuntime) {
        match self {
            Self::Config(config) => runtime.with_config(*config),
            Self::MgmtNet(mgmt) => runtime.with_mgmt_net(mgmt.clone()),
            Self::KeepMgmtNet => runtime.with_keep_mgmt_net(),
        }
    }

    /// Apply `options` in order.
    pub fn apply_all(options: &[Self], runtime: &mut dyn ContainerRuntime) {
        for option in options {
            tracing::trace!(runtime = %runtime.name(), ?option, "Applying runtime option");
            option.apply(runtime);
        }
    }
}

/// Store `config` on the runtime.
#[must_use]
pub const fn with_config(config: RuntimeConfig) -> RuntimeOption {
    RuntimeOption::Config(config)
}

/// Hand the management network to the runtime.
#[must_use]
pub const fn with_mgmt_net(mgmt: MgmtNet) -> RuntimeOption {
    RuntimeOption::MgmtNet(mgmt)
}

/// Keep the management network on teardown.
#[must_use]
pub const fn with_keep_mgmt_net() -> RuntimeOption {
    RuntimeOption::KeepMgmtNet
}

/// Build the option list for a runtime from parsed topology settings.
#[must_use]
pub fn options_for(config: RuntimeConfig, mgmt: MgmtNet) -> Vec<RuntimeOption> {
    let mut options = vec![with_config(config), with_mgmt_net(mgmt)];
    if config.keep_mgmt_net {
        options.push(with_keep_mgmt_net());
    }
    options
}
