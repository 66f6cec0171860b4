//! Name-keyed registry of runtime backends.
//!
//! Backends register an [`Initializer`] under a name during start-up; the
//! orchestrator later resolves a configured name to a fresh runtime. The
//! process-wide registry returned by [`global`] is meant to be written
//! before the first lookup and only read afterwards. Tests build isolated
//! [`RuntimeRegistry`] values instead.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use netlab_common::{RuntimeError, RuntimeResult};
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::memory::MemoryRuntime;
use crate::option::RuntimeOption;
use crate::runtime::{ContainerRuntime, DOCKER_RUNTIME, MEMORY_RUNTIME};

/// Environment variable consulted by [`resolve_runtime_name`].
pub const RUNTIME_ENV_VAR: &str = "NETLAB_RUNTIME";

/// Produces a fresh, uninitialized runtime.
pub type Initializer = Arc<dyn Fn() -> Box<dyn ContainerRuntime> + Send + Sync>;

/// Maps backend names to initializers.
#[derive(Clone, Default)]
pub struct RuntimeRegistry {
    initializers: HashMap<String, Initializer>,
}

impl fmt::Debug for RuntimeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeRegistry")
            .field("runtimes", &self.names())
            .finish()
    }
}

impl RuntimeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the in-process `memory` backend registered.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(MEMORY_RUNTIME, || Box::new(MemoryRuntime::new()));
        registry
    }

    /// Register `init` under `name`, replacing any previous initializer.
    pub fn register<F>(&mut self, name: impl Into<String>, init: F)
    where
        F: Fn() -> Box<dyn ContainerRuntime> + Send + Sync + 'static,
    {
        self.register_initializer(name, Arc::new(init));
    }

    /// Register a shared initializer under `name`, replacing any previous
    /// one.
    pub fn register_initializer(&mut self, name: impl Into<String>, init: Initializer) {
        let name = name.into();
        if self.initializers.insert(name.clone(), init).is_some() {
            tracing::debug!(runtime = %name, "Replaced registered container runtime");
        } else {
            tracing::debug!(runtime = %name, "Registered container runtime");
        }
    }

    /// Look up the initializer registered under `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Initializer> {
        self.initializers.get(name).cloned()
    }

    /// Whether a backend is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.initializers.contains_key(name)
    }

    /// Registered backend names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.initializers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.initializers.len()
    }

    /// Whether no backend is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.initializers.is_empty()
    }

    /// Produce a bare runtime for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownRuntime`] if nothing is registered
    /// under `name`.
    pub fn instantiate(&self, name: &str) -> RuntimeResult<Box<dyn ContainerRuntime>> {
        let init = self.lookup(name).ok_or_else(|| RuntimeError::UnknownRuntime {
            name: name.to_string(),
        })?;
        Ok(init())
    }

    /// Produce a runtime for `name` and initialize it with `options`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownRuntime`] before any backend I/O, or
    /// whatever the backend's `init` reports.
    pub async fn init_runtime(
        &self,
        name: &str,
        options: Vec<RuntimeOption>,
    ) -> RuntimeResult<Box<dyn ContainerRuntime>> {
        let mut runtime = self.instantiate(name)?;
        runtime.init(options).await?;
        tracing::info!(runtime = %name, "Container runtime initialized");
        Ok(runtime)
    }
}

static GLOBAL: Lazy<RwLock<RuntimeRegistry>> =
    Lazy::new(|| RwLock::new(RuntimeRegistry::with_builtin()));

/// The process-wide registry.
pub fn global() -> &'static RwLock<RuntimeRegistry> {
    &GLOBAL
}

/// Register `init` under `name` in the process-wide registry.
pub fn register<F>(name: impl Into<String>, init: F)
where
    F: Fn() -> Box<dyn ContainerRuntime> + Send + Sync + 'static,
{
    GLOBAL.write().register(name, init);
}

/// Look up `name` in the process-wide registry.
#[must_use]
pub fn lookup(name: &str) -> Option<Initializer> {
    GLOBAL.read().lookup(name)
}

/// Pick the runtime name: `explicit` if given, else the `NETLAB_RUNTIME`
/// environment variable if set and non-empty, else `docker`.
#[must_use]
pub fn resolve_runtime_name(explicit: Option<&str>) -> String {
    resolve_with(explicit, std::env::var(RUNTIME_ENV_VAR).ok().as_deref())
}

fn resolve_with(explicit: Option<&str>, env: Option<&str>) -> String {
    explicit
        .filter(|name| !name.trim().is_empty())
        .or_else(|| env.filter(|name| !name.trim().is_empty()))
        .unwrap_or(DOCKER_RUNTIME)
        .trim()
        .to_string()
}
