//! Common error types for the netlab runtime core.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`RuntimeError`].
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Boxed error produced by a concrete backend.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by container runtimes and the runtime registry.
#[derive(Error, Diagnostic, Debug)]
pub enum RuntimeError {
    /// No backend is registered under the requested name.
    #[error("Unknown container runtime: {name}")]
    #[diagnostic(
        code(netlab::runtime::unknown),
        help("Registered runtimes are listed by `RuntimeRegistry::names`")
    )]
    UnknownRuntime {
        /// The requested runtime name.
        name: String,
    },

    /// A required option was not applied during initialization.
    #[error("Missing runtime option: {option}")]
    #[diagnostic(code(netlab::runtime::missing_option))]
    MissingOption {
        /// The option that was expected.
        option: String,
    },

    /// The runtime was used before `init` succeeded.
    #[error("Runtime {runtime} is not initialized")]
    #[diagnostic(
        code(netlab::runtime::not_initialized),
        help("Call `init` with the runtime options before driving containers")
    )]
    NotInitialized {
        /// The runtime name.
        runtime: String,
    },

    /// `init` was called a second time on the same instance.
    #[error("Runtime {runtime} is already initialized")]
    #[diagnostic(code(netlab::runtime::already_initialized))]
    AlreadyInitialized {
        /// The runtime name.
        runtime: String,
    },

    /// Container not found.
    #[error("Container not found: {name}")]
    #[diagnostic(code(netlab::container::not_found))]
    ContainerNotFound {
        /// The container name that was not found.
        name: String,
    },

    /// A container with the same name already exists.
    #[error("Container already exists: {name}")]
    #[diagnostic(code(netlab::container::exists))]
    ContainerExists {
        /// The conflicting container name.
        name: String,
    },

    /// The container exists but is not running.
    #[error("Container is not running: {name}")]
    #[diagnostic(code(netlab::container::not_running))]
    ContainerNotRunning {
        /// The container name.
        name: String,
    },

    /// The container has no network namespace of its own.
    #[error("Container {name} has no discoverable network namespace")]
    #[diagnostic(
        code(netlab::container::no_netns),
        help("Containers in host network mode share the host namespace")
    )]
    NoNetworkNamespace {
        /// The container name.
        name: String,
    },

    /// Invalid container name format.
    #[error("Invalid container name: {name}")]
    #[diagnostic(
        code(netlab::container::invalid_name),
        help("Container names must be alphanumeric with '-', '_' or '.', 1-128 characters")
    )]
    InvalidContainerName {
        /// The invalid name.
        name: String,
    },

    /// Malformed image reference.
    #[error("Invalid image reference '{reference}': {reason}")]
    #[diagnostic(code(netlab::image::invalid_reference))]
    InvalidImageReference {
        /// The rejected reference.
        reference: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An exec was requested with an empty argument vector.
    #[error("Empty command for container {name}")]
    #[diagnostic(code(netlab::exec::empty_command))]
    EmptyCommand {
        /// The target container.
        name: String,
    },

    /// A command exited with a non-zero status.
    #[error("Command in container {name} exited with code {exit_code}")]
    #[diagnostic(code(netlab::exec::failed))]
    ExecFailed {
        /// The target container.
        name: String,
        /// The exit code.
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// The caller cancelled the operation.
    #[error("Operation cancelled: {operation}")]
    #[diagnostic(code(netlab::cancelled))]
    Cancelled {
        /// The operation that was interrupted.
        operation: String,
    },

    /// The caller's deadline passed before the operation finished.
    #[error("Deadline exceeded: {operation}")]
    #[diagnostic(code(netlab::deadline_exceeded))]
    DeadlineExceeded {
        /// The operation that was interrupted.
        operation: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(netlab::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// Error reported by a backend, passed through untranslated.
    #[error("{backend} runtime error")]
    #[diagnostic(code(netlab::backend))]
    Backend {
        /// The backend name.
        backend: String,
        /// The backend's own error.
        #[source]
        source: BackendError,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(netlab::io))]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Wrap a backend error without altering it.
    pub fn backend(backend: impl Into<String>, source: impl Into<BackendError>) -> Self {
        Self::Backend {
            backend: backend.into(),
            source: source.into(),
        }
    }

    /// Whether the caller gave up (cancellation or deadline) rather than the
    /// backend refusing.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeadlineExceeded { .. })
    }

    /// Whether this is a not-found condition for a named resource.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::ContainerNotFound { .. })
    }

    /// Whether this error is raised before any backend I/O happens.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownRuntime { .. }
                | Self::MissingOption { .. }
                | Self::NotInitialized { .. }
                | Self::AlreadyInitialized { .. }
                | Self::Config { .. }
        )
    }
}
