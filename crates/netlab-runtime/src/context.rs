//! Cancellation and deadline context for blocking runtime calls.

use std::future::Future;
use std::time::Duration;

use netlab_common::{RuntimeError, RuntimeResult};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Carries a cancellation signal and an optional deadline into every
/// blocking runtime operation.
///
/// Clones share the same cancellation token; cancelling any clone cancels
/// all of them. Child contexts are cancelled with their parent but not the
/// other way round.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that never ends on its own.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().child_with_timeout(timeout)
    }

    /// A child context cancelled together with `self`.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// A child context that additionally expires after `timeout`. The
    /// earlier of the two deadlines wins.
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            token: self.token.child_token(),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    /// Cancel this context and its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether [`Context::cancel`] was called on this context or a parent.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Return the error describing why the context ended, if it has.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Cancelled`] or [`RuntimeError::DeadlineExceeded`].
    pub fn check(&self, operation: &str) -> RuntimeResult<()> {
        if self.token.is_cancelled() {
            return Err(RuntimeError::Cancelled {
                operation: operation.to_string(),
            });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(RuntimeError::DeadlineExceeded {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the context ends first.
    ///
    /// # Errors
    ///
    /// Returns the future's own error, or a cancellation error when the
    /// context is cancelled or its deadline passes.
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> RuntimeResult<T>
    where
        F: Future<Output = RuntimeResult<T>>,
    {
        self.check(operation)?;

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(RuntimeError::Cancelled {
                operation: operation.to_string(),
            }),
            () = expired => Err(RuntimeError::DeadlineExceeded {
                operation: operation.to_string(),
            }),
            result = fut => result,
        }
    }
}
