//! Call context carrying an optional deadline.

use std::time::{Duration, Instant};

/// Upper bound for default timeouts that would overflow `Instant`.
const MAX_TIMEOUT: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Per-call context.
///
/// The deadline bounds every blocking read and write of a call. It cannot
/// interrupt an operation already in progress; a caller that wants to give up
/// earlier must pass a shorter deadline to the next call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    deadline: Option<Instant>,
}

impl Context {
    /// Creates a context without a deadline; calls fall back to their default
    /// timeout.
    pub fn background() -> Self {
        Self::default()
    }

    /// Creates a context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    /// Creates a context that expires `timeout` from now.
    ///
    /// A timeout too large to represent yields a context without deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the deadline, or `default_timeout` from now.
    ///
    /// The default timeout is clamped to `MAX_TIMEOUT`.
    pub fn deadline_or(&self, default_timeout: Duration) -> Instant {
        self.deadline.unwrap_or_else(|| {
            let now = Instant::now();
            now.checked_add(default_timeout.min(MAX_TIMEOUT))
                .unwrap_or(now)
        })
    }
}
