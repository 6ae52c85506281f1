//! Single-in-flight bookkeeping for authentication requests.

use std::{fmt, time::Duration};

use tokio::time::Instant;

use crate::{
    error::{ClientError, Result},
    event::{Event, FailureReason},
};

pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(10_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Login,
    Logout,
    Register,
    VerifyCode,
}

impl Operation {
    pub fn failed(self, reason: FailureReason) -> Event {
        match self {
            Operation::Login => Event::LoginFailed { reason },
            Operation::Logout => Event::LogoutFailed { reason },
            Operation::Register => Event::RegisterFailed { reason },
            Operation::VerifyCode => Event::VerifyCodeFailed { reason },
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Login => "login",
            Operation::Logout => "logout",
            Operation::Register => "register",
            Operation::VerifyCode => "verify-code",
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    operation: Operation,
    deadline: Instant,
}

/// Holds at most one pending operation and its deadline.
///
/// The tracker never sleeps itself; the runtime waits on [`deadline`] and
/// calls [`on_timeout`] when it passes.
///
/// [`deadline`]: OperationTracker::deadline
/// [`on_timeout`]: OperationTracker::on_timeout
#[derive(Debug)]
pub struct OperationTracker {
    timeout: Duration,
    pending: Option<Pending>,
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new(DEFAULT_OPERATION_TIMEOUT)
    }
}

impl OperationTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pending: None,
        }
    }

    pub fn pending(&self) -> Option<Operation> {
        self.pending.map(|pending| pending.operation)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|pending| pending.deadline)
    }

    /// Records `operation` with a deadline of now + timeout.
    pub fn begin(&mut self, operation: Operation) -> Result<Instant> {
        self.begin_at(operation, Instant::now())
    }

    pub fn begin_at(&mut self, operation: Operation, now: Instant) -> Result<Instant> {
        if let Some(pending) = self.pending {
            return Err(ClientError::OperationInProgress {
                pending: pending.operation,
            });
        }
        let deadline = now + self.timeout;
        self.pending = Some(Pending {
            operation,
            deadline,
        });
        Ok(deadline)
    }

    /// Clears the pending operation if it is `operation`. Returns whether it
    /// matched; a stale response leaves the tracker untouched.
    pub fn complete(&mut self, operation: Operation) -> bool {
        match self.pending {
            Some(pending) if pending.operation == operation => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Fails the pending operation with a timeout once its deadline is reached.
    pub fn on_timeout(&mut self, now: Instant) -> Option<Event> {
        let pending = self.pending?;
        if now < pending.deadline {
            return None;
        }
        self.pending = None;
        Some(pending.operation.failed(FailureReason::Timeout))
    }

    pub fn fail_all(&mut self, reason: &str) -> Option<Event> {
        self.pending
            .take()
            .map(|pending| pending.operation.failed(FailureReason::Connection(reason.to_string())))
    }
}
