//! Child process lifecycle.
//!
//! Each state is its own type and only exposes the transitions that are
//! legal from it, so `Exited → Ready` cannot be written.

use std::time::{Duration, Instant};

/// Why a child process reached [`Exited`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// The process could not be spawned.
    SpawnFailed(String),
    /// No worker registered within the readiness timeout.
    StartupTimeout(Duration),
    /// The process terminated on its own, with its exit code if it had one.
    Terminated(Option<i32>),
    /// The process was stopped by the supervisor.
    Stopped,
}

/// Initial state; nothing has been spawned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotStarted;

/// Spawned (or externally managed) and waiting for a worker to register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Starting {
    pid: Option<u32>,
    since: Instant,
}

/// A worker registered in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ready {
    pid: Option<u32>,
    startup: Duration,
}

/// Terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exited {
    pid: Option<u32>,
    reason: ExitReason,
}

impl NotStarted {
    /// Begin waiting for readiness. `pid` is `None` for externally managed
    /// functions.
    pub fn start(self, pid: Option<u32>) -> Starting {
        Starting {
            pid,
            since: Instant::now(),
        }
    }

    /// The process never started.
    pub fn fail(self, reason: ExitReason) -> Exited {
        Exited { pid: None, reason }
    }
}

impl Starting {
    /// A worker registered.
    pub fn ready(self) -> Ready {
        Ready {
            pid: self.pid,
            startup: self.since.elapsed(),
        }
    }

    /// The process exited or timed out before registering.
    pub fn exit(self, reason: ExitReason) -> Exited {
        Exited {
            pid: self.pid,
            reason,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

impl Ready {
    /// The process exited after registering.
    pub fn exit(self, reason: ExitReason) -> Exited {
        Exited {
            pid: self.pid,
            reason,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Time from spawn to the first registration.
    pub fn startup(&self) -> Duration {
        self.startup
    }
}

impl Exited {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn reason(&self) -> &ExitReason {
        &self.reason
    }
}

/// Current lifecycle state of a supervised child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildState {
    NotStarted(NotStarted),
    Starting(Starting),
    Ready(Ready),
    Exited(Exited),
}

impl Default for ChildState {
    fn default() -> Self {
        Self::NotStarted(NotStarted)
    }
}

impl ChildState {
    /// State name, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NotStarted(_) => "not_started",
            Self::Starting(_) => "starting",
            Self::Ready(_) => "ready",
            Self::Exited(_) => "exited",
        }
    }

    /// Process id, when a process was spawned.
    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::NotStarted(_) => None,
            Self::Starting(s) => s.pid(),
            Self::Ready(s) => s.pid(),
            Self::Exited(s) => s.pid(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn is_exited(&self) -> bool {
        matches!(self, Self::Exited(_))
    }

    /// Move `Starting` to `Ready`; any other state is kept.
    pub fn into_ready(self) -> Self {
        match self {
            Self::Starting(s) => Self::Ready(s.ready()),
            other => other,
        }
    }

    /// Move any live state to `Exited`. An already exited state keeps its
    /// original reason.
    pub fn into_exited(self, reason: ExitReason) -> Self {
        match self {
            Self::NotStarted(s) => Self::Exited(s.fail(reason)),
            Self::Starting(s) => Self::Exited(s.exit(reason)),
            Self::Ready(s) => Self::Exited(s.exit(reason)),
            exited @ Self::Exited(_) => exited,
        }
    }
}
