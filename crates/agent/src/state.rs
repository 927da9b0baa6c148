//! Run state and the single-flight guard

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::warn;

/// Lifecycle of an agent's runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    /// Last run failed; cleared by the next run
    Error,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Running => f.write_str("running"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// At most one run at a time
#[derive(Debug, Default)]
pub(crate) struct SingleFlight {
    busy: AtomicBool,
}

impl SingleFlight {
    /// Claim the slot and mark the agent running, or `None` if already taken
    pub(crate) fn try_acquire<'a>(
        &'a self,
        state: &'a watch::Sender<RunState>,
    ) -> Option<RunGuard<'a>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        state.send_replace(RunState::Running);
        Some(RunGuard {
            busy: &self.busy,
            state,
            settled: false,
        })
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held for the duration of a run; releases the slot on every exit path.
/// A guard dropped without being settled (panic, cancelled future) leaves
/// the agent in `Error`.
pub(crate) struct RunGuard<'a> {
    busy: &'a AtomicBool,
    state: &'a watch::Sender<RunState>,
    settled: bool,
}

impl RunGuard<'_> {
    pub(crate) fn complete(mut self) {
        self.settle(RunState::Idle);
    }

    pub(crate) fn fail(mut self) {
        self.settle(RunState::Error);
    }

    fn settle(&mut self, state: RunState) {
        self.settled = true;
        self.state.send_replace(state);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("◆ Run ended abnormally");
            self.state.send_replace(RunState::Error);
        }
        self.busy.store(false, Ordering::Release);
    }
}
