//! Worker command protocol and the shared per-worker control slot.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use synrad_core::SimulationParams;

use crate::model::Model;

/// Commands a worker polls between time slices.
#[derive(Debug, Clone)]
pub enum Command {
    Load(Arc<Model>),
    Start,
    Pause,
    Reset,
    UpdateParams(SimulationParams),
    Exit,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Load(_) => "load",
            Command::Start => "start",
            Command::Pause => "pause",
            Command::Reset => "reset",
            Command::UpdateParams(_) => "update-params",
            Command::Exit => "exit",
        }
    }
}

/// Worker state codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkerState {
    #[default]
    Ready,
    Running,
    /// Desorption limit reached.
    Done,
    Error,
    /// Thread has exited.
    Killed,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Ready => "ready",
            WorkerState::Running => "running",
            WorkerState::Done => "done",
            WorkerState::Error => "error",
            WorkerState::Killed => "killed",
        };
        f.write_str(name)
    }
}

/// What a worker reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub message: String,
    /// Photons generated since the last load or reset.
    pub desorbed: u64,
    /// Commands handled so far.
    pub acknowledged: u64,
    /// Results are held back after a timed-out merge.
    pub merge_pending: bool,
}

/// Status shared between one worker and the orchestrator.
#[derive(Debug, Default)]
pub struct ControlSlot {
    status: Mutex<WorkerStatus>,
    changed: Condvar,
}

impl ControlSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WorkerStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> WorkerStatus {
        self.lock().clone()
    }

    pub fn state(&self) -> WorkerState {
        self.lock().state
    }

    pub fn set_state(&self, state: WorkerState, message: impl Into<String>) {
        let mut status = self.lock();
        status.state = state;
        status.message = message.into();
        self.changed.notify_all();
    }

    pub fn set_desorbed(&self, desorbed: u64) {
        self.lock().desorbed = desorbed;
    }

    pub fn set_merge_pending(&self, pending: bool) {
        self.lock().merge_pending = pending;
    }

    /// Mark one more command as handled.
    pub fn acknowledge(&self) {
        self.lock().acknowledged += 1;
        self.changed.notify_all();
    }

    /// Wait until at least `count` commands are acknowledged. False on timeout.
    pub fn wait_acknowledged(&self, count: u64, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |s| s.acknowledged < count)
            .unwrap_or_else(PoisonError::into_inner);
        guard.acknowledged >= count
    }
}
