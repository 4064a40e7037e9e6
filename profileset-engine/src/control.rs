//! Lock-protected lifecycle state shared by the controller and the worker.
//!
//! The mutex guards the run state, the work cursor and the cancel flag. Every
//! state transition, claim and cancel request notifies the condition variable.
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lifecycle of an orchestrator. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Started,
    Initializing,
    Running,
    Done,
}

/// How a lifecycle operation ended. Cancellation is a valid outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    Finished,
    Cancelled,
    /// The batch stopped on an error, which was returned by the operation
    /// that hit it. Only ever recorded, never returned as success.
    Failed,
}

impl Completion {
    #[must_use]
    pub const fn is_cancelled(self) -> bool {
        matches!(self, Self::Cancelled)
    }

    #[must_use]
    pub const fn is_failed(self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Snapshot of run progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Variants handed to an executing thread so far.
    pub claimed: usize,
    /// Variants whose results are fully recorded.
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug)]
struct ControlState {
    state: RunState,
    work_index: usize,
    completed: usize,
    names: Vec<String>,
    cancel_requested: bool,
}

#[derive(Debug)]
pub(crate) struct Control {
    shared: Mutex<ControlState>,
    changed: Condvar,
}

impl Control {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            shared: Mutex::new(ControlState {
                state: RunState::Started,
                work_index: 0,
                completed: 0,
                names: Vec::new(),
                cancel_requested: false,
            }),
            changed: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> RunState {
        self.lock().state
    }

    /// Move to `next` if it lies ahead of the current state.
    pub(crate) fn advance(&self, next: RunState) -> bool {
        let mut shared = self.lock();
        if next <= shared.state {
            return false;
        }
        log::debug!("profileset state {:?} -> {next:?}", shared.state);
        shared.state = next;
        drop(shared);
        self.changed.notify_all();
        true
    }

    /// Reset the cursor for a run over `names`, in execution order.
    pub(crate) fn begin_run(&self, names: Vec<String>) {
        let mut shared = self.lock();
        shared.work_index = 0;
        shared.completed = 0;
        shared.names = names;
    }

    /// Reserve the next variant, or `None` once the run is exhausted or cancelled.
    pub(crate) fn claim(&self) -> Option<usize> {
        let mut shared = self.lock();
        if shared.cancel_requested || shared.work_index >= shared.names.len() {
            return None;
        }
        let index = shared.work_index;
        shared.work_index += 1;
        drop(shared);
        self.changed.notify_all();
        Some(index)
    }

    pub(crate) fn mark_completed(&self) {
        self.lock().completed += 1;
        self.changed.notify_all();
    }

    /// Enter [`RunState::Done`] and report whether every variant ran.
    pub(crate) fn finish_run(&self) -> Completion {
        let mut shared = self.lock();
        let completion = if shared.completed < shared.names.len() {
            Completion::Cancelled
        } else {
            Completion::Finished
        };
        log::debug!("profileset state {:?} -> {:?}", shared.state, RunState::Done);
        shared.state = RunState::Done;
        drop(shared);
        self.changed.notify_all();
        completion
    }

    /// Terminate without running anything, e.g. after a failed setup.
    pub(crate) fn abort(&self) {
        let mut shared = self.lock();
        shared.state = RunState::Done;
        drop(shared);
        self.changed.notify_all();
    }

    pub(crate) fn cancel(&self) {
        let mut shared = self.lock();
        if shared.state == RunState::Done || shared.cancel_requested {
            return;
        }
        shared.cancel_requested = true;
        log::warn!(
            "profileset run cancelled after {} of {} variants were claimed",
            shared.work_index,
            shared.names.len()
        );
        drop(shared);
        self.changed.notify_all();
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.lock().cancel_requested
    }

    /// Name of the most recently claimed variant.
    pub(crate) fn current_name(&self) -> Option<String> {
        let shared = self.lock();
        let index = shared.work_index.checked_sub(1)?;
        shared.names.get(index).cloned()
    }

    pub(crate) fn progress(&self) -> Progress {
        let shared = self.lock();
        Progress {
            claimed: shared.work_index,
            completed: shared.completed,
            total: shared.names.len(),
        }
    }

    /// Block until [`RunState::Done`] or until `timeout` elapses.
    pub(crate) fn wait_until_done(&self, timeout: Option<Duration>) -> bool {
        let shared = self.lock();
        let is_running = |shared: &mut ControlState| shared.state != RunState::Done;
        match timeout {
            None => {
                let shared = self
                    .changed
                    .wait_while(shared, is_running)
                    .unwrap_or_else(PoisonError::into_inner);
                shared.state == RunState::Done
            }
            Some(timeout) => {
                let (shared, _) = self
                    .changed
                    .wait_timeout_while(shared, timeout, is_running)
                    .unwrap_or_else(PoisonError::into_inner);
                shared.state == RunState::Done
            }
        }
    }
}

/// Clonable handle that cancels a run from any thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    control: Arc<Control>,
}

impl CancelHandle {
    pub(crate) const fn new(control: Arc<Control>) -> Self {
        Self { control }
    }

    /// Stop claiming new variants. The variant already claimed, if any, still
    /// runs to completion.
    pub fn cancel(&self) {
        self.control.cancel();
    }

    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.control.cancel_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn names(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("v{i}")).collect()
    }

    #[test]
    fn states_only_move_forward() {
        let control = Control::new();
        assert!(control.advance(RunState::Initializing));
        assert!(!control.advance(RunState::Started));
        assert!(!control.advance(RunState::Initializing));
        assert!(control.advance(RunState::Done));
        assert_eq!(control.state(), RunState::Done);
    }

    #[test]
    fn claims_advance_cursor_until_exhausted() {
        let control = Control::new();
        control.begin_run(names(2));
        assert_eq!(control.current_name(), None);
        assert_eq!(control.claim(), Some(0));
        assert_eq!(control.current_name().as_deref(), Some("v0"));
        assert_eq!(control.claim(), Some(1));
        assert_eq!(control.claim(), None);
        assert_eq!(control.progress().claimed, 2);
    }

    #[test]
    fn cancel_stops_claims_and_reports_cancelled() {
        let control = Control::new();
        control.begin_run(names(3));
        assert_eq!(control.claim(), Some(0));
        control.mark_completed();
        CancelHandle::new(Arc::clone(&control)).cancel();
        assert_eq!(control.claim(), None);
        assert_eq!(control.finish_run(), Completion::Cancelled);
        assert_eq!(control.state(), RunState::Done);
    }

    #[test]
    fn finishing_every_variant_is_not_cancelled() {
        let control = Control::new();
        control.begin_run(names(1));
        assert_eq!(control.claim(), Some(0));
        control.mark_completed();
        control.cancel();
        assert_eq!(control.finish_run(), Completion::Finished);
    }

    #[test]
    fn wait_wakes_on_done() {
        let control = Control::new();
        let worker = Arc::clone(&control);
        let handle = thread::spawn(move || {
            worker.advance(RunState::Running);
            worker.finish_run()
        });
        assert!(control.wait_until_done(None));
        assert_eq!(handle.join().unwrap(), Completion::Finished);
    }

    #[test]
    fn wait_times_out_while_running() {
        let control = Control::new();
        control.advance(RunState::Running);
        assert!(!control.wait_until_done(Some(Duration::from_millis(10))));
    }
}
