//! Reactor timers.

use super::completion::{Completion, TimerId};
use std::time::Duration;
use tokio::sync::mpsc;

/// Lifecycle of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Waiting for its deadline.
    Armed,
    /// Deadline elapsed and callback ran (one-shot timers stay here).
    Fired,
    /// Cancelled before its deadline; a late completion is ignored.
    Cancelled,
}

pub(crate) struct Timer {
    pub(crate) period: Duration,
    pub(crate) repeat: bool,
    pub(crate) state: TimerState,
    pub(crate) callback: Box<dyn FnMut()>,
}

impl Timer {
    pub(crate) fn new(period: Duration, repeat: bool, callback: Box<dyn FnMut()>) -> Self {
        Self {
            period,
            repeat,
            state: TimerState::Armed,
            callback,
        }
    }
}

/// Post a completion for `timer` once `period` has elapsed.
pub(crate) fn arm(timer: TimerId, period: Duration, completions: mpsc::UnboundedSender<Completion>) {
    tokio::spawn(async move {
        tokio::time::sleep(period).await;
        let _ = completions.send(Completion::Timer { timer });
    });
}
