//! Defines all public event types broadcast by the lesson timer.
//!
//! Hosts subscribe to these streams for logging or UI; nothing inside the
//! crate depends on anyone listening.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// Events from the cyclic behavior controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// A behavior's action was invoked as the newly active behavior.
    BehaviorActivated { index: usize, name: String },
    /// A recurring schedule was installed for the active behavior.
    ScheduleStarted { index: usize, period: Duration },
    /// The recurring schedule of a superseded behavior was released.
    ScheduleCancelled { index: usize },
}

/// Events about the lesson session as a whole.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The completion section became visible and the summary was written.
    LessonFinished {
        elapsed: Duration,
        summary: String,
        finished_at: DateTime<Utc>,
    },
}

/// Events related to the lifecycle of the engine itself.
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// Fired once when the finalizer starts observing the document.
    EngineStarted { timestamp: Instant },
    /// Fired once when the engine's `run` loop is about to exit.
    EngineShutdown,
}
