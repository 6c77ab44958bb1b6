//! Periodic execution of recurring behaviors.
//!
//! A schedule is a scoped resource: `Scheduler::every` hands back a
//! `ScheduleGuard`, and the schedule lives exactly as long as that guard.

use crate::common::{lock_or_recover, Action};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::trace;

/// The shortest period a `TokioScheduler` will tick at.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Installs recurring schedules.
pub trait Scheduler: Send + Sync {
    /// Runs `action` every `period`, starting one `period` from now, until the
    /// returned guard is cancelled or dropped.
    fn every(&self, period: Duration, action: Action) -> ScheduleGuard;
}

/// Owns one live schedule. Dropping the guard cancels the schedule.
#[must_use = "dropping a ScheduleGuard cancels the schedule immediately"]
pub struct ScheduleGuard {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl ScheduleGuard {
    /// Wraps the function that tears the schedule down.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Cancels the schedule now.
    pub fn cancel(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ScheduleGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Runs schedules as Tokio tasks on a captured runtime.
///
/// Each tick runs its action while holding the schedule's cancellation lock,
/// and cancelling takes that same lock. Once a guard has been cancelled, no
/// tick of its schedule is still running and none will start, even when the
/// runtime has several worker threads.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Captures the runtime the caller is running on.
    pub fn current() -> anyhow::Result<Self> {
        Ok(Self::new(Handle::try_current()?))
    }
}

impl Scheduler for TokioScheduler {
    fn every(&self, period: Duration, action: Action) -> ScheduleGuard {
        // Tokio intervals reject a zero period.
        let period = period.max(MIN_PERIOD);
        let cancelled = Arc::new(Mutex::new(false));
        let tick_cancelled = cancelled.clone();
        let task = self.handle.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let cancelled = lock_or_recover(&tick_cancelled);
                if *cancelled {
                    break;
                }
                trace!("Recurring behavior tick.");
                action();
            }
        });
        ScheduleGuard::new(move || {
            *lock_or_recover(&cancelled) = true;
            task.abort();
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// A scheduler that never runs anything on its own. Tests fire the live
    /// schedules by hand and inspect how many are installed.
    #[derive(Default, Clone)]
    pub(crate) struct ManualScheduler {
        live: Arc<AtomicUsize>,
        installed: Arc<AtomicUsize>,
        actions: Arc<Mutex<Vec<(usize, Action)>>>,
    }

    impl ManualScheduler {
        pub(crate) fn live(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }

        pub(crate) fn installed(&self) -> usize {
            self.installed.load(Ordering::SeqCst)
        }

        /// Invokes every live schedule once, as one tick would.
        pub(crate) fn tick(&self) {
            let actions: Vec<Action> = self
                .actions
                .lock()
                .unwrap()
                .iter()
                .map(|(_, action)| action.clone())
                .collect();
            for action in actions {
                action();
            }
        }
    }

    impl Scheduler for ManualScheduler {
        fn every(&self, _period: Duration, action: Action) -> ScheduleGuard {
            let id = self.installed.fetch_add(1, Ordering::SeqCst);
            self.live.fetch_add(1, Ordering::SeqCst);
            self.actions.lock().unwrap().push((id, action));

            let live = self.live.clone();
            let actions = self.actions.clone();
            ScheduleGuard::new(move || {
                live.fetch_sub(1, Ordering::SeqCst);
                actions.lock().unwrap().retain(|(key, _)| *key != id);
            })
        }
    }
}
