//! The cyclic behavior controller.
//!
//! The controller is a small state machine over the indices of a
//! `BehaviorRegistry`. Each activation invokes one behavior, installs a
//! schedule if that behavior recurs, and persists the index so the next
//! session picks up where this one left off.

use crate::components::behavior::{Behavior, BehaviorRegistry};
use crate::components::scheduler::{ScheduleGuard, Scheduler, MIN_PERIOD};
use crate::components::storage::KeyValueStore;
use crate::events::TimerEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Which behavior, if any, is currently active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Nothing has been activated in this session yet.
    Uninitialized,
    /// The behavior at this registry index is active.
    Active(usize),
}

/// Cycles through a registry of behaviors, persisting the last activated one.
///
/// At most one recurring schedule is live at any time: activating a behavior
/// always releases the previous schedule before anything else happens.
pub struct CyclicController {
    registry: BehaviorRegistry,
    state: ControllerState,
    /// Index restored from the store; the last behavior activated in a previous session.
    restored: Option<usize>,
    schedule: Option<ScheduleGuard>,
    scheduler: Arc<dyn Scheduler>,
    store: Arc<dyn KeyValueStore>,
    storage_key: String,
    tick_interval: Duration,
    events: Option<broadcast::Sender<TimerEvent>>,
}

impl CyclicController {
    /// Creates a controller and restores any persisted index from `store`.
    ///
    /// A `tick_interval` below one millisecond is raised to one millisecond.
    pub fn new(
        registry: BehaviorRegistry,
        scheduler: Arc<dyn Scheduler>,
        store: Arc<dyn KeyValueStore>,
        storage_key: impl Into<String>,
        tick_interval: Duration,
    ) -> Self {
        let storage_key = storage_key.into();
        let restored = restore_index(store.as_ref(), &storage_key, registry.len());
        if let Some(index) = restored {
            info!("Restored timer behavior #{} from '{}'.", index, storage_key);
        }
        Self {
            registry,
            state: ControllerState::Uninitialized,
            restored,
            schedule: None,
            scheduler,
            store,
            storage_key,
            tick_interval: tick_interval.max(MIN_PERIOD),
            events: None,
        }
    }

    /// Publishes `TimerEvent`s on the given channel.
    pub fn with_events(mut self, events: broadcast::Sender<TimerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Moves to the next behavior in cycle order and activates it.
    ///
    /// From `Uninitialized` this is index 0, or the behavior after the
    /// restored one. Returns the newly active index.
    pub fn advance(&mut self) -> usize {
        let next = match self.state {
            ControllerState::Active(index) => self.registry.next_index(index),
            ControllerState::Uninitialized => match self.restored.take() {
                Some(index) => self.registry.next_index(index),
                None => 0,
            },
        };
        self.activate(next);
        next
    }

    /// Shows the restored behavior again without moving past it.
    ///
    /// Used once when a session starts. Without a restored index, or once
    /// the controller is already active, this is the same as `advance`.
    pub fn resume(&mut self) -> usize {
        match (self.state, self.restored.take()) {
            (ControllerState::Uninitialized, Some(index)) => {
                self.activate(index);
                index
            }
            _ => self.advance(),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn active_behavior(&self) -> Option<&Behavior> {
        match self.state {
            ControllerState::Active(index) => self.registry.get(index),
            ControllerState::Uninitialized => None,
        }
    }

    /// Cancels the live schedule, if any, leaving the active index untouched.
    pub fn release_schedule(&mut self) {
        if let Some(schedule) = self.schedule.take() {
            schedule.cancel();
            if let ControllerState::Active(index) = self.state {
                self.emit(TimerEvent::ScheduleCancelled { index });
            }
        }
    }

    pub fn has_live_schedule(&self) -> bool {
        self.schedule.is_some()
    }

    pub fn registry(&self) -> &BehaviorRegistry {
        &self.registry
    }

    fn activate(&mut self, index: usize) {
        self.release_schedule();

        let Some(behavior) = self.registry.get(index) else {
            return;
        };
        debug!("Activating timer behavior #{} ({}).", index, behavior.name());
        behavior.invoke();
        let name = behavior.name().to_string();
        let schedule = behavior
            .is_recurring()
            .then(|| self.scheduler.every(self.tick_interval, behavior.action()));

        self.state = ControllerState::Active(index);
        self.emit(TimerEvent::BehaviorActivated { index, name });
        if schedule.is_some() {
            self.emit(TimerEvent::ScheduleStarted {
                index,
                period: self.tick_interval,
            });
        }
        self.schedule = schedule;

        if let Err(e) = self.store.set(&self.storage_key, &index.to_string()) {
            warn!("Could not persist timer behavior #{}: {:#}", index, e);
        }
    }

    fn emit(&self, event: TimerEvent) {
        if let Some(events) = &self.events {
            events.send(event).ok();
        }
    }
}

/// Reads a persisted index. Missing, unparseable or out-of-range values mean
/// "no prior state".
fn restore_index(store: &dyn KeyValueStore, key: &str, len: usize) -> Option<usize> {
    let raw = store.get(key)?;
    match raw.trim().parse::<usize>() {
        Ok(index) if index < len => Some(index),
        _ => {
            warn!("Ignoring persisted timer state {:?} under '{}'.", raw, key);
            None
        }
    }
}
