//! Defines behaviors and the ordered registry the controller cycles through.

use crate::common::Action;
use crate::config::LabelConfig;
use crate::dom::ElementHandle;
use crate::time::{format_elapsed, SessionClock};
use std::fmt;
use std::sync::Arc;

/// A named action that updates the displayed status.
///
/// A recurring behavior is invoked once on activation and then again on
/// every tick until another behavior replaces it, so its action must be safe
/// to repeat.
#[derive(Clone)]
pub struct Behavior {
    name: String,
    action: Action,
    recurring: bool,
}

impl Behavior {
    /// A behavior that runs once when it becomes active.
    pub fn one_shot(name: impl Into<String>, action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            action: Arc::new(action),
            recurring: false,
        }
    }

    /// A behavior that runs on activation and on every tick afterwards.
    pub fn recurring(name: impl Into<String>, action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            action: Arc::new(action),
            recurring: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_recurring(&self) -> bool {
        self.recurring
    }

    /// A shared handle to the action, for handing to a scheduler.
    pub fn action(&self) -> Action {
        self.action.clone()
    }

    pub fn invoke(&self) {
        (self.action)();
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Behavior")
            .field("name", &self.name)
            .field("recurring", &self.recurring)
            .finish_non_exhaustive()
    }
}

/// An ordered, non-empty list of behaviors. Order defines the cycle.
#[derive(Debug, Clone)]
pub struct BehaviorRegistry {
    behaviors: Vec<Behavior>,
}

impl BehaviorRegistry {
    /// Creates a registry from the given behaviors.
    ///
    /// # Panics
    /// Panics if `behaviors` is empty; cycling over nothing is a programming error.
    pub fn new(behaviors: Vec<Behavior>) -> Self {
        assert!(
            !behaviors.is_empty(),
            "a BehaviorRegistry needs at least one behavior"
        );
        Self { behaviors }
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn get(&self, index: usize) -> Option<&Behavior> {
        self.behaviors.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Behavior> {
        self.behaviors.iter()
    }

    /// The index following `index` in cycle order.
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.behaviors.len()
    }
}

/// Builds the standard timer registry: `Off`, `Hidden`, then `Live`.
///
/// `Off` and `Hidden` write a fixed label once. `Live` writes the bracketed
/// elapsed session time and is re-run on every tick.
pub fn standard_registry(
    display: ElementHandle,
    clock: Arc<SessionClock>,
    labels: &LabelConfig,
) -> BehaviorRegistry {
    let off = {
        let display = display.clone();
        let label = labels.off.clone();
        Behavior::one_shot("Off", move || display.set_text(&label))
    };
    let hidden = {
        let display = display.clone();
        let label = labels.hidden.clone();
        Behavior::one_shot("Hidden", move || display.set_text(&label))
    };
    let live = Behavior::recurring("Live", move || {
        display.set_text(&format!("[{}]", format_elapsed(clock.elapsed())));
    });
    BehaviorRegistry::new(vec![off, hidden, live])
}
