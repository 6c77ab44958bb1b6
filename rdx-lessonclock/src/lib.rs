//! # Lessonclock
//!
//! A small, event-driven lesson timer for Rust.
//!
//! Lessonclock drives a status display on a lesson page. A user activation
//! cycles the display through an ordered set of behaviors, the last choice is
//! persisted across sessions, and a completion summary is written once the
//! lesson's end-of-session section becomes visible.
//!
//! ## Core Concepts
//!
//! - **SessionClock**: Records the session start and reports monotonic elapsed time.
//! - **Behaviors**: Named actions, either one-shot or recurring, held in an
//!   ordered `BehaviorRegistry` that defines the cycle order.
//! - **CyclicController**: Owns the active behavior, persists it through a
//!   `KeyValueStore`, and holds at most one recurring schedule at a time.
//! - **Finalizer**: Listens to the document's mutation feed and writes the total
//!   elapsed time when a watched section goes from hidden to visible.
//! - **Configuration-Driven**: Labels, tick interval, storage and finalizer policy
//!   come from a `TimerConfig`, usually loaded from a TOML file.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use lessonclock::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Load the configuration (defaults when no file is present).
//!     let config = TimerConfig::load(None)?;
//!
//!     // 2. Build the page, the store and the scheduler.
//!     let page = LessonPage::scaffold();
//!     let store = Arc::new(MemoryStore::default());
//!     let scheduler = Arc::new(TokioScheduler::current()?);
//!
//!     // 3. Create the engine and show the timer.
//!     let engine = LessonTimerEngine::new(config, page, store, scheduler);
//!     engine.resume();
//!
//!     // 4. Every click moves to the next behavior.
//!     engine.click();
//!
//!     // 5. Run until Ctrl+C.
//!     engine.run().await?;
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Lesson Clock";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod common;
pub mod components;
pub mod config;
pub mod dom;
pub mod engine;
pub mod events;
pub mod time;

/// A prelude module for easy importing of the most common Lessonclock types.
pub mod prelude {
    pub use crate::common::NodeId;
    pub use crate::components::behavior::{Behavior, BehaviorRegistry};
    pub use crate::components::controller::{ControllerState, CyclicController};
    pub use crate::components::finalizer::Finalizer;
    pub use crate::components::scheduler::{ScheduleGuard, Scheduler, TokioScheduler};
    pub use crate::components::storage::{FileStore, KeyValueStore, MemoryStore};
    pub use crate::config::{FirePolicy, TimerConfig};
    pub use crate::dom::{Document, ElementHandle, LessonPage, SharedDocument};
    pub use crate::engine::LessonTimerEngine;
    pub use crate::events::{SessionEvent, SystemEvent, TimerEvent};
    pub use crate::time::{format_elapsed, SessionClock};
}
