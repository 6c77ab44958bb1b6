//! The engine that wires the lesson timer together.

use crate::common::lock_or_recover;
use crate::components::behavior::standard_registry;
use crate::components::controller::{ControllerState, CyclicController};
use crate::components::finalizer::Finalizer;
use crate::components::scheduler::Scheduler;
use crate::components::storage::KeyValueStore;
use crate::config::TimerConfig;
use crate::dom::{LessonPage, SharedDocument};
use crate::events::{SessionEvent, SystemEvent, TimerEvent};
use crate::time::SessionClock;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// The main lesson timer engine.
///
/// Owns the single controller for the session and shares the session clock
/// with the finalizer. The engine is cheap to clone; every clone is a handle
/// to the same session.
#[derive(Clone)]
pub struct LessonTimerEngine {
    config: Arc<TimerConfig>,
    clock: Arc<SessionClock>,
    page: LessonPage,
    controller: Arc<Mutex<CyclicController>>,
    timer_event_sender: broadcast::Sender<TimerEvent>,
    session_event_sender: broadcast::Sender<SessionEvent>,
    system_event_sender: broadcast::Sender<SystemEvent>,
}

impl LessonTimerEngine {
    /// Creates an engine for `page`, starting the session clock now.
    pub fn new(
        config: TimerConfig,
        page: LessonPage,
        store: Arc<dyn KeyValueStore>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let (timer_event_sender, _) = broadcast::channel(64);
        let (session_event_sender, _) = broadcast::channel(16);
        let (system_event_sender, _) = broadcast::channel(16);

        let clock = Arc::new(SessionClock::start());
        let registry = standard_registry(page.display_handle(), clock.clone(), &config.labels);
        let controller = CyclicController::new(
            registry,
            scheduler,
            store,
            config.storage_key.clone(),
            config.tick_interval(),
        )
        .with_events(timer_event_sender.clone());

        info!("Lesson session started at {}.", clock.started_at());
        Self {
            config: Arc::new(config),
            clock,
            page,
            controller: Arc::new(Mutex::new(controller)),
            timer_event_sender,
            session_event_sender,
            system_event_sender,
        }
    }

    /// Handles a user activation of the timer element.
    pub fn click(&self) -> usize {
        lock_or_recover(&self.controller).advance()
    }

    /// Shows the timer when the page loads, restoring the last chosen behavior.
    pub fn resume(&self) -> usize {
        lock_or_recover(&self.controller).resume()
    }

    pub fn state(&self) -> ControllerState {
        lock_or_recover(&self.controller).state()
    }

    /// Name of the active behavior, if any.
    pub fn active_behavior(&self) -> Option<String> {
        lock_or_recover(&self.controller)
            .active_behavior()
            .map(|behavior| behavior.name().to_string())
    }

    /// Current text of the timer element.
    pub fn display_text(&self) -> Option<String> {
        self.page.display_handle().text()
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn document(&self) -> &SharedDocument {
        &self.page.document
    }

    pub fn page(&self) -> &LessonPage {
        &self.page
    }

    /// Starts observing the page for lesson completion.
    ///
    /// The finalizer subscribes to the mutation feed before this returns, so
    /// no change made afterwards is missed.
    pub fn spawn_finalizer(&self, shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let feed = lock_or_recover(&self.page.document).subscribe();
        let finalizer = Finalizer::new(
            self.clock.clone(),
            self.page.document.clone(),
            self.page.watched.iter().copied(),
            self.config.finalizer.clone(),
            &self.config.labels,
        )
        .with_events(self.session_event_sender.clone());

        self.system_event_sender
            .send(SystemEvent::EngineStarted {
                timestamp: tokio::time::Instant::now(),
            })
            .ok();
        tokio::spawn(finalizer.run(feed, shutdown_rx))
    }

    /// Runs the engine until a shutdown signal is received.
    ///
    /// This method will:
    /// 1. Spawn the finalizer task.
    /// 2. Wait for a Ctrl+C signal.
    /// 3. Stop the finalizer and release the recurring schedule.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("LessonTimerEngine starting up...");
        let (shutdown_tx, _) = broadcast::channel(1);
        let finalizer = self.spawn_finalizer(shutdown_tx.subscribe());

        info!("Engine running. Press Ctrl+C to shut down.");
        tokio::signal::ctrl_c().await?;

        self.shutdown(shutdown_tx, finalizer).await;
        Ok(())
    }

    /// Stops the finalizer task started by `spawn_finalizer` and the recurring schedule.
    pub async fn shutdown(&self, shutdown_tx: broadcast::Sender<()>, finalizer: JoinHandle<()>) {
        info!("Shutdown signal received. Stopping the finalizer...");
        // The finalizer may already have finished on its own.
        shutdown_tx.send(()).ok();
        if tokio::time::timeout(Duration::from_secs(1), finalizer).await.is_err() {
            error!("Finalizer did not stop in time.");
        }
        lock_or_recover(&self.controller).release_schedule();
        self.system_event_sender
            .send(SystemEvent::EngineShutdown)
            .ok();
        info!("LessonTimerEngine has shut down.");
    }

    /// Subscribes to the `TimerEvent` stream.
    pub fn subscribe_timer_events(&self) -> broadcast::Receiver<TimerEvent> {
        self.timer_event_sender.subscribe()
    }

    /// Subscribes to the `SessionEvent` stream.
    pub fn subscribe_session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_event_sender.subscribe()
    }

    /// Subscribes to the `SystemEvent` stream.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }
}
