use anyhow::Result;
use lessonclock::common::lock_or_recover;
use lessonclock::components::storage::open_store;
use lessonclock::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // 2. Load the configuration; the first argument may name a TOML file.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = TimerConfig::load(config_path.as_deref())?;

    // 3. Create the page and the engine.
    let store = open_store(&config.storage);
    let scheduler = Arc::new(TokioScheduler::current()?);
    let engine = LessonTimerEngine::new(config, LessonPage::scaffold(), store, scheduler);

    // 4. Log every event stream.
    spawn_event_listeners(&engine);

    // 5. Show the timer, then play a short scripted lesson against it.
    engine.resume();
    spawn_scripted_lesson(&engine);

    // 6. Run the engine until Ctrl+C.
    engine.run().await?;

    Ok(())
}

/// Spawns several tasks, each subscribing to a different event stream from the engine.
fn spawn_event_listeners(engine: &LessonTimerEngine) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });

    let mut timer_rx = engine.subscribe_timer_events();
    tokio::spawn(async move {
        while let Ok(event) = timer_rx.recv().await {
            info!("[TIMER] => {:?}", event);
        }
    });

    let mut session_rx = engine.subscribe_session_events();
    tokio::spawn(async move {
        while let Ok(event) = session_rx.recv().await {
            info!("[SESSION] => {:?}", event);
        }
    });
}

/// Clicks through the behaviors and finishes the lesson a few seconds later.
fn spawn_scripted_lesson(engine: &LessonTimerEngine) {
    let engine = engine.clone();
    tokio::spawn(async move {
        for _ in 0..2 {
            tokio::time::sleep(Duration::from_secs(2)).await;
            engine.click();
            info!("[HOST] Display now reads {:?}", engine.display_text());
        }

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            info!("[HOST] Display now reads {:?}", engine.display_text());
        }

        let page = engine.page();
        let attribute = &engine.config().finalizer.visibility_attribute;
        {
            let mut document = lock_or_recover(&page.document);
            for section in &page.watched {
                document.remove_attribute(*section, attribute);
            }
            document.flush();
        }
        info!("[HOST] Lesson complete section revealed. Press Ctrl+C to exit.");
    });
}
