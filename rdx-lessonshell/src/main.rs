use anyhow::Result;
use colored::Colorize;
use lessonclock::common::lock_or_recover;
use lessonclock::components::storage::open_store;
use lessonclock::prelude::*;
use lessonclock::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct ShellHighlighter;

impl Highlighter for ShellHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow()))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    let rule = "-".repeat(72);
    println!("{}", format!("  {} shell", ENGINE_NAME).cyan().bold());
    println!("{}", rule.dimmed());
    println!("  Shell   v{:<8} Library   v{:<8}", SHELL_VERSION, LIB_VERSION);
    println!(
        "{}",
        "  Distributed under the MIT OR Apache-2.0 license. Use at your own risk.".dimmed()
    );
    println!("{}", rule.dimmed());
}

/// Prints timer and session events as they arrive.
fn spawn_event_listeners(engine: &LessonTimerEngine) {
    let mut timer_rx = engine.subscribe_timer_events();
    tokio::spawn(async move {
        while let Ok(event) = timer_rx.recv().await {
            println!("\n<-- [TIMER] {:?}", event);
        }
    });

    let mut session_rx = engine.subscribe_session_events();
    tokio::spawn(async move {
        while let Ok(event) = session_rx.recv().await {
            match event {
                SessionEvent::LessonFinished { summary, finished_at, .. } => {
                    println!(
                        "\n<-- [SESSION] {} (at {})",
                        summary.green().bold(),
                        finished_at.format("%H:%M:%S")
                    );
                }
            }
        }
    });
}

/// Sets or clears the visibility attribute on every watched section.
fn set_completion_visible(engine: &LessonTimerEngine, visible: bool) {
    let page = engine.page();
    let attribute = &engine.config().finalizer.visibility_attribute;
    let mut document = lock_or_recover(&page.document);
    for section in &page.watched {
        if visible {
            document.remove_attribute(*section, attribute);
        } else {
            document.set_attribute(*section, attribute, "");
        }
    }
    document.flush();
}

/// Sets an arbitrary attribute on the completion section.
fn touch_completion(engine: &LessonTimerEngine, name: &str, value: &str) {
    let page = engine.page();
    let mut document = lock_or_recover(&page.document);
    for section in &page.watched {
        document.set_attribute(*section, name, value);
    }
    document.flush();
}

fn print_status(engine: &LessonTimerEngine) {
    println!("Timer status:");
    println!("  State:    {:?}", engine.state());
    println!(
        "  Behavior: {}",
        engine.active_behavior().unwrap_or_else(|| "-".to_string())
    );
    println!(
        "  Display:  {}",
        engine.display_text().unwrap_or_default().cyan()
    );
    println!("  Elapsed:  {}", format_elapsed(engine.clock().elapsed()));
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config_path = env::args().nth(1).map(PathBuf::from);
    let config = TimerConfig::load(config_path.as_deref())?;
    let store = open_store(&config.storage);
    let scheduler = Arc::new(TokioScheduler::current()?);
    let engine = LessonTimerEngine::new(config, LessonPage::scaffold(), store, scheduler);

    spawn_event_listeners(&engine);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let finalizer = engine.spawn_finalizer(shutdown_rx);

    info!("Spawning {} in the background...", ENGINE_NAME.cyan());
    engine.resume();

    let mut rl = Editor::new()?;
    rl.set_helper(Some(ShellHighlighter));

    println!(
        "{} is running. Type 'help' for commands or 'exit' to quit.",
        ENGINE_NAME.cyan()
    );

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        match rl.readline(&prompt) {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();

                match args.first().copied().unwrap_or("") {
                    "click" => {
                        let index = engine.click();
                        println!(
                            "--> Behavior #{} active: {}",
                            index,
                            engine.display_text().unwrap_or_default().cyan()
                        );
                    }
                    "status" => print_status(&engine),
                    "finish" => {
                        set_completion_visible(&engine, true);
                        println!("--> Lesson complete section revealed.");
                    }
                    "hide" => {
                        set_completion_visible(&engine, false);
                        println!("--> Lesson complete section hidden.");
                    }
                    "touch" => match (args.get(1), args.get(2)) {
                        (Some(name), value) => {
                            touch_completion(&engine, name, value.copied().unwrap_or(""));
                            println!("--> Set attribute '{}' on the completion section.", name);
                        }
                        _ => println!("Usage: touch <ATTRIBUTE> [VALUE]"),
                    },
                    "help" => {
                        println!("Available commands:");
                        println!("  click                 - Activates the next timer behavior.");
                        println!("  status                - Shows the timer state and display.");
                        println!("  finish                - Reveals the lesson complete section.");
                        println!("  hide                  - Hides the lesson complete section again.");
                        println!("  touch <A> [V]         - Sets an unrelated attribute on that section.");
                        println!("  exit                  - Quits the shell.");
                    }
                    "exit" => break,
                    "" => {}
                    _ => println!("Unknown command: '{}'. Type 'help'.", line.trim()),
                }
            }
            Err(_) => {
                println!("Exiting lessonshell...");
                break;
            }
        }
    }

    engine.shutdown(shutdown_tx, finalizer).await;
    Ok(())
}
