//! Defines all configuration structures for the lesson timer.
//!
//! These structs are deserialized with `serde`, usually from a TOML file with
//! environment overrides layered on top. Every field has a default, so an
//! absent file yields a fully working configuration.

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment overrides, e.g. `LESSON_TIMER__TICK_INTERVAL_MS=500`.
pub const ENV_PREFIX: &str = "LESSON_TIMER";

/// The top-level configuration for the `LessonTimerEngine`.
#[derive(Debug, Clone, Deserialize)]
pub struct TimerConfig {
    /// Key under which the last activated behavior index is persisted.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// Interval between re-invocations of a recurring behavior.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Text shown by the built-in behaviors and the completion summary.
    #[serde(default)]
    pub labels: LabelConfig,

    /// Completion detection settings.
    #[serde(default)]
    pub finalizer: FinalizerConfig,

    /// Where the controller state is persisted.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Display strings for the standard behaviors.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelConfig {
    #[serde(default = "default_off_label")]
    pub off: String,
    #[serde(default = "default_hidden_label")]
    pub hidden: String,
    /// Text placed before the formatted elapsed time in the summary.
    #[serde(default = "default_summary_prefix")]
    pub summary_prefix: String,
}

/// How often the finalizer may fire for the same watched node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirePolicy {
    /// Fire on the first hidden-to-visible transition only.
    #[default]
    Once,
    /// Fire on every hidden-to-visible transition, refreshing the summary.
    EveryReveal,
}

/// Settings for the mutation-triggered finalizer.
#[derive(Debug, Clone, Deserialize)]
pub struct FinalizerConfig {
    #[serde(default)]
    pub policy: FirePolicy,
    /// The attribute whose presence marks a node as hidden.
    #[serde(default = "default_visibility_attribute")]
    pub visibility_attribute: String,
    /// Tag of the heading the summary is attached to.
    #[serde(default = "default_heading_tag")]
    pub heading_tag: String,
}

/// Persistence backend for the controller state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Kept in memory; lost when the process exits.
    #[default]
    Memory,
    /// One file per key under `dir`.
    File { dir: PathBuf },
}

impl TimerConfig {
    /// Loads the configuration from an optional TOML file, then applies
    /// `LESSON_TIMER__*` environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("failed to read timer configuration")?
            .try_deserialize()
            .context("invalid timer configuration")?;
        Ok(config)
    }

    /// The recurring tick interval. Never zero.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

// --- Default value functions for serde ---

fn default_storage_key() -> String {
    "wktk-lesson-timer-behavior".to_string()
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_off_label() -> String {
    "[Timer Off]".to_string()
}

fn default_hidden_label() -> String {
    "[Timer Hidden]".to_string()
}

fn default_summary_prefix() -> String {
    "Lesson time:".to_string()
}

fn default_visibility_attribute() -> String {
    "hidden".to_string()
}

fn default_heading_tag() -> String {
    "h1".to_string()
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
            tick_interval_ms: default_tick_interval_ms(),
            labels: LabelConfig::default(),
            finalizer: FinalizerConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            off: default_off_label(),
            hidden: default_hidden_label(),
            summary_prefix: default_summary_prefix(),
        }
    }
}

impl Default for FinalizerConfig {
    fn default() -> Self {
        Self {
            policy: FirePolicy::default(),
            visibility_attribute: default_visibility_attribute(),
            heading_tag: default_heading_tag(),
        }
    }
}
