//! The session clock and elapsed-time formatting.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// The single source of time for a lesson session.
///
/// Created once when the session starts and never reset. Elapsed time is read
/// from Tokio's clock, so a paused test runtime drives it deterministically.
#[derive(Debug, Clone)]
pub struct SessionClock {
    start: Instant,
    started_at: DateTime<Utc>,
}

impl SessionClock {
    /// Starts a new session clock at the current instant.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Time since the session started. Monotonic and unbounded.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Wall-clock timestamp of the session start.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Formats an elapsed duration as `"MM m SS s"`.
///
/// Sub-second precision is truncated. Minutes are not rolled over into
/// hours, so an hour reads `"60 m 00 s"`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_seconds = elapsed.as_secs();
    format!("{:02} m {:02} s", total_seconds / 60, total_seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_elapsed(Duration::from_secs(125)), "02 m 05 s");
        assert_eq!(format_elapsed(Duration::from_secs(9)), "00 m 09 s");
        assert_eq!(format_elapsed(Duration::from_secs(0)), "00 m 00 s");
    }

    #[test]
    fn minutes_do_not_roll_over_into_hours() {
        assert_eq!(format_elapsed(Duration::from_secs(3600)), "60 m 00 s");
        assert_eq!(format_elapsed(Duration::from_secs(6000)), "100 m 00 s");
    }

    #[test]
    fn truncates_partial_seconds() {
        assert_eq!(format_elapsed(Duration::from_millis(59_999)), "00 m 59 s");
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_follows_the_runtime_clock() {
        let clock = SessionClock::start();
        assert_eq!(clock.elapsed().as_secs(), 0);

        tokio::time::advance(Duration::from_secs(125)).await;
        assert_eq!(clock.elapsed().as_secs(), 125);
        assert_eq!(format_elapsed(clock.elapsed()), "02 m 05 s");
    }
}
