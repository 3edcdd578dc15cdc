/// Timing and capacity settings for the synchronization core
///
/// # Defaults
///
/// - Session existence check: 5 seconds
/// - Feedback display interval: 4 seconds
/// - Feedback queue capacity: 5 reports
///
/// Values coming from the environment are clamped into a sane range with
/// [`clamp_duration`], so a zero or absurd setting never disables the guard's
/// timeout or floods the feedback queue.

use std::time::Duration;

/// Default bound on the session existence check
pub const DEFAULT_SESSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time a feedback report stays visible
pub const DEFAULT_FEEDBACK_DISPLAY: Duration = Duration::from_secs(4);

/// Default number of reports kept at once
pub const DEFAULT_FEEDBACK_CAPACITY: usize = 5;

/// Shortest accepted timeout or display interval
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Longest accepted timeout or display interval
pub const MAX_INTERVAL: Duration = Duration::from_secs(60);

/// Core configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Bound on the guard's session existence check
    pub session_check_timeout: Duration,

    /// How long a feedback report stays visible
    pub feedback_display: Duration,

    /// Maximum number of visible reports (oldest dropped first)
    pub feedback_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            session_check_timeout: DEFAULT_SESSION_CHECK_TIMEOUT,
            feedback_display: DEFAULT_FEEDBACK_DISPLAY,
            feedback_capacity: DEFAULT_FEEDBACK_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Builds a config from optional millisecond overrides
    ///
    /// `None` keeps the default; anything else is clamped.
    pub fn from_millis(session_check_ms: Option<u64>, feedback_display_ms: Option<u64>) -> Self {
        let defaults = SyncConfig::default();

        SyncConfig {
            session_check_timeout: session_check_ms
                .map(|ms| clamp_duration(Duration::from_millis(ms)))
                .unwrap_or(defaults.session_check_timeout),
            feedback_display: feedback_display_ms
                .map(|ms| clamp_duration(Duration::from_millis(ms)))
                .unwrap_or(defaults.feedback_display),
            ..defaults
        }
    }
}

/// Clamps an interval into `[MIN_INTERVAL, MAX_INTERVAL]`
pub fn clamp_duration(duration: Duration) -> Duration {
    duration.clamp(MIN_INTERVAL, MAX_INTERVAL)
}
