use chrono::{DateTime, Duration, Utc};

/// Decides when the user counts as away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleEvaluator {
    threshold: Duration,
}

impl IdleEvaluator {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn from_seconds(threshold_s: i64) -> Self {
        Self::new(Duration::seconds(threshold_s))
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn is_idle(&self, last_activity: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - last_activity >= self.threshold
    }

    /// Moment idleness actually began, as opposed to when it got noticed.
    pub fn idle_since(&self, last_activity: DateTime<Utc>) -> DateTime<Utc> {
        last_activity + self.threshold
    }
}
