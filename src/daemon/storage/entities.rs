use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, SubsecRound, Utc};

use crate::{utils::time::local_day, window_api::FocusSample};

/// Application name and window title of the synthetic interval covering user inactivity.
pub const IDLE_MARKER: &str = "[IDLE]";

/// A time interval attributed to one application window. The entry is open while `end` is
/// `None`; once finalized it never changes again.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct ActivityEntry {
    pub app_name: Arc<str>,
    pub window_title: Arc<str>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

/// Identity of a closed entry for deduplication. Timestamps are truncated to whole seconds, the
/// resolution of the log format, so an in-memory entry equals its own read-back copy.
pub type DedupKey = (DateTime<Utc>, Option<DateTime<Utc>>, Arc<str>, Arc<str>);

impl ActivityEntry {
    pub fn open(sample: FocusSample, start: DateTime<Utc>) -> Self {
        Self {
            app_name: sample.app_name,
            window_title: sample.window_title,
            start,
            end: None,
        }
    }

    pub fn idle(start: DateTime<Utc>) -> Self {
        Self {
            app_name: IDLE_MARKER.into(),
            window_title: IDLE_MARKER.into(),
            start,
            end: None,
        }
    }

    pub fn closed(
        app_name: impl Into<Arc<str>>,
        window_title: impl Into<Arc<str>>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            window_title: window_title.into(),
            start,
            end: Some(end.max(start)),
        }
    }

    /// Finalizes the entry. The end never precedes the start.
    pub fn close(self, end: DateTime<Utc>) -> Self {
        Self {
            end: Some(end.max(self.start)),
            ..self
        }
    }

    pub fn is_idle(&self) -> bool {
        &*self.app_name == IDLE_MARKER
    }

    pub fn is_closed(&self) -> bool {
        self.end.is_some()
    }

    pub fn matches(&self, sample: &FocusSample) -> bool {
        self.app_name == sample.app_name && self.window_title == sample.window_title
    }

    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end - self.start)
    }

    /// Day the entry is attributed to: the local calendar day it started on.
    pub fn day(&self) -> NaiveDate {
        local_day(self.start)
    }

    pub fn dedup_key(&self) -> DedupKey {
        (
            self.start.trunc_subsecs(0),
            self.end.map(|v| v.trunc_subsecs(0)),
            self.app_name.clone(),
            self.window_title.clone(),
        )
    }
}

/// Candidate focus change that hasn't been stable long enough to replace the current entry.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct PendingObservation {
    pub sample: FocusSample,
    pub first_seen: DateTime<Utc>,
}
