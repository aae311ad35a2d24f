//! Sampling state machine. Turns a noisy stream of focus samples into closed
//! [ActivityEntry] intervals:
//!  - a focus change only counts once the new window stayed focused for the debounce window;
//!  - intervals shorter than the minimum duration are dropped;
//!  - a lack of user input for the idle threshold closes the current interval and opens an
//!    `[IDLE]` one, which ends as soon as a sample arrives again.

use std::mem;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::{
    daemon::storage::entities::{ActivityEntry, PendingObservation},
    window_api::FocusSample,
};

use super::idle::IdleEvaluator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    /// How long a new focus has to stay unchanged before it replaces the current entry.
    pub debounce_window: Duration,
    /// Shorter finalized entries are dropped. Idle entries are exempt.
    pub min_entry_duration: Duration,
    pub idle: IdleEvaluator,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            debounce_window: Duration::seconds(3),
            min_entry_duration: Duration::seconds(3),
            idle: IdleEvaluator::from_seconds(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TrackerState {
    NoEntry,
    Open(ActivityEntry),
    OpenWithPending(ActivityEntry, PendingObservation),
}

pub struct ActivityTracker {
    state: TrackerState,
    last_user_activity: DateTime<Utc>,
    settings: TrackerSettings,
}

impl ActivityTracker {
    pub fn new(settings: TrackerSettings, now: DateTime<Utc>) -> Self {
        Self {
            state: TrackerState::NoEntry,
            last_user_activity: now,
            settings,
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: TrackerSettings) {
        self.settings = settings;
    }

    /// The open entry, if any.
    pub fn current(&self) -> Option<&ActivityEntry> {
        match &self.state {
            TrackerState::NoEntry => None,
            TrackerState::Open(current) | TrackerState::OpenWithPending(current, _) => Some(current),
        }
    }

    pub fn pending(&self) -> Option<&PendingObservation> {
        match &self.state {
            TrackerState::OpenWithPending(_, pending) => Some(pending),
            _ => None,
        }
    }

    pub fn last_user_activity(&self) -> DateTime<Utc> {
        self.last_user_activity
    }

    /// Input activity happened at `at`. Out of order reports never move the activity back.
    pub fn record_user_activity(&mut self, at: DateTime<Utc>) {
        self.last_user_activity = self.last_user_activity.max(at);
    }

    /// One polling step. Idle detection runs first; `sample` is only consulted when the user isn't
    /// idle.
    pub fn tick(
        &mut self,
        at: DateTime<Utc>,
        sample: impl FnOnce() -> Option<FocusSample>,
    ) -> Option<ActivityEntry> {
        if self.settings.idle.is_idle(self.last_user_activity, at) {
            return self.enter_idle();
        }

        let sample = sample()?;
        self.observe(sample, at)
    }

    /// Feeds a focus sample observed at `at`. Returns the entry this observation finalized.
    pub fn observe(&mut self, sample: FocusSample, at: DateTime<Utc>) -> Option<ActivityEntry> {
        self.record_user_activity(at);

        let (current, pending) = match mem::replace(&mut self.state, TrackerState::NoEntry) {
            TrackerState::NoEntry => {
                info!("Started tracking {:?}", sample);
                self.state = TrackerState::Open(ActivityEntry::open(sample, at));
                return None;
            }
            TrackerState::Open(current) => (current, None),
            TrackerState::OpenWithPending(current, pending) => (current, Some(pending)),
        };

        // Returning from idle is immediate and the idle interval is always kept.
        if current.is_idle() {
            info!("User is back at {:?}", sample);
            self.state = TrackerState::Open(ActivityEntry::open(sample, at));
            return Some(current.close(at));
        }

        // Flapping back to the current window cancels the candidate.
        if current.matches(&sample) {
            self.state = TrackerState::Open(current);
            return None;
        }

        match pending {
            Some(pending) if pending.sample == sample => {
                if at - pending.first_seen < self.settings.debounce_window {
                    self.state = TrackerState::OpenWithPending(current, pending);
                    return None;
                }
                debug!("Focus change to {:?} is stable", pending.sample);
                let finished = current.close(at);
                self.state = TrackerState::Open(ActivityEntry::open(pending.sample, at));
                self.keep_if_long_enough(finished)
            }
            _ => {
                debug!("New focus candidate {:?}", sample);
                self.state = TrackerState::OpenWithPending(
                    current,
                    PendingObservation {
                        sample,
                        first_seen: at,
                    },
                );
                None
            }
        }
    }

    /// Closes the open entry at `at`, leaving the tracker without one. The same rules as for a
    /// regular finalization apply.
    pub fn finish(&mut self, at: DateTime<Utc>) -> Option<ActivityEntry> {
        match mem::replace(&mut self.state, TrackerState::NoEntry) {
            TrackerState::NoEntry => None,
            TrackerState::Open(current) | TrackerState::OpenWithPending(current, _) => {
                if current.is_idle() {
                    Some(current.close(at))
                } else {
                    self.keep_if_long_enough(current.close(at))
                }
            }
        }
    }

    fn enter_idle(&mut self) -> Option<ActivityEntry> {
        match self.current() {
            Some(current) if !current.is_idle() => {}
            _ => return None,
        }
        let (TrackerState::Open(current) | TrackerState::OpenWithPending(current, _)) =
            mem::replace(&mut self.state, TrackerState::NoEntry)
        else {
            return None;
        };

        let idle_start = self.settings.idle.idle_since(self.last_user_activity);
        let finished = current.close(idle_start);
        let idle_start = finished.end.unwrap_or(idle_start);
        info!("User went idle at {idle_start}");
        self.state = TrackerState::Open(ActivityEntry::idle(idle_start));
        self.keep_if_long_enough(finished)
    }

    fn keep_if_long_enough(&self, finished: ActivityEntry) -> Option<ActivityEntry> {
        match finished.duration() {
            Some(duration) if duration >= self.settings.min_entry_duration => Some(finished),
            _ => {
                debug!("Dropping short entry {:?}", finished);
                None
            }
        }
    }
}
