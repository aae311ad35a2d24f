use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    daemon::storage::entities::ActivityEntry, utils::clock::Clock, window_api::FocusSampler,
};

use super::tracker::ActivityTracker;

/// Drives the [ActivityTracker]: samples focus every poll interval and forwards whatever the
/// tracker finalizes. Ticks never overlap, so entries leave in the order they were finalized.
pub struct DataCollectionModule {
    next: mpsc::Sender<ActivityEntry>,
    sampler: Box<dyn FocusSampler>,
    tracker: ActivityTracker,
    shutdown: CancellationToken,
    poll_interval: watch::Receiver<Duration>,
    finalize_on_stop: bool,
    clock: Box<dyn Clock>,
}

impl DataCollectionModule {
    pub fn new(
        next: mpsc::Sender<ActivityEntry>,
        sampler: Box<dyn FocusSampler>,
        tracker: ActivityTracker,
        shutdown: CancellationToken,
        poll_interval: watch::Receiver<Duration>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            next,
            sampler,
            tracker,
            shutdown,
            poll_interval,
            finalize_on_stop: false,
            clock,
        }
    }

    /// Whether the open entry gets finalized on shutdown instead of being abandoned.
    pub fn with_finalize_on_stop(self, finalize_on_stop: bool) -> Self {
        Self {
            finalize_on_stop,
            ..self
        }
    }

    fn collect(&mut self) -> Option<ActivityEntry> {
        let now = self.clock.now();

        match self.sampler.idle_time().map(chrono::Duration::from_std) {
            Ok(Ok(idle)) => self.tracker.record_user_activity(now - idle),
            Ok(Err(e)) => warn!("Idle time out of range {e}"),
            Err(e) => error!("Encountered an error reading idle time {:?}", e),
        }

        let sampler = &mut self.sampler;
        self.tracker.tick(now, || match sampler.poll() {
            Ok(sample) => sample,
            Err(e) => {
                error!("Encountered an error during sampling {:?}", e);
                None
            }
        })
    }

    async fn send(&self, entry: ActivityEntry) -> Result<()> {
        let span = info_span!("Forwarding finalized entry");
        debug!("Sending entry {:?}", entry);
        self.next
            .send(entry)
            .instrument(span)
            .await
            .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
        Ok(())
    }

    async fn stop(mut self) -> Result<()> {
        if self.finalize_on_stop {
            if let Some(entry) = self.tracker.finish(self.clock.now()) {
                self.send(entry).await?;
            }
        } else if let Some(current) = self.tracker.current() {
            info!("Abandoning open entry {:?}", current);
        }
        Ok(())
    }

    /// Executes the collector event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut interval = *self.poll_interval.borrow_and_update();
        let mut next_tick = self.clock.instant();
        loop {
            tokio::select! {
                biased;
                // Cancelation means we stop execution of the event loop. Which means we also drop
                // the sender channel and consequently stop processing module.
                _ = self.shutdown.cancelled() => {
                    return self.stop().await;
                }
                Ok(()) = self.poll_interval.changed() => {
                    interval = *self.poll_interval.borrow_and_update();
                    info!("Poll interval changed to {interval:?}");
                    next_tick = self.clock.instant() + interval;
                }
                _ = self.clock.sleep_until(next_tick) => {
                    next_tick += interval;
                    if let Some(entry) = self.collect() {
                        info!("Finalized {:?}", entry);
                        self.send(entry).await?;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use anyhow::{anyhow, Result};
    use chrono::{DateTime, TimeZone, Utc};
    use tokio::sync::{mpsc, watch};
    use tokio_util::sync::CancellationToken;

    use crate::{
        daemon::{
            collection::tracker::{ActivityTracker, TrackerSettings},
            storage::entities::ActivityEntry,
        },
        utils::{clock::TestClock, logging::TEST_LOGGING},
        window_api::{FocusSample, MockFocusSampler},
    };

    use super::DataCollectionModule;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 7, 4, 10, 0, 0).unwrap()
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        start() + chrono::Duration::seconds(seconds)
    }

    /// Mock whose n-th poll returns `polls(n)` and which reports `idle` since the last input.
    fn sampler(
        idle: Duration,
        polls: impl Fn(usize) -> Result<Option<FocusSample>> + Send + 'static,
    ) -> MockFocusSampler {
        let mut sampler = MockFocusSampler::new();
        sampler.expect_idle_time().returning(move || Ok(idle));
        let count = AtomicUsize::new(0);
        sampler
            .expect_poll()
            .returning(move || polls(count.fetch_add(1, Ordering::SeqCst)));
        sampler
    }

    /// Runs the collector with one second polling until `stop_after`, returning everything sent.
    async fn collect(
        sampler: MockFocusSampler,
        finalize_on_stop: bool,
        stop_after: Duration,
    ) -> Result<Vec<ActivityEntry>> {
        *TEST_LOGGING;
        let clock = TestClock::starting_at(start());
        let (sender, mut receiver) = mpsc::channel(100);
        let (_interval_sender, interval) = watch::channel(Duration::from_secs(1));
        let shutdown = CancellationToken::new();

        let collector = DataCollectionModule::new(
            sender,
            Box::new(sampler),
            ActivityTracker::new(TrackerSettings::default(), start()),
            shutdown.clone(),
            interval,
            Box::new(clock),
        )
        .with_finalize_on_stop(finalize_on_stop);

        let (result, _) = tokio::join!(collector.run(), async {
            tokio::time::sleep(stop_after).await;
            shutdown.cancel();
        });
        result?;

        let mut entries = vec![];
        while let Some(entry) = receiver.recv().await {
            entries.push(entry);
        }
        Ok(entries)
    }

    #[tokio::test(start_paused = true)]
    async fn test_focus_change_is_forwarded() -> Result<()> {
        let sampler = sampler(Duration::ZERO, |poll| {
            let app = if poll < 5 { "A" } else { "B" };
            Ok(Some(FocusSample::new(app, "window")))
        });

        let entries = collect(sampler, false, Duration::from_millis(20_500)).await?;

        // B first seen at 5s becomes stable at 8s.
        assert_eq!(
            entries,
            vec![ActivityEntry::closed("A", "window", at(0), at(8))]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_while_nothing_is_focused() -> Result<()> {
        // Input stopped long ago, only the samples themselves count as activity.
        let sampler = sampler(Duration::from_secs(3600), |poll| {
            Ok((poll < 3).then(|| FocusSample::new("A", "window")))
        });

        let entries = collect(sampler, false, Duration::from_secs(400)).await?;

        assert_eq!(
            entries,
            vec![ActivityEntry::closed("A", "window", at(0), at(302))]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampling_errors_are_skipped() -> Result<()> {
        let sampler = sampler(Duration::ZERO, |poll| match poll {
            0 => Ok(Some(FocusSample::new("A", "window"))),
            1..=3 => Err(anyhow!("window went away")),
            _ => Ok(Some(FocusSample::new("B", "window"))),
        });

        let entries = collect(sampler, false, Duration::from_millis(10_500)).await?;

        assert_eq!(
            entries,
            vec![ActivityEntry::closed("A", "window", at(0), at(7))]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_on_stop() -> Result<()> {
        let sampler = sampler(Duration::ZERO, |_| Ok(Some(FocusSample::new("A", "window"))));

        let abandoned = collect(sampler, false, Duration::from_millis(10_500)).await?;
        assert!(abandoned.is_empty());

        let sampler = self::sampler(Duration::ZERO, |_| Ok(Some(FocusSample::new("A", "window"))));
        let finished = collect(sampler, true, Duration::from_millis(10_500)).await?;
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].start, at(0));
        assert_eq!(finished[0].end.map(|v| v.timestamp()), Some(at(10).timestamp()));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_interval_is_rescheduled() -> Result<()> {
        let polls = Arc::new(AtomicUsize::new(0));
        let mut sampler = MockFocusSampler::new();
        sampler
            .expect_idle_time()
            .returning(|| Ok(Duration::ZERO));
        let counter = polls.clone();
        sampler.expect_poll().returning(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(FocusSample::new("A", "window")))
        });

        let (sender, _receiver) = mpsc::channel(100);
        let (interval_sender, interval) = watch::channel(Duration::from_secs(1));
        let shutdown = CancellationToken::new();
        let collector = DataCollectionModule::new(
            sender,
            Box::new(sampler),
            ActivityTracker::new(TrackerSettings::default(), start()),
            shutdown.clone(),
            interval,
            Box::new(TestClock::starting_at(start())),
        );

        let (result, _) = tokio::join!(collector.run(), async {
            tokio::time::sleep(Duration::from_millis(10_500)).await;
            interval_sender.send(Duration::from_secs(5)).unwrap();
            tokio::time::sleep(Duration::from_millis(17_500)).await;
            shutdown.cancel();
        });
        result?;

        // 0s..=10s every second, then 15.5s, 20.5s and 25.5s.
        assert_eq!(polls.load(Ordering::SeqCst), 14);
        Ok(())
    }
}
