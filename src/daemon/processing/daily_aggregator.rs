use std::collections::{BTreeMap, HashSet};

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use futures::{stream, StreamExt};
use tracing::{error, info, warn};

use crate::daemon::storage::{entities::ActivityEntry, log_store::LogStore};

use super::module::EventProcessor;

/// How many days get merged concurrently during [DailyAggregator::flush_all].
const FLUSH_CONCURRENCY: usize = 4;

/// Bridges [ProcessingModule](super::ProcessingModule) and [LogStore]. Every entry is appended to
/// disk right away; the per-day buffer only exists so the run can end with a merge-flush that
/// leaves each touched day sorted and free of duplicates.
pub struct DailyAggregator<S: LogStore> {
    store: S,
    buffer: BTreeMap<NaiveDate, Vec<ActivityEntry>>,
}

impl<S: LogStore> DailyAggregator<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            buffer: BTreeMap::new(),
        }
    }

    /// Buffers the entry under the day it started on and appends it to that day's log. A failed
    /// append is only logged.
    pub async fn handle_finalized(&mut self, entry: ActivityEntry) {
        let day = entry.day();
        self.buffer.entry(day).or_default().push(entry.clone());

        if let Err(e) = self.store.append(std::slice::from_ref(&entry), day).await {
            error!("Failed to append {:?} to log for {day}: {e:?}", entry);
        }
    }

    /// Merges buffered entries with what is on disk for every buffered day and rewrites those
    /// days. Days are independent, one failing doesn't stop the rest.
    pub async fn flush_all(&self) -> Result<()> {
        let results = stream::iter(self.buffer.iter())
            .map(|(day, entries)| async move { (*day, self.flush_day(*day, entries).await) })
            .buffer_unordered(FLUSH_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        let mut failed = vec![];
        for (day, result) in results {
            if let Err(e) = result {
                error!("Failed to flush log for {day}: {e:?}");
                failed.push(day);
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            failed.sort();
            Err(anyhow!("Failed to flush logs for {failed:?}"))
        }
    }

    async fn flush_day(&self, day: NaiveDate, buffered: &[ActivityEntry]) -> Result<()> {
        // Rewriting after a failed read would throw away the day's history, so the appended
        // records are left as they are instead.
        let existing = self
            .store
            .read(day)
            .await
            .inspect_err(|e| warn!("Skipping merge for {day}, existing log is unreadable: {e:?}"))?;
        let existing_count = existing.len();

        let merged = merge_entries(existing, buffered.iter().cloned());
        info!(
            "Merged {} buffered entries with {existing_count} stored ones into {} for {day}",
            buffered.len(),
            merged.len()
        );
        self.store.write(&merged, day).await
    }
}

/// Sorts by start time and collapses exact duplicates (same start, end, application and window
/// title at second resolution). Open entries are left out.
pub fn merge_entries(
    existing: impl IntoIterator<Item = ActivityEntry>,
    buffered: impl IntoIterator<Item = ActivityEntry>,
) -> Vec<ActivityEntry> {
    let mut merged = existing
        .into_iter()
        .chain(buffered)
        .filter(ActivityEntry::is_closed)
        .collect::<Vec<_>>();
    merged.sort_by_key(|v| v.start);

    let mut seen = HashSet::new();
    merged.retain(|v| seen.insert(v.dedup_key()));
    merged
}

impl<S: LogStore> EventProcessor for DailyAggregator<S> {
    async fn process_next(&mut self, entry: ActivityEntry) -> Result<()> {
        self.handle_finalized(entry).await;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.flush_all().await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use anyhow::{anyhow, Result};
    use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::daemon::storage::{
        entities::ActivityEntry,
        log_store::{CsvLogStore, LogStore},
    };

    use super::{merge_entries, DailyAggregator};

    /// Keeps days in memory. Days listed in `broken` fail every operation.
    #[derive(Default)]
    struct MemoryStore {
        days: Mutex<HashMap<NaiveDate, Vec<ActivityEntry>>>,
        broken: Vec<NaiveDate>,
    }

    impl MemoryStore {
        fn check(&self, day: NaiveDate) -> Result<()> {
            if self.broken.contains(&day) {
                Err(anyhow!("disk full"))
            } else {
                Ok(())
            }
        }

        fn day(&self, day: NaiveDate) -> Vec<ActivityEntry> {
            self.days.lock().unwrap().get(&day).cloned().unwrap_or_default()
        }
    }

    impl LogStore for MemoryStore {
        async fn write(&self, entries: &[ActivityEntry], day: NaiveDate) -> Result<()> {
            self.check(day)?;
            self.days.lock().unwrap().insert(day, entries.to_vec());
            Ok(())
        }

        async fn append(&self, entries: &[ActivityEntry], day: NaiveDate) -> Result<()> {
            self.check(day)?;
            self.days
                .lock()
                .unwrap()
                .entry(day)
                .or_default()
                .extend_from_slice(entries);
            Ok(())
        }

        async fn read(&self, day: NaiveDate) -> Result<Vec<ActivityEntry>> {
            self.check(day)?;
            Ok(self.day(day))
        }
    }

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(2018, 7, day, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 7, day).unwrap()
    }

    fn entry(app: &str, start: DateTime<Utc>, minutes: i64) -> ActivityEntry {
        ActivityEntry::closed(app, "win", start, start + Duration::minutes(minutes))
    }

    #[tokio::test]
    async fn test_finalized_entries_are_appended_immediately() -> Result<()> {
        let mut aggregator = DailyAggregator::new(MemoryStore::default());
        let e = entry("A", at(4, 9, 0), 60);
        aggregator.handle_finalized(e.clone()).await;

        assert_eq!(aggregator.store.day(date(4)), vec![e.clone()]);
        assert_eq!(aggregator.buffer[&date(4)], vec![e]);
        Ok(())
    }

    #[tokio::test]
    async fn test_entries_belong_to_their_start_day() -> Result<()> {
        let mut aggregator = DailyAggregator::new(MemoryStore::default());
        let overnight = entry("A", at(4, 23, 30), 60);
        aggregator.handle_finalized(overnight.clone()).await;

        assert_eq!(aggregator.store.day(date(4)), vec![overnight]);
        assert!(aggregator.store.day(date(5)).is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_append_keeps_going() -> Result<()> {
        let store = MemoryStore {
            broken: vec![date(4)],
            ..Default::default()
        };
        let mut aggregator = DailyAggregator::new(store);
        aggregator.handle_finalized(entry("A", at(4, 9, 0), 5)).await;
        aggregator.handle_finalized(entry("B", at(5, 9, 0), 5)).await;

        assert_eq!(aggregator.store.day(date(5)).len(), 1);
        assert_eq!(aggregator.buffer.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_flush_merges_with_existing() -> Result<()> {
        let store = MemoryStore::default();
        let earlier = entry("Earlier", at(4, 8, 0), 30);
        store.write(&[earlier.clone()], date(4)).await?;

        let mut aggregator = DailyAggregator::new(store);
        let late = entry("Late", at(4, 11, 0), 5);
        let early = entry("Early", at(4, 9, 0), 5);
        aggregator.handle_finalized(late.clone()).await;
        aggregator.handle_finalized(early.clone()).await;

        aggregator.flush_all().await?;

        assert_eq!(aggregator.store.day(date(4)), vec![earlier, early, late]);
        Ok(())
    }

    #[tokio::test]
    async fn test_flush_is_idempotent() -> Result<()> {
        let mut aggregator = DailyAggregator::new(MemoryStore::default());
        aggregator.handle_finalized(entry("A", at(4, 9, 0), 5)).await;
        aggregator.handle_finalized(entry("B", at(4, 9, 5), 5)).await;

        aggregator.flush_all().await?;
        let first = aggregator.store.day(date(4));
        aggregator.flush_all().await?;
        let second = aggregator.store.day(date(4));

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_day_does_not_block_others() -> Result<()> {
        let store = MemoryStore {
            broken: vec![date(5)],
            ..Default::default()
        };
        let mut aggregator = DailyAggregator::new(store);
        aggregator.handle_finalized(entry("A", at(4, 9, 0), 5)).await;
        aggregator.handle_finalized(entry("A", at(4, 9, 0), 5)).await;
        aggregator.handle_finalized(entry("B", at(5, 9, 0), 5)).await;
        aggregator.handle_finalized(entry("C", at(6, 9, 0), 5)).await;

        let result = aggregator.flush_all().await;

        assert!(result.is_err());
        assert_eq!(aggregator.store.day(date(4)).len(), 1);
        assert_eq!(aggregator.store.day(date(6)).len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_flush_against_csv_store() -> Result<()> {
        let dir = tempdir()?;
        let store = Arc::new(CsvLogStore::new(dir.path().to_owned())?);

        // A previous run left one entry behind.
        let previous = entry("Previous", at(4, 7, 0), 10);
        store.append(&[previous.clone()], date(4)).await?;

        let mut aggregator = DailyAggregator::new(store.clone());
        // Sub-second precision in memory, second precision on disk.
        let precise = ActivityEntry::closed(
            "Figma",
            "Design, \"Round 1\"",
            at(4, 9, 0) + Duration::milliseconds(300),
            at(4, 9, 2) + Duration::milliseconds(700),
        );
        aggregator.handle_finalized(precise).await;
        aggregator.handle_finalized(entry("Terminal", at(4, 8, 0), 10)).await;

        aggregator.flush_all().await?;
        aggregator.flush_all().await?;

        let stored = store.read(date(4)).await?;
        let apps = stored.iter().map(|v| &*v.app_name).collect::<Vec<_>>();
        assert_eq!(apps, vec!["Previous", "Terminal", "Figma"]);
        assert_eq!(&*stored[2].window_title, "Design, \"Round 1\"");
        Ok(())
    }

    #[test]
    fn test_merge_sorts_and_deduplicates() {
        let a = entry("A", at(4, 9, 0), 5);
        let b = entry("B", at(4, 9, 0), 5);
        let c = entry("C", at(4, 8, 0), 5);
        let open = ActivityEntry {
            end: None,
            ..entry("Open", at(4, 7, 0), 0)
        };

        let merged = merge_entries(
            vec![a.clone(), b.clone(), open],
            vec![c.clone(), a.clone(), b.clone(), a.clone()],
        );

        assert_eq!(merged, vec![c, a, b]);
    }

    #[test]
    fn test_merge_keeps_entries_differing_only_by_end() {
        let short = entry("A", at(4, 9, 0), 5);
        let long = entry("A", at(4, 9, 0), 6);
        assert_eq!(merge_entries(vec![short, long], vec![]).len(), 2);
    }
}
