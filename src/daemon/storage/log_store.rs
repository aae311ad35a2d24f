use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, instrument, warn};

use crate::{fs::operations::ends_with_line_break, utils::time::date_to_record_name};

use super::{entities::ActivityEntry, record};

/// Interface for abstracting storage of activity entries. Every calendar day is stored separately.
/// Only closed entries are ever stored; open ones are ignored.
pub trait LogStore {
    /// Replaces everything stored for `day` with `entries`, ordered by start time.
    fn write(&self, entries: &[ActivityEntry], day: NaiveDate) -> impl Future<Output = Result<()>>;

    /// Adds `entries` after whatever is already stored for `day`, without rewriting it.
    fn append(&self, entries: &[ActivityEntry], day: NaiveDate)
        -> impl Future<Output = Result<()>>;

    /// Retrieves entries stored for `day` in storage order. A day without data is empty.
    fn read(&self, day: NaiveDate) -> impl Future<Output = Result<Vec<ActivityEntry>>>;
}

impl<T: Deref> LogStore for T
where
    T::Target: LogStore,
{
    fn write(&self, entries: &[ActivityEntry], day: NaiveDate) -> impl Future<Output = Result<()>> {
        self.deref().write(entries, day)
    }

    fn append(
        &self,
        entries: &[ActivityEntry],
        day: NaiveDate,
    ) -> impl Future<Output = Result<()>> {
        self.deref().append(entries, day)
    }

    fn read(&self, day: NaiveDate) -> impl Future<Output = Result<Vec<ActivityEntry>>> {
        self.deref().read(day)
    }
}

/// The main realization of [LogStore]: one CSV file per day inside `log_dir`.
pub struct CsvLogStore {
    log_dir: PathBuf,
}

impl CsvLogStore {
    pub fn new(log_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&log_dir)?;

        Ok(Self { log_dir })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn path_for(&self, day: NaiveDate) -> PathBuf {
        self.log_dir
            .join(format!("ticklet-{}.csv", date_to_record_name(day)))
    }

    async fn read_file(path: &Path) -> Result<Vec<u8>, std::io::Error> {
        debug!("Reading {path:?}");
        let mut file = File::open(path).await?;
        file.lock_shared()?;
        let mut buffer = vec![];
        let result = file.read_to_end(&mut buffer).await;
        file.unlock_async().await?;
        result?;
        Ok(buffer)
    }

    /// Cuts off a record left incomplete by an interrupted write, so that the next append starts
    /// on a record boundary.
    async fn drop_incomplete_record(file: &mut File) -> Result<()> {
        if ends_with_line_break(file).await? {
            return Ok(());
        }
        // Might happen due to shutdown cutting off a previous write.
        let mut content = vec![];
        file.rewind().await?;
        file.read_to_end(&mut content).await?;
        let complete = record::without_last_record(&content);
        warn!(
            "Activity log ends with an incomplete record, dropping {} bytes",
            content.len() as u64 - complete
        );
        file.set_len(complete).await?;
        Ok(())
    }

    async fn append_with_file(file: &mut File, entries: &[ActivityEntry]) -> Result<()> {
        Self::drop_incomplete_record(file).await?;
        let is_new = file.metadata().await?.len() == 0;

        let mut buffer = Vec::<u8>::new();
        let mut ordered = entries.iter().collect::<Vec<_>>();
        ordered.sort_by_key(|v| v.start);
        buffer.extend(record::encode(ordered, is_new)?);

        file.write_all(&buffer).await?;
        file.flush().await?;
        Ok(())
    }
}

impl LogStore for CsvLogStore {
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn write(&self, entries: &[ActivityEntry], day: NaiveDate) -> Result<()> {
        let mut ordered = entries.iter().collect::<Vec<_>>();
        ordered.sort_by_key(|v| v.start);
        let buffer = record::encode(ordered, true)?;

        tokio::fs::create_dir_all(&self.log_dir).await?;
        let path = self.path_for(day);
        let temp_path = path.with_extension("csv.tmp");

        let replaced = async {
            let mut temp = File::create(&temp_path).await?;
            temp.write_all(&buffer).await?;
            temp.sync_all().await?;
            drop(temp);
            tokio::fs::rename(&temp_path, &path).await
        }
        .await;

        if let Err(e) = replaced {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn append(&self, entries: &[ActivityEntry], day: NaiveDate) -> Result<()> {
        tokio::fs::create_dir_all(&self.log_dir).await?;
        let mut file = File::options()
            .read(true)
            .append(true)
            .create(true)
            .open(self.path_for(day))
            .await?;

        // Semi-safe acquire-release for a file
        file.lock_exclusive()?;
        let result = Self::append_with_file(&mut file, entries).await;
        file.unlock_async().await?;
        result
    }

    #[instrument(skip(self))]
    async fn read(&self, day: NaiveDate) -> Result<Vec<ActivityEntry>> {
        let path = self.path_for(day);
        match Self::read_file(&path).await {
            Ok(bytes) => Ok(record::decode(
                bytes.as_slice(),
                &path.display().to_string(),
            )),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(e.into()),
        }
    }
}
