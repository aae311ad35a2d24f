//! CSV representation of a closed [ActivityEntry].

use std::io::{Read, Write};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::entities::ActivityEntry;

/// Header line every activity log starts with.
pub const HEADER: [&str; 5] = [
    "start_time",
    "end_time",
    "duration_seconds",
    "app_name",
    "window_title",
];

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct LogRecord {
    #[serde(with = "record_time")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "record_time")]
    pub end_time: DateTime<Utc>,
    pub duration_seconds: i64,
    pub app_name: String,
    pub window_title: String,
}

impl LogRecord {
    /// Open entries have no place in a log and produce `None`.
    pub fn from_entry(entry: &ActivityEntry) -> Option<Self> {
        let end_time = entry.end?;
        Some(Self {
            start_time: entry.start,
            end_time,
            duration_seconds: (end_time - entry.start).num_seconds(),
            app_name: entry.app_name.to_string(),
            window_title: entry.window_title.to_string(),
        })
    }

    /// The stored duration is derived data and gets recomputed from the timestamps.
    pub fn into_entry(self) -> ActivityEntry {
        ActivityEntry::closed(
            self.app_name,
            self.window_title,
            self.start_time,
            self.end_time,
        )
    }
}

mod record_time {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use crate::utils::time::{format_record_time, parse_record_time};

    pub fn serialize<S>(moment: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_record_time(*moment))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_record_time(&s).ok_or_else(|| D::Error::custom(format!("illegal timestamp {s:?}")))
    }
}

fn writer<W: Write>(out: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(out)
}

/// Encodes closed entries as CSV lines, optionally preceded by the header. Entries are emitted in
/// the given order.
pub fn encode<'a>(
    entries: impl IntoIterator<Item = &'a ActivityEntry>,
    with_header: bool,
) -> Result<Vec<u8>> {
    let mut writer = writer(Vec::new());
    if with_header {
        writer.write_record(HEADER)?;
    }
    for record in entries.into_iter().filter_map(LogRecord::from_entry) {
        writer.serialize(record)?;
    }
    Ok(writer.into_inner().map_err(|e| e.into_error())?)
}

/// Decodes a whole log. Records that are short, empty or unparseable are skipped so that a
/// partially corrupted log still yields everything that's readable.
pub fn decode(input: impl Read, source: &str) -> Vec<ActivityEntry> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);
    let headers = csv::StringRecord::from(HEADER.to_vec());

    let mut entries = vec![];
    for (index, record) in reader.records().enumerate() {
        let record = match record {
            Ok(v) => v,
            Err(e) => {
                warn!("Unreadable record #{index} in {source}: {e}");
                continue;
            }
        };
        if record.len() < HEADER.len() {
            if record.iter().any(|field| !field.trim().is_empty()) {
                warn!("Record #{index} in {source} has only {} fields", record.len());
            }
            continue;
        }
        match record.deserialize::<LogRecord>(Some(&headers)) {
            Ok(v) => entries.push(v.into_entry()),
            Err(e) => {
                // Might happen after a shutdown cut a write short.
                warn!("Illegal record #{index} in {source} {:?}: {e}", record);
            }
        }
    }
    entries
}

/// Byte length of the log without its last record. Used to drop a record that a cut-off write
/// left behind, including one that stopped inside a quoted field spanning several lines.
pub fn without_last_record(input: &[u8]) -> u64 {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);
    let mut record = csv::ByteRecord::new();

    let mut last_start = 0;
    loop {
        let start = reader.position().byte();
        match reader.read_byte_record(&mut record) {
            Ok(true) => last_start = start,
            Ok(false) => break,
            Err(_) => {
                last_start = start;
                break;
            }
        }
    }
    last_start
}
