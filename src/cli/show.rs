use std::{fmt::Display, future, path::Path, sync::Arc};

use ansi_term::{Colour, Style};
use anyhow::Result;
use chrono::{Duration, Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use futures::{stream, Stream, StreamExt};
use tracing::error;

use crate::{
    daemon::storage::{
        entities::ActivityEntry,
        log_store::{CsvLogStore, LogStore},
    },
    utils::{dir::activity_dir, time::format_record_time},
};

use super::{Args, DirArgs};

/// How many days are read at once.
const READ_AHEAD: usize = 4;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ShowCommand {
    #[arg(
        long = "start",
        short,
        help = "First day to show. Examples are \"yesterday\", \"3 days ago\", \"15/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "Last day to show. Examples are \"today\", \"15/03/2025\""
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[command(flatten)]
    pub(super) dir: DirArgs,
}

/// Prints every stored entry from the start day to the end day, both inclusive.
pub async fn process_show_command(command: ShowCommand, app_dir: &Path) -> Result<()> {
    let (start, end) = parse_days(
        command.start_date,
        command.end_date,
        command.date_style,
        Local::now().date_naive(),
    )?;

    let store = CsvLogStore::new(activity_dir(app_dir))?;
    let mut days = read_days(store, start, end);

    while let Some((day, entries)) = days.next().await {
        match entries {
            Ok(entries) => print_day(day, &entries),
            Err(e) => {
                error!("Failed to read {day} {e:?}");
                eprintln!("{}", Colour::Red.paint(format!("{day}: couldn't read log, {e}")));
            }
        }
    }
    Ok(())
}

/// Resolves the requested range. Both ends default to `today`, and a reversed range is an error.
fn parse_days(
    start_date: Option<String>,
    end_date: Option<String>,
    date_style: DateStyle,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate)> {
    let now = Local::now();
    let dialect: chrono_english::Dialect = date_style.into();
    let parse = |value: Option<String>, name: &str| -> Result<NaiveDate> {
        match value.map(|s| parse_date_string(&s, now, dialect)) {
            Some(Ok(v)) => Ok(v.date_naive()),
            Some(Err(e)) => Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate {name} date {e}"),
                )
                .into()),
            None => Ok(today),
        }
    };

    let start = parse(start_date, "start")?;
    let end = parse(end_date, "end")?;
    if start > end {
        return Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Start {start} is after end {end}"),
            )
            .into());
    }
    Ok((start, end))
}

/// Reads each day in order, a few days ahead of the consumer.
fn read_days(
    store: impl LogStore,
    start: NaiveDate,
    end: NaiveDate,
) -> impl Stream<Item = (NaiveDate, Result<Vec<ActivityEntry>>)> {
    let store = Arc::new(store);
    date_range(start, end)
        .map(move |day| {
            let store = store.clone();
            async move { (day, store.read(day).await) }
        })
        .buffered(READ_AHEAD)
}

/// Returns a stream of dates between start (inclusive) and end (inclusive).
fn date_range(start: NaiveDate, end: NaiveDate) -> impl Stream<Item = NaiveDate> {
    stream::unfold(Some(start), move |current| {
        future::ready(match current {
            Some(day) if day <= end => Some((day, day.succ_opt())),
            _ => None,
        })
    })
}

fn print_day(day: NaiveDate, entries: &[ActivityEntry]) {
    let total = entries
        .iter()
        .filter(|v| !v.is_idle())
        .filter_map(ActivityEntry::duration)
        .fold(Duration::zero(), |acc, v| acc + v);

    println!(
        "{} {}",
        Style::new().bold().paint(day.format("%A %Y-%m-%d").to_string()),
        Colour::Cyan.paint(format!("active {}", format_duration(total)))
    );
    if entries.is_empty() {
        println!("  nothing recorded");
    }
    for entry in entries {
        let line = format!(
            "  {}  {:>9}  {}\t{}",
            entry
                .end
                .map(|end| format!("{} - {}", format_record_time(entry.start), clock_time(end)))
                .unwrap_or_else(|| format_record_time(entry.start)),
            entry.duration().map(format_duration).unwrap_or_default(),
            entry.app_name,
            entry.window_title
        );
        if entry.is_idle() {
            println!("{}", Colour::Fixed(244).paint(line));
        } else {
            println!("{line}");
        }
    }
    println!();
}

fn clock_time(moment: chrono::DateTime<chrono::Utc>) -> String {
    moment.with_timezone(&Local).format("%H:%M:%S").to_string()
}

fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}
